//! 站点流程 - 流程层
//!
//! 核心职责：定义"一个站点"的完整流程
//!
//! 流程顺序（严格向前，不回头）：
//! 1. 注册 → token 核实
//! 2. 登录（共享登录窗口）→ token 核实
//! 3. 加银行卡 → 字段比对核实
//! 4. 领取优惠（共享优惠上下文）→ 结果轮询
//!
//! 上游步骤失败或核实不过，下游一律标记跳过、不再尝试。
//! 步骤内部的重试交给 RetryPolicy，跨步骤没有重试。

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::DriverError;
use crate::infrastructure::{BrowserHost, JsBridge, PageHandle};
use crate::models::{ProfileData, SequenceRun, SequenceStatus, Site, Stage, StepResult};
use crate::pool::{PoolKey, SharedSpacePool};
use crate::retry::{classify, poll_until, ErrorClass, RetryPolicy};
use crate::rotator::TabRotator;
use crate::services::{AccountSaver, ProgressReporter};
use crate::verify::promo_check::{
    judge_promo_snapshot, promo_snapshot_js, promo_status_to_verification, PromoSnapshot,
    PromoStatus,
};
use crate::verify::{ExpectedBankFields, VerificationEngine};
use crate::workflow::SequenceCtx;

/// 步骤中止原因（决定下游怎么收尾）
enum StageAbort {
    /// 步骤失败，带原因
    Failed(String),
    /// 标签页被关，整个流程立即终止
    TabClosed,
}

impl StageAbort {
    fn from_driver(err: DriverError) -> Self {
        match classify(&err) {
            ErrorClass::TabClosed => StageAbort::TabClosed,
            _ => StageAbort::Failed(err.to_string()),
        }
    }
}

/// 站点流程执行器
///
/// - 编排一个站点的四个步骤
/// - 每步完成后交给核实引擎下结论
/// - 不持有 chromiumoxide 类型，只认 trait
pub struct SequenceRunner {
    pub host: Arc<dyn BrowserHost>,
    pub pool: Arc<SharedSpacePool>,
    pub rotator: Arc<TabRotator>,
    pub verifier: VerificationEngine,
    pub reporter: Arc<ProgressReporter>,
    pub account_saver: Arc<AccountSaver>,
    pub script_bundle: Arc<String>,
    pub config: Config,
}

impl SequenceRunner {
    /// 跑完一个站点的完整流程
    pub async fn run_for_site(
        &self,
        site: &Site,
        profile: &ProfileData,
        ctx: &SequenceCtx,
    ) -> SequenceRun {
        info!("\n{} 🚀 开始流程", ctx);
        let mut run = SequenceRun::new(&site.name);
        run.status = SequenceStatus::Running;

        // ========== 步骤 1: 注册 ==========
        let register_page = match self.stage_register(site, profile, ctx, &mut run).await {
            Ok(page) => page,
            Err(abort) => {
                self.abort_run(&mut run, Stage::Register, abort, profile, ctx);
                return run;
            }
        };
        self.reporter.step_done(format!("注册 {}", site.name));

        // ========== 步骤 2: 登录 ==========
        if let Err(abort) = self.stage_login(site, profile, ctx, &mut run).await {
            self.abort_run(&mut run, Stage::Login, abort, profile, ctx);
            return run;
        }
        self.reporter.step_done(format!("登录 {}", site.name));

        // 登录核实不过不往下走（严格模式下 verified 必须为真）
        if !run.login.verified {
            info!("{} ⏭️ 登录未核实，跳过加卡与优惠", ctx);
            run.skip_downstream_of(Stage::Login, "登录未核实");
            run.finalize();
            return run;
        }

        // 注册+登录都确认后保存一次共享账户信息
        let all_sites = vec![site.name.clone()];
        self.account_saver
            .save_once(profile, &site.name, &all_sites)
            .await;

        // ========== 步骤 3: 加银行卡 ==========
        if let Err(abort) = self
            .stage_add_bank(site, profile, ctx, &register_page, &mut run)
            .await
        {
            self.abort_run(&mut run, Stage::AddBank, abort, profile, ctx);
            return run;
        }
        self.reporter.step_done(format!("加银行卡 {}", site.name));

        // ========== 步骤 4: 领取优惠 ==========
        self.stage_check_promo(site, profile, ctx, &mut run).await;
        self.reporter.step_done(format!("领取优惠 {}", site.name));

        run.finalize();
        log_run_summary(ctx, &run);
        run
    }

    // ========== 步骤 1: 注册 ==========

    async fn stage_register(
        &self,
        site: &Site,
        profile: &ProfileData,
        ctx: &SequenceCtx,
        run: &mut SequenceRun,
    ) -> Result<Arc<dyn PageHandle>, StageAbort> {
        info!("{} 📝 打开注册页: {}", ctx, site.register_url);

        let page = self
            .host
            .open_page(&site.register_url)
            .await
            .map_err(StageAbort::from_driver)?;
        tokio::time::sleep(self.settle()).await;

        // 让轮换器照看这个页，防止后台节流
        self.rotator.register(&site.name, page.clone());

        // 注入桥接脚本（注入失败不致命，先记下来继续走）
        let bridge = JsBridge::new(
            page.clone(),
            Duration::from_secs(self.config.bridge_call_timeout_secs),
        );
        if let Err(e) = self.inject_with_retry(&page, ctx).await {
            if matches!(classify(&e), ErrorClass::TabClosed) {
                return Err(StageAbort::TabClosed);
            }
            warn!("{} ⚠️ 桥接脚本注入失败，继续尝试: {}", ctx, e);
        }

        // 后台标签页可能还没渲染表单，先等表单就位
        self.wait_form_ready(&page, ctx).await;

        // 置前一次再填表
        let _ = page.bring_to_front().await;

        info!("{} ✍️ 触发注册填表...", ctx);
        let response = bridge
            .call(
                "autoFill",
                &json!({
                    "username": profile.username,
                    "password": profile.password,
                    "withdrawPassword": profile.withdraw_password,
                    "fullname": profile.fullname,
                    "apiKey": profile.api_key,
                    "captchaDelay": profile.captcha_delay_ms,
                }),
            )
            .await
            .map_err(StageAbort::from_driver)?;

        if !response.success {
            let reason = response
                .error
                .unwrap_or_else(|| "注册填表无回包".to_string());
            run.register = StepResult::failed(Stage::Register, &reason);
            return Err(StageAbort::Failed(reason));
        }

        // 回包说成功不算数，以 token 出现为准
        info!("{} 🔍 注册回包成功，开始 token 核实...", ctx);
        let verification = self
            .verifier
            .confirm_token(&page)
            .await
            .map_err(StageAbort::from_driver)?;

        if !verification.verified {
            let reason = format!("注册未确认: {}", verification.details);
            run.register = StepResult::failed(Stage::Register, &reason);
            return Err(StageAbort::Failed(reason));
        }

        info!("{} ✅ 注册成功并已核实", ctx);
        run.register = StepResult::succeeded(Stage::Register, true, verification.details);
        Ok(page)
    }

    // ========== 步骤 2: 登录 ==========

    async fn stage_login(
        &self,
        site: &Site,
        profile: &ProfileData,
        ctx: &SequenceCtx,
        run: &mut SequenceRun,
    ) -> Result<(), StageAbort> {
        info!("{} 🔑 获取共享登录窗口...", ctx);

        let host = self.host.clone();
        let space = match self
            .pool
            .get_or_create(PoolKey::LoginWindow, || async move {
                Ok(host.create_login_window().await?)
            })
            .await
        {
            Ok(space) => space,
            Err(e) => {
                let reason = e.to_string();
                run.login = StepResult::failed(Stage::Login, &reason);
                return Err(StageAbort::Failed(reason));
            }
        };

        let login_url = site.login_url();
        info!("{} 🔑 在共享窗口打开登录页: {}", ctx, login_url);
        let page = space
            .open_page(&login_url)
            .await
            .map_err(StageAbort::from_driver)?;
        tokio::time::sleep(self.settle()).await;

        if let Err(e) = self.inject_with_retry(&page, ctx).await {
            if matches!(classify(&e), ErrorClass::TabClosed) {
                return Err(StageAbort::TabClosed);
            }
            warn!("{} ⚠️ 登录页注入失败，继续尝试: {}", ctx, e);
        }

        let bridge = JsBridge::new(
            page.clone(),
            Duration::from_secs(self.config.bridge_call_timeout_secs),
        );
        let response = bridge
            .call(
                "autoLogin",
                &json!({
                    "username": profile.username,
                    "password": profile.password,
                    "apiKey": profile.api_key,
                }),
            )
            .await
            .map_err(StageAbort::from_driver)?;

        if !response.success {
            let reason = response
                .error
                .unwrap_or_else(|| "登录动作无回包".to_string());
            run.login = StepResult::failed(Stage::Login, &reason);
            return Err(StageAbort::Failed(reason));
        }

        // 登录同样只认 token，动作回包不作数
        let verification = self
            .verifier
            .confirm_token(&page)
            .await
            .map_err(StageAbort::from_driver)?;

        if verification.verified {
            info!("{} ✅ 登录成功并已核实", ctx);
            run.login = StepResult::succeeded(Stage::Login, true, verification.details);
            return Ok(());
        }

        // 没有 token：跑一次启发式，严格模式下只作为失败详情，
        // 旧路径（非严格）下允许以弱成功放行
        let heuristic = self
            .verifier
            .confirm_login_heuristic(&page)
            .await
            .map_err(StageAbort::from_driver)?;

        if self.config.login_strict_token {
            let reason = format!(
                "轮询窗口内无 token，判定失败（{}）",
                heuristic.details
            );
            warn!("{} ❌ {}", ctx, reason);
            run.login = StepResult::failed(Stage::Login, &reason);
            Err(StageAbort::Failed(reason))
        } else if heuristic.success {
            warn!("{} ⚠️ 无 token，仅凭启发式判定登录（弱结果）", ctx);
            run.login = StepResult::succeeded(Stage::Login, false, heuristic.details);
            Ok(())
        } else {
            let reason = format!("无 token 且启发式不过线: {}", heuristic.details);
            run.login = StepResult::failed(Stage::Login, &reason);
            Err(StageAbort::Failed(reason))
        }
    }

    // ========== 步骤 3: 加银行卡 ==========

    async fn stage_add_bank(
        &self,
        site: &Site,
        profile: &ProfileData,
        ctx: &SequenceCtx,
        page: &Arc<dyn PageHandle>,
        run: &mut SequenceRun,
    ) -> Result<(), StageAbort> {
        if !profile.has_bank_info() {
            info!("{} ⏭️ 未提供银行卡信息，跳过加卡", ctx);
            run.add_bank =
                StepResult::not_applicable(Stage::AddBank, "未启用加卡（资料未提供银行卡信息）");
            // 注册完成且无需加卡，这个页不用再轮换了
            self.rotator.mark_completed(&site.name);
            return Ok(());
        }

        // 注册后不急着跳转，拉开各站点的提交时间
        self.settle_before_bank(site, profile, page, ctx).await;

        let withdraw_url = match site.withdraw_url() {
            Ok(url) => url,
            Err(e) => {
                let reason = e.to_string();
                run.add_bank = StepResult::failed(Stage::AddBank, &reason);
                return Err(StageAbort::Failed(reason));
            }
        };

        info!("{} 🏦 跳转加卡页: {}", ctx, withdraw_url);
        page.navigate(
            &withdraw_url,
            Duration::from_secs(self.config.bank_navigation_timeout_secs),
        )
        .await
        .map_err(StageAbort::from_driver)?;
        tokio::time::sleep(self.settle()).await;

        if let Err(e) = self.inject_with_retry(page, ctx).await {
            if matches!(classify(&e), ErrorClass::TabClosed) {
                return Err(StageAbort::TabClosed);
            }
            warn!("{} ⚠️ 加卡页注入失败，继续尝试: {}", ctx, e);
        }

        let bridge = JsBridge::new(
            page.clone(),
            Duration::from_secs(self.config.bridge_call_timeout_secs),
        );
        info!("{} 💳 触发加卡填表...", ctx);
        let fill_result = bridge
            .call(
                "fillWithdrawForm",
                &json!({
                    "withdrawInfo": {
                        "bankName": profile.bank_name,
                        "bankBranch": profile.bank_branch,
                        "accountNumber": profile.account_number,
                        "withdrawPassword": profile.withdraw_password,
                    }
                }),
            )
            .await;

        match fill_result {
            Ok(response) if !response.success => {
                let reason = response
                    .error
                    .unwrap_or_else(|| "加卡填表无回包".to_string());
                run.add_bank = StepResult::failed(Stage::AddBank, &reason);
                return Err(StageAbort::Failed(reason));
            }
            Ok(_) => {}
            Err(e) => match classify(&e) {
                // 填表途中页面跳转很常见（提交成功后的重定向），继续核实
                ErrorClass::ContextDestroyed => {
                    info!("{} ⚠️ 填表途中上下文销毁，直接进入核实", ctx);
                }
                ErrorClass::TabClosed => return Err(StageAbort::TabClosed),
                _ => {
                    run.add_bank = StepResult::failed(Stage::AddBank, e.to_string());
                    return Err(StageAbort::Failed(e.to_string()));
                }
            },
        }

        // 页面可能还在处理，先给它一点时间
        tokio::time::sleep(self.settle()).await;

        info!("{} 🔍 核实加卡结果...", ctx);
        self.reporter
            .notify_status(&profile.username, "running", "正在核实银行卡信息...");

        let expected = ExpectedBankFields {
            fullname: profile.fullname.clone(),
            branch: profile.bank_branch.clone(),
            account_number: profile.account_number.clone(),
        };
        let verification = self
            .verifier
            .confirm_bank_fields(page, &expected)
            .await
            .map_err(StageAbort::from_driver)?;

        if verification.success {
            if verification.verified {
                info!("{} ✅ 加卡成功并已核实: {}", ctx, verification.details);
                run.add_bank = StepResult::succeeded(Stage::AddBank, true, verification.details);
                // 注册 + 加卡都完成，退出轮换
                self.rotator.mark_completed(&site.name);
            } else {
                warn!("{} ⚠️ 加卡提交成功但未核实: {}", ctx, verification.details);
                run.add_bank = StepResult::succeeded(Stage::AddBank, false, verification.details);
            }
            Ok(())
        } else {
            error!("{} ❌ 加卡失败: {}", ctx, verification.details);
            run.add_bank = StepResult::failed(Stage::AddBank, &verification.details);
            Err(StageAbort::Failed(verification.details))
        }
    }

    // ========== 步骤 4: 领取优惠 ==========

    async fn stage_check_promo(
        &self,
        site: &Site,
        profile: &ProfileData,
        ctx: &SequenceCtx,
        run: &mut SequenceRun,
    ) {
        // 门禁逐条判，跳过原因写清楚
        if !self.config.check_promo {
            run.check_promo = StepResult::not_applicable(Stage::CheckPromo, "未启用优惠检查");
            return;
        }
        if !run.add_bank.success {
            info!("{} ⏭️ 加卡失败，跳过优惠", ctx);
            run.check_promo = StepResult::skipped(Stage::CheckPromo, "加卡失败");
            return;
        }
        if self.config.promo_requires_verified && run.add_bank.attempted() && !run.add_bank.verified
        {
            info!("{} ⏭️ 银行卡未核实，按策略跳过优惠（请人工确认）", ctx);
            run.check_promo = StepResult::skipped(Stage::CheckPromo, "银行卡未核实");
            return;
        }
        if !self.config.promo_requires_verified && run.add_bank.attempted() && !run.add_bank.verified
        {
            warn!("{} ⚠️ 银行卡未核实仍继续领优惠（宽松策略）", ctx);
        }
        let promo_url = match &site.promo_url {
            Some(url) => url.clone(),
            None => {
                // 站点本来就没有优惠入口，不算降级
                run.check_promo =
                    StepResult::not_applicable(Stage::CheckPromo, "未启用优惠（站点未配置优惠链接）");
                return;
            }
        };

        info!("{} 🎁 领取优惠: {}", ctx, promo_url);
        run.check_promo = match self
            .run_promo_flow(&promo_url, profile, ctx)
            .await
        {
            Ok(step) => step,
            Err(StageAbort::TabClosed) => {
                run.tab_closed = true;
                self.reporter.notify_status(
                    &profile.username,
                    "running",
                    &format!("{} 优惠页标签被关闭", site.name),
                );
                StepResult::failed(Stage::CheckPromo, "标签页已被关闭")
            }
            Err(StageAbort::Failed(reason)) => StepResult::failed(Stage::CheckPromo, reason),
        };
    }

    async fn run_promo_flow(
        &self,
        promo_url: &str,
        profile: &ProfileData,
        ctx: &SequenceCtx,
    ) -> Result<StepResult, StageAbort> {
        // 共享优惠上下文：批次内只建一次，建不出来就带原因跳过
        let host = self.host.clone();
        let space = match self
            .pool
            .get_or_create(PoolKey::PromoContext, || async move {
                Ok(host.create_promo_context().await?)
            })
            .await
        {
            Ok(space) => space,
            Err(e) => {
                warn!("{} ⚠️ 共享优惠上下文不可用: {}", ctx, e);
                return Ok(StepResult::skipped(
                    Stage::CheckPromo,
                    format!("共享优惠上下文不可用: {}", e),
                ));
            }
        };

        let page = space
            .open_page(promo_url)
            .await
            .map_err(StageAbort::from_driver)?;
        tokio::time::sleep(self.settle()).await;

        if let Err(e) = self.inject_with_retry(&page, ctx).await {
            if matches!(classify(&e), ErrorClass::TabClosed) {
                return Err(StageAbort::TabClosed);
            }
            warn!("{} ⚠️ 优惠页注入失败，继续尝试: {}", ctx, e);
        }

        let bridge = JsBridge::new(
            page.clone(),
            Duration::from_secs(self.config.bridge_call_timeout_secs),
        );
        let trigger_payload = json!({
            "username": profile.username,
            "apiKey": profile.api_key,
            "captchaDelay": profile.captcha_delay_ms,
        });

        // 先触发一次，然后按轮次观察页面结果
        if let Err(e) = bridge.call("checkPromotion", &trigger_payload).await {
            match classify(&e) {
                ErrorClass::TabClosed => return Err(StageAbort::TabClosed),
                _ => warn!("{} ⚠️ 优惠触发失败，仍继续观察: {}", ctx, e),
            }
        }

        let mut last_status = PromoStatus::Waiting;
        for round in 1..=self.config.promo_poll_rounds {
            tokio::time::sleep(Duration::from_secs(self.config.promo_poll_interval_secs)).await;

            let snapshot = match page.evaluate(promo_snapshot_js()).await {
                Ok(value) if value.is_null() => PromoSnapshot::default(),
                Ok(value) => serde_json::from_value(value).unwrap_or_default(),
                Err(e) => match classify(&e) {
                    ErrorClass::TabClosed => return Err(StageAbort::TabClosed),
                    _ => {
                        warn!(
                            "{} ⚠️ 优惠页快照读取失败 ({}/{}): {}",
                            ctx, round, self.config.promo_poll_rounds, e
                        );
                        continue;
                    }
                },
            };

            last_status = judge_promo_snapshot(&snapshot);
            match &last_status {
                PromoStatus::Completed { success, message, .. } => {
                    info!(
                        "{} {} 优惠结果: {}",
                        ctx,
                        if *success { "✅" } else { "❌" },
                        message
                    );
                    break;
                }
                PromoStatus::NeedsAction { reason } => {
                    info!("{} 🎯 优惠页需要动作 ({})，再触发一次", ctx, reason);
                    if let Err(e) = bridge.call("checkPromotion", &trigger_payload).await {
                        if matches!(classify(&e), ErrorClass::TabClosed) {
                            return Err(StageAbort::TabClosed);
                        }
                    }
                }
                PromoStatus::Waiting => {
                    info!(
                        "{} ⏳ 等待优惠结果 ({}/{})...",
                        ctx, round, self.config.promo_poll_rounds
                    );
                }
            }
        }

        let verification = promo_status_to_verification(&last_status);
        Ok(if verification.success {
            StepResult::succeeded(Stage::CheckPromo, verification.verified, verification.details)
        } else {
            StepResult::failed(Stage::CheckPromo, verification.details)
        })
    }

    // ========== 辅助 ==========

    /// 页面操作之间的沉降等待
    fn settle(&self) -> Duration {
        Duration::from_secs(self.config.page_settle_secs)
    }

    /// 注入桥接脚本并确认就位，带重试
    async fn inject_with_retry(
        &self,
        page: &Arc<dyn PageHandle>,
        ctx: &SequenceCtx,
    ) -> crate::error::DriverResult<()> {
        let policy = RetryPolicy::new(
            self.config.inject_retry_attempts,
            Duration::from_secs(self.config.inject_retry_delay_secs),
        );
        let script = self.script_bundle.clone();
        let page = page.clone();
        let settle = self.settle();
        let what = format!("{} 脚本注入", ctx);
        policy
            .run(&what, move || {
                let script = script.clone();
                let page = page.clone();
                async move {
                    page.inject(&script).await?;
                    tokio::time::sleep(settle).await;
                    let bridge = JsBridge::new(page.clone(), Duration::from_secs(5));
                    if bridge.ready().await? {
                        Ok(())
                    } else {
                        Err(DriverError::ScriptInjectionFailed {
                            reason: "桥接入口未注册".to_string(),
                        })
                    }
                }
            })
            .await
    }

    /// 等注册表单渲染出来（后台标签页可能迟迟不渲染）
    async fn wait_form_ready(&self, page: &Arc<dyn PageHandle>, ctx: &SequenceCtx) {
        let _ = page.bring_to_front().await;

        let probe_page = page.clone();
        let outcome = poll_until(Duration::from_secs(1), 10, move || {
            let page = probe_page.clone();
            async move {
                let value = page
                    .evaluate(
                        "(() => { if (typeof window.__registerFormReady === 'function') \
                         return window.__registerFormReady(); return true; })()",
                    )
                    .await?;
                Ok(value.as_bool().unwrap_or(true))
            }
        })
        .await;

        match outcome {
            Ok(o) if o.satisfied() => {}
            Ok(_) => warn!("{} ⚠️ 表单迟迟未就位，仍尝试填表", ctx),
            Err(e) => warn!("{} ⚠️ 表单就位探测失败: {}", ctx, e),
        }
    }

    /// 注册到加卡之间的等待窗口
    ///
    /// 按站点名做确定性摊开（不引入随机数依赖），窗口内每 10 秒置前一次
    /// 防节流，同时向仪表盘报倒计时。
    async fn settle_before_bank(
        &self,
        site: &Site,
        profile: &ProfileData,
        page: &Arc<dyn PageHandle>,
        ctx: &SequenceCtx,
    ) {
        let min = self.config.bank_settle_min_secs;
        let max = self.config.bank_settle_max_secs.max(min);
        let span = max - min;
        let offset = if span == 0 {
            0
        } else {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};
            let mut hasher = DefaultHasher::new();
            site.name.hash(&mut hasher);
            hasher.finish() % (span + 1)
        };
        let total = min + offset;

        info!("{} ⏳ 等待 {}s 后跳转加卡页...", ctx, total);

        let mut remaining = total;
        while remaining > 0 {
            let chunk = remaining.min(10);
            tokio::time::sleep(Duration::from_secs(chunk)).await;
            remaining -= chunk;

            // 等待期间保持标签页活性
            let _ = page.bring_to_front().await;
            self.reporter.notify_status(
                &profile.username,
                "running",
                &format!("{} 还有 {}s 跳转加卡页", site.name, remaining),
            );
        }
    }

    /// 统一的中止收尾
    fn abort_run(
        &self,
        run: &mut SequenceRun,
        stage: Stage,
        abort: StageAbort,
        profile: &ProfileData,
        ctx: &SequenceCtx,
    ) {
        match abort {
            StageAbort::TabClosed => {
                error!("{} 🚪 标签页被关闭，流程终止于 {}", ctx, stage);
                run.tab_closed = true;
                *run.step_mut(stage) = StepResult::failed(stage, "标签页已被关闭");
                run.skip_downstream_of(stage, "标签页已被关闭");
                // 侧信道通知，方便外部对账"这个还在跑吗"
                self.reporter.notify_status(
                    &profile.username,
                    "running",
                    &format!("{} 标签页被关闭，流程终止", ctx.site_name),
                );
            }
            StageAbort::Failed(reason) => {
                error!("{} ❌ {} 失败: {}", ctx, stage, reason);
                let already_failed = run.step(stage).attempted() && !run.step(stage).success;
                if !already_failed {
                    // 步骤函数没来得及写失败结果时补上
                    *run.step_mut(stage) = StepResult::failed(stage, &reason);
                }
                run.skip_downstream_of(stage, &format!("{} 失败", stage));
            }
        }
        run.finalize();
    }
}

fn log_run_summary(ctx: &SequenceCtx, run: &SequenceRun) {
    let mark = |s: &StepResult| {
        if s.skipped {
            "⏭️"
        } else if s.success && s.verified {
            "✅"
        } else if s.success {
            "⚠️"
        } else {
            "❌"
        }
    };
    info!("\n{} 📊 流程小结 ({})", ctx, run.status);
    info!("{}   注册: {}", ctx, mark(&run.register));
    info!("{}   登录: {}", ctx, mark(&run.login));
    info!("{}   加卡: {}", ctx, mark(&run.add_bank));
    info!("{}   优惠: {}", ctx, mark(&run.check_promo));
}
