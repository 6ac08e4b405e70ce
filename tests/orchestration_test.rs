//! 批次编排端到端测试（mock 驱动，不需要真实浏览器）
//!
//! 覆盖调度核心的可验证性质：滑动窗口上界、重复批次拒绝、
//! 步骤严格顺序与跳过传播、核实从不因超时成功、优惠引导失败降级。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use auto_register_sequence::error::{DriverError, DriverResult};
use auto_register_sequence::models::ProgressEvent;
use auto_register_sequence::services::ProgressSink;
use auto_register_sequence::{
    App, BrowserHost, Config, ExecutionMode, PageHandle, ProfileData, ScheduleError,
    SequenceStatus, SharedSpace, Site,
};

// ========== mock 驱动 ==========

/// 一个站点的脚本化行为
#[derive(Clone)]
struct SiteBehavior {
    autofill_ok: bool,
    /// 注册填表耗时（拉开时间差，让并发窗口可观测）
    autofill_delay_ms: u64,
    /// 注册页 token 轮询结果
    register_token: bool,
    /// 登录页 token 轮询结果
    login_token: bool,
    bank_fill_ok: bool,
    /// `__readBankDetail` 返回的快照
    bank_snapshot: JsonValue,
    /// `__readPromoStatus` 返回的快照
    promo_snapshot: JsonValue,
}

impl Default for SiteBehavior {
    fn default() -> Self {
        Self {
            autofill_ok: true,
            autofill_delay_ms: 0,
            register_token: true,
            login_token: true,
            bank_fill_ok: true,
            bank_snapshot: exact_match_snapshot(),
            promo_snapshot: promo_success_snapshot(),
        }
    }
}

fn exact_match_snapshot() -> JsonValue {
    json!({
        "hasBankDisplay": true,
        "displayedFullname": "NGUYEN VAN A",
        "displayedBranch": "HỒ CHÍ MINH",
        "displayedAccountNumber": "****6789",
        "formStillVisible": false,
    })
}

fn form_disappeared_snapshot() -> JsonValue {
    json!({
        "hasBankDisplay": false,
        "formStillVisible": false,
    })
}

fn promo_success_snapshot() -> JsonValue {
    json!({
        "bodyText": "Chúc mừng! Mã khuyến mãi: TESTCODE1",
    })
}

/// 全批次共享的观测状态
#[derive(Default)]
struct MockStats {
    /// 当前在跑的站点数（开注册页 +1，加卡核实完成 -1）
    active: AtomicUsize,
    max_active: AtomicUsize,
    /// 收到的桥接调用 (站点 URL 片段, action)
    calls: Mutex<Vec<(String, String)>>,
}

impl MockStats {
    fn begin(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn end(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn record_call(&self, url: &str, action: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), action.to_string()));
    }

    fn calls_with_action(&self, action: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, a)| a == action)
            .count()
    }
}

struct MockPage {
    url: String,
    behavior: SiteBehavior,
    stats: Arc<MockStats>,
    /// 注册页完成加卡核实后只减一次计数
    counted_done: AtomicBool,
    is_register_page: bool,
    alive: AtomicBool,
}

impl MockPage {
    fn token_present(&self) -> bool {
        if self.url.contains("/Login") {
            self.behavior.login_token
        } else {
            self.behavior.register_token
        }
    }
}

#[async_trait]
impl PageHandle for MockPage {
    async fn navigate(&self, _url: &str, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn inject(&self, _script: &str) -> DriverResult<()> {
        Ok(())
    }

    async fn evaluate(&self, expr: &str) -> DriverResult<JsonValue> {
        // 桥接调用：按 action 分发
        for action in ["autoFill", "autoLogin", "fillWithdrawForm", "checkPromotion"] {
            if expr.contains(&format!("action: '{}'", action)) {
                self.stats.record_call(&self.url, action);
                return match action {
                    "autoFill" => {
                        if self.behavior.autofill_delay_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(
                                self.behavior.autofill_delay_ms,
                            ))
                            .await;
                        }
                        Ok(json!({ "success": self.behavior.autofill_ok }))
                    }
                    "fillWithdrawForm" => Ok(json!({ "success": self.behavior.bank_fill_ok })),
                    _ => Ok(json!({ "success": true })),
                };
            }
        }

        // 登录启发式信号采集（要在 token 探测之前分发，表达式里也有 cookie 字样）
        if expr.contains("hasAuthTokens") {
            return Ok(json!({
                "hasAuthTokens": self.token_present(),
                "hasLoginForm": true,
            }));
        }

        // 表单就位探测
        if expr.contains("__registerFormReady") {
            return Ok(json!(true));
        }

        // 桥接就位探测
        if expr.contains("_chromeMessageListener") {
            return Ok(json!(true));
        }

        // 银行卡快照
        if expr.contains("__readBankDetail") {
            if self.is_register_page
                && self
                    .counted_done
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                self.stats.end();
            }
            return Ok(self.behavior.bank_snapshot.clone());
        }

        // 优惠快照
        if expr.contains("__readPromoStatus") {
            return Ok(self.behavior.promo_snapshot.clone());
        }

        // token 探测
        if expr.contains("document.cookie") {
            return Ok(json!(self.token_present()));
        }

        Ok(JsonValue::Null)
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.url.clone())
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn bring_to_front(&self) -> DriverResult<()> {
        Ok(())
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn close(&self) -> DriverResult<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct MockSpace {
    host: Arc<MockHostInner>,
    pages: Mutex<Vec<Arc<dyn PageHandle>>>,
}

#[async_trait]
impl SharedSpace for MockSpace {
    async fn open_page(&self, url: &str) -> DriverResult<Arc<dyn PageHandle>> {
        let page = self.host.make_page(url, false)?;
        self.pages.lock().unwrap().push(page.clone());
        Ok(page)
    }

    async fn pages(&self) -> DriverResult<Vec<Arc<dyn PageHandle>>> {
        Ok(self.pages.lock().unwrap().clone())
    }

    async fn is_alive(&self) -> bool {
        true
    }

    async fn close_blank_pages(&self) -> DriverResult<usize> {
        Ok(0)
    }
}

struct MockHostInner {
    behaviors: HashMap<String, SiteBehavior>,
    stats: Arc<MockStats>,
    promo_context_fails: bool,
}

impl MockHostInner {
    fn behavior_for(&self, url: &str) -> SiteBehavior {
        self.behaviors
            .iter()
            .find(|(key, _)| url.contains(key.as_str()))
            .map(|(_, b)| b.clone())
            .unwrap_or_default()
    }

    fn make_page(&self, url: &str, is_register_page: bool) -> DriverResult<Arc<dyn PageHandle>> {
        Ok(Arc::new(MockPage {
            url: url.to_string(),
            behavior: self.behavior_for(url),
            stats: self.stats.clone(),
            counted_done: AtomicBool::new(false),
            is_register_page,
            alive: AtomicBool::new(true),
        }))
    }
}

struct MockHost {
    inner: Arc<MockHostInner>,
}

#[async_trait]
impl BrowserHost for MockHost {
    async fn open_page(&self, url: &str) -> DriverResult<Arc<dyn PageHandle>> {
        self.inner.stats.begin();
        self.inner.make_page(url, true)
    }

    async fn create_login_window(&self) -> DriverResult<Arc<dyn SharedSpace>> {
        Ok(Arc::new(MockSpace {
            host: self.inner.clone(),
            pages: Mutex::new(Vec::new()),
        }))
    }

    async fn create_promo_context(&self) -> DriverResult<Arc<dyn SharedSpace>> {
        if self.inner.promo_context_fails {
            return Err(DriverError::ContextCreationFailed {
                reason: "测试注入的引导失败".to_string(),
            });
        }
        Ok(Arc::new(MockSpace {
            host: self.inner.clone(),
            pages: Mutex::new(Vec::new()),
        }))
    }
}

// ========== 测试装配 ==========

struct CaptureSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for CaptureSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
    fn notify_status(&self, _username: &str, _status: &str, _message: &str) {}
}

fn fast_config() -> Config {
    Config {
        check_promo: true,
        promo_requires_verified: true,
        token_poll_attempts: 3,
        token_poll_interval_secs: 0,
        inject_retry_attempts: 2,
        inject_retry_delay_secs: 0,
        bank_verify_attempts: 2,
        bank_verify_delay_secs: 0,
        bank_settle_min_secs: 0,
        bank_settle_max_secs: 0,
        sequential_settle_secs: 0,
        page_settle_secs: 0,
        promo_poll_rounds: 2,
        promo_poll_interval_secs: 0,
        bridge_call_timeout_secs: 5,
        tab_rotation_interval_secs: 120,
        promo_rotation_interval_secs: 120,
        dashboard_endpoint: String::new(),
        ..Config::default()
    }
}

fn site(name: &str) -> Site {
    Site {
        name: name.to_string(),
        register_url: format!("https://{}.example/Account/Register", name),
        login_url: None,
        withdraw_url: None,
        promo_url: Some(format!("https://{}.example/Promo/Deposit", name)),
    }
}

fn profile() -> Arc<ProfileData> {
    Arc::new(
        toml::from_str(
            r#"
            username = "user01"
            password = "pass"
            withdraw_password = "wpass"
            fullname = "NGUYEN VAN A"
            bank_name = "VCB"
            bank_branch = "TP. Hồ Chí Minh"
            account_number = "0123456789"
            "#,
        )
        .unwrap(),
    )
}

struct TestRig {
    app: App,
    stats: Arc<MockStats>,
    sink_events: Arc<CaptureSink>,
}

fn build_rig(
    config: Config,
    behaviors: HashMap<String, SiteBehavior>,
    promo_context_fails: bool,
) -> TestRig {
    let stats = Arc::new(MockStats::default());
    let inner = Arc::new(MockHostInner {
        behaviors,
        stats: stats.clone(),
        promo_context_fails,
    });
    let sink = Arc::new(CaptureSink {
        events: Mutex::new(Vec::new()),
    });
    let app = App::with_host(
        config,
        Arc::new(MockHost {
            inner,
        }),
        sink.clone(),
        "window._chromeMessageListener = window._chromeMessageListener || function(){};",
    );
    TestRig {
        app,
        stats,
        sink_events: sink,
    }
}

// ========== 测试 ==========

/// 滑动窗口：同时在跑的站点数永远不超过窗口宽度，且全部到达终态
#[tokio::test(flavor = "multi_thread")]
async fn test_sliding_window_bound_and_full_completion() {
    let mut config = fast_config();
    config.check_promo = false;

    let mut behaviors = HashMap::new();
    for name in ["s1", "s2", "s3", "s4", "s5"] {
        behaviors.insert(
            format!("{}.example", name),
            SiteBehavior {
                autofill_delay_ms: 80,
                ..SiteBehavior::default()
            },
        );
    }

    let rig = build_rig(config, behaviors, false);
    let sites: Vec<Site> = ["s1", "s2", "s3", "s4", "s5"].iter().map(|n| site(n)).collect();

    let results = rig
        .app
        .run_batch(sites, profile(), ExecutionMode::Sliding(2))
        .await
        .unwrap();

    assert_eq!(results.len(), 5);
    for run in &results {
        assert!(
            matches!(
                run.status,
                SequenceStatus::Succeeded | SequenceStatus::PartiallyFailed
            ),
            "站点 {} 未到达成功终态: {:?}",
            run.site_name,
            run.status
        );
    }
    // 窗口上界：任何时刻最多 2 个在跑
    assert!(
        rig.stats.max_active.load(Ordering::SeqCst) <= 2,
        "滑动窗口越界: 观测到 {} 个并发",
        rig.stats.max_active.load(Ordering::SeqCst)
    );
}

/// 重复批次：在途期间拒绝，结束后放行
#[tokio::test(flavor = "multi_thread")]
async fn test_duplicate_batch_rejected_then_allowed() {
    let mut config = fast_config();
    config.check_promo = false;

    let mut behaviors = HashMap::new();
    for name in ["d1", "d2"] {
        behaviors.insert(
            format!("{}.example", name),
            SiteBehavior {
                autofill_delay_ms: 300,
                ..SiteBehavior::default()
            },
        );
    }

    let rig = build_rig(config, behaviors, false);
    let app = Arc::new(rig.app);
    let sites: Vec<Site> = ["d1", "d2"].iter().map(|n| site(n)).collect();

    let app_clone = app.clone();
    let sites_clone = sites.clone();
    let first = tokio::spawn(async move {
        app_clone
            .run_batch(sites_clone, profile(), ExecutionMode::Parallel)
            .await
    });

    // 等第一个批次真正开始执行
    tokio::time::sleep(Duration::from_millis(100)).await;

    // 同一组站点（顺序打乱也算同一指纹）在途期间被拒绝
    let shuffled: Vec<Site> = ["d2", "d1"].iter().map(|n| site(n)).collect();
    let rejected = app
        .run_batch(shuffled, profile(), ExecutionMode::Parallel)
        .await;
    assert!(matches!(
        rejected,
        Err(ScheduleError::DuplicateBatch { .. })
    ));

    let first_results = first.await.unwrap().unwrap();
    assert_eq!(first_results.len(), 2);

    // 批次结束后重新提交成功
    let again = app
        .run_batch(sites, profile(), ExecutionMode::Parallel)
        .await;
    assert!(again.is_ok());
}

/// 批次内站点重复直接拒绝
#[tokio::test]
async fn test_duplicate_target_in_batch_rejected() {
    let rig = build_rig(fast_config(), HashMap::new(), false);
    let result = rig
        .app
        .run_batch(
            vec![site("x"), site("x")],
            profile(),
            ExecutionMode::Parallel,
        )
        .await;
    assert!(matches!(
        result,
        Err(ScheduleError::DuplicateTarget { .. })
    ));

    let empty = rig
        .app
        .run_batch(Vec::new(), profile(), ExecutionMode::Parallel)
        .await;
    assert!(matches!(empty, Err(ScheduleError::EmptyBatch)));
}

/// 混合结局的三站点批次：1 失败 / 1 全成功 / 1 部分成功
#[tokio::test(flavor = "multi_thread")]
async fn test_three_target_scenario() {
    let config = fast_config();

    let mut behaviors = HashMap::new();
    // A: 注册后始终无 token → 注册失败，下游全跳过
    behaviors.insert(
        "aa.example".to_string(),
        SiteBehavior {
            register_token: false,
            ..SiteBehavior::default()
        },
    );
    // B: 全程顺利，银行卡字段完全匹配，优惠领取成功
    behaviors.insert("bb.example".to_string(), SiteBehavior::default());
    // C: 银行卡只有"表单消失"的弱信号 → 优惠按策略跳过
    behaviors.insert(
        "cc.example".to_string(),
        SiteBehavior {
            bank_snapshot: form_disappeared_snapshot(),
            ..SiteBehavior::default()
        },
    );

    let rig = build_rig(config, behaviors, false);
    let sites = vec![site("aa"), site("bb"), site("cc")];

    let results = rig
        .app
        .run_batch(sites, profile(), ExecutionMode::Sliding(2))
        .await
        .unwrap();

    let by_name = |name: &str| results.iter().find(|r| r.site_name == name).unwrap();

    // A: 注册失败，其余全部 skipped（从未尝试）
    let a = by_name("aa");
    assert_eq!(a.status, SequenceStatus::Failed);
    assert!(!a.register.success);
    assert!(a.login.skipped && a.add_bank.skipped && a.check_promo.skipped);

    // B: 全成功且核实
    let b = by_name("bb");
    assert_eq!(b.status, SequenceStatus::Succeeded);
    assert!(b.register.verified && b.login.verified && b.add_bank.verified);
    assert!(b.check_promo.success);

    // C: 加卡弱成功，优惠被策略跳过
    let c = by_name("cc");
    assert_eq!(c.status, SequenceStatus::PartiallyFailed);
    assert!(c.add_bank.success && !c.add_bank.verified);
    assert!(c.check_promo.skipped);

    // 聚合：1 失败 1 成功 1 部分成功
    let count = |s: SequenceStatus| results.iter().filter(|r| r.status == s).count();
    assert_eq!(count(SequenceStatus::Failed), 1);
    assert_eq!(count(SequenceStatus::Succeeded), 1);
    assert_eq!(count(SequenceStatus::PartiallyFailed), 1);
}

/// 严格顺序：登录核实不过，加卡/优惠从未被尝试（桥接层无调用痕迹）
#[tokio::test(flavor = "multi_thread")]
async fn test_unverified_login_skips_downstream() {
    let mut config = fast_config();
    config.login_strict_token = true;

    let mut behaviors = HashMap::new();
    behaviors.insert(
        "ll.example".to_string(),
        SiteBehavior {
            register_token: true,
            login_token: false,
            ..SiteBehavior::default()
        },
    );

    let rig = build_rig(config, behaviors, false);
    let results = rig
        .app
        .run_batch(vec![site("ll")], profile(), ExecutionMode::Parallel)
        .await
        .unwrap();

    let run = &results[0];
    assert_eq!(run.status, SequenceStatus::Failed);
    assert!(!run.login.success);
    assert!(run.add_bank.skipped && run.check_promo.skipped);
    // 时间戳不回头
    assert!(run.login.timestamp >= run.register.timestamp);
    // 加卡桥接调用从未发生
    assert_eq!(rig.stats.calls_with_action("fillWithdrawForm"), 0);
}

/// 进度事件单调递增
#[tokio::test(flavor = "multi_thread")]
async fn test_progress_events_monotonic() {
    let mut config = fast_config();
    config.check_promo = false;

    let mut behaviors = HashMap::new();
    for name in ["p1", "p2"] {
        behaviors.insert(format!("{}.example", name), SiteBehavior::default());
    }

    let rig = build_rig(config, behaviors, false);
    let sites: Vec<Site> = ["p1", "p2"].iter().map(|n| site(n)).collect();
    rig.app
        .run_batch(sites, profile(), ExecutionMode::Parallel)
        .await
        .unwrap();

    let events = rig.sink_events.events.lock().unwrap();
    assert!(!events.is_empty());
    let mut currents: Vec<usize> = events.iter().map(|e| e.current).collect();
    currents.sort_unstable();
    assert_eq!(currents, (1..=events.len()).collect::<Vec<_>>());
}

/// 优惠上下文引导失败：注册/登录/加卡照常，优惠带原因跳过
#[tokio::test(flavor = "multi_thread")]
async fn test_promo_bootstrap_failure_degrades_gracefully() {
    let config = fast_config();

    let mut behaviors = HashMap::new();
    behaviors.insert("gg.example".to_string(), SiteBehavior::default());

    let rig = build_rig(config, behaviors, true);
    let results = rig
        .app
        .run_batch(vec![site("gg")], profile(), ExecutionMode::Parallel)
        .await
        .unwrap();

    let run = &results[0];
    assert!(run.register.verified && run.login.verified && run.add_bank.verified);
    assert!(run.check_promo.skipped);
    assert!(run
        .check_promo
        .message
        .as_deref()
        .unwrap_or_default()
        .contains("共享优惠上下文不可用"));
}

/// 串行模式也能跑完整批
#[tokio::test(flavor = "multi_thread")]
async fn test_sequential_mode_completes() {
    let mut config = fast_config();
    config.check_promo = false;

    let mut behaviors = HashMap::new();
    for name in ["q1", "q2"] {
        behaviors.insert(format!("{}.example", name), SiteBehavior::default());
    }

    let rig = build_rig(config, behaviors, false);
    let sites: Vec<Site> = ["q1", "q2"].iter().map(|n| site(n)).collect();
    let results = rig
        .app
        .run_batch(sites, profile(), ExecutionMode::Sequential)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.register.verified));
}
