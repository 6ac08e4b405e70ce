//! 批次处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责一批站点的调度和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：启动日志、连接浏览器、读入桥接脚本
//! 2. **批次准入**：站点查重、在途批次指纹查重
//! 3. **资源引导**：预建共享优惠上下文（失败则降级为不跑优惠）
//! 4. **并发控制**：全并行 / 滑动窗口 / 串行三种模式
//! 5. **轮换托管**：主标签轮换器与优惠窗口轮换器的起停
//! 6. **全局统计**：汇总所有站点的流程结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个站点的细节，向下委托 SequenceRunner
//! - **失败隔离**：单个站点失败不影响兄弟站点
//! - **滑动窗口**：完成一个立刻补位，不是一轮一轮地批

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::browser::{connect_to_browser, CdpHost};
use crate::config::{Config, ExecutionMode};
use crate::error::ScheduleError;
use crate::infrastructure::BrowserHost;
use crate::models::{self, ProfileData, SequenceRun, SequenceStatus, Site};
use crate::orchestrator::run_registry::{batch_fingerprint, RunRegistry};
use crate::pool::{PoolKey, SharedSpacePool};
use crate::rotator::{PromoRotator, TabRotator};
use crate::services::{AccountSaver, HttpProgressSink, LogProgressSink, ProgressReporter, ProgressSink};
use crate::utils::logging;
use crate::workflow::{SequenceCtx, SequenceRunner};

/// 应用主结构
pub struct App {
    config: Config,
    host: Arc<dyn BrowserHost>,
    registry: RunRegistry,
    sink: Arc<dyn ProgressSink>,
    script_bundle: Arc<String>,
}

impl App {
    /// 初始化应用（连接真实浏览器）
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)?;
        logging::log_startup(&config);

        let browser = connect_to_browser(config.browser_debug_port).await?;
        let host: Arc<dyn BrowserHost> = Arc::new(CdpHost::new(browser));

        let script_bundle = tokio::fs::read_to_string(&config.script_bundle_file)
            .await
            .with_context(|| format!("无法读取桥接脚本: {}", config.script_bundle_file))?;

        let sink: Arc<dyn ProgressSink> = if config.dashboard_endpoint.is_empty() {
            Arc::new(LogProgressSink)
        } else {
            Arc::new(HttpProgressSink::new(config.dashboard_endpoint.clone()))
        };

        Ok(Self {
            config,
            host,
            registry: RunRegistry::new(),
            sink,
            script_bundle: Arc::new(script_bundle),
        })
    }

    /// 用外部给定的宿主组装应用（测试以及无头场景）
    pub fn with_host(
        config: Config,
        host: Arc<dyn BrowserHost>,
        sink: Arc<dyn ProgressSink>,
        script_bundle: impl Into<String>,
    ) -> Self {
        Self {
            config,
            host,
            registry: RunRegistry::new(),
            sink,
            script_bundle: Arc::new(script_bundle.into()),
        }
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let sites = models::load_sites(&self.config.sites_file).await?;
        if sites.is_empty() {
            warn!("⚠️ 站点列表为空，程序结束");
            return Ok(());
        }
        let profile = models::load_profile(&self.config.profile_file).await?;

        let mode = self.config.resolve_mode(sites.len());
        logging::log_sites_loaded(sites.len(), mode);

        let results = self.run_batch(sites, Arc::new(profile), mode).await?;

        logging::print_final_stats(&results, &self.config);
        Ok(())
    }

    /// 跑一个批次
    ///
    /// 准入失败（重复批次 / 站点重复）直接返回错误；
    /// 站点各自的失败都吸收在各自的 `SequenceRun` 里。
    pub async fn run_batch(
        &self,
        sites: Vec<Site>,
        profile: Arc<ProfileData>,
        mode: ExecutionMode,
    ) -> Result<Vec<SequenceRun>, ScheduleError> {
        // ---------- 准入 ----------
        if sites.is_empty() {
            return Err(ScheduleError::EmptyBatch);
        }
        let mut seen = HashSet::new();
        for site in &sites {
            if !seen.insert(site.register_url.as_str()) {
                return Err(ScheduleError::DuplicateTarget {
                    url: site.register_url.clone(),
                });
            }
        }

        let fingerprint = batch_fingerprint(&sites);
        // 守卫活到函数结束，批次无论怎么收场都会注销（finally 语义）
        let _guard = self.registry.try_admit(&fingerprint)?;

        info!("\n{}", "=".repeat(60));
        info!("🚀 批次开始: {} 个站点, 指纹 {}", sites.len(), fingerprint);
        info!("{}", "=".repeat(60));

        // ---------- 资源引导 ----------
        let pool = Arc::new(SharedSpacePool::new());
        let rotator = Arc::new(TabRotator::new(Duration::from_secs(
            self.config.tab_rotation_interval_secs,
        )));
        let promo_rotator = PromoRotator::new(Duration::from_secs(
            self.config.promo_rotation_interval_secs,
        ));

        if self.config.check_promo {
            // 预建共享优惠上下文；建不出来就降级为不跑优惠，不拖垮注册/加卡
            let host = self.host.clone();
            match pool
                .get_or_create(PoolKey::PromoContext, || async move {
                    Ok(host.create_promo_context().await?)
                })
                .await
            {
                Ok(space) => promo_rotator.start(space),
                Err(e) => {
                    warn!("⚠️ 共享优惠上下文引导失败，本批次不跑优惠: {}", e);
                }
            }
        }

        let reporter = Arc::new(ProgressReporter::new(self.sink.clone(), sites.len() * 4));
        let runner = Arc::new(SequenceRunner {
            host: self.host.clone(),
            pool: pool.clone(),
            rotator: rotator.clone(),
            verifier: crate::verify::VerificationEngine::new(&self.config),
            reporter: reporter.clone(),
            account_saver: Arc::new(AccountSaver::new(self.config.dashboard_endpoint.clone())),
            script_bundle: self.script_bundle.clone(),
            config: self.config.clone(),
        });

        // ---------- 按模式执行 ----------
        let total = sites.len();
        let results = match mode {
            ExecutionMode::Parallel => {
                info!("🚀 全并行模式: {} 个站点同时启动", total);
                self.run_spawned(sites, profile.clone(), runner, None).await
            }
            ExecutionMode::Sliding(width) => {
                info!("🚀 滑动窗口模式: 始终保持 {} 个站点在跑", width);
                let semaphore = Arc::new(Semaphore::new(width));
                self.run_spawned(sites, profile.clone(), runner, Some(semaphore)).await
            }
            ExecutionMode::Sequential => {
                info!("📋 串行模式: 一次一个站点");
                let mut results = Vec::with_capacity(total);
                for (index, site) in sites.into_iter().enumerate() {
                    let ctx = SequenceCtx::new(&site.name, index + 1, total);
                    results.push(runner.run_for_site(&site, &profile, &ctx).await);
                    if index + 1 < total {
                        info!("⏳ 等待 {}s 后处理下一个站点...", self.config.sequential_settle_secs);
                        tokio::time::sleep(Duration::from_secs(self.config.sequential_settle_secs))
                            .await;
                    }
                }
                results
            }
        };

        // ---------- 收尾 ----------
        promo_rotator.stop();
        rotator.stop();

        let succeeded = results
            .iter()
            .filter(|r| r.status == SequenceStatus::Succeeded)
            .count();
        self.sink.notify_status(
            &profile.username,
            "completed",
            &format!("批次完成: 成功 {}/{}", succeeded, results.len()),
        );

        info!("\n{}", "─".repeat(60));
        info!("✓ 批次完成: {} 个站点, 指纹 {} 注销", results.len(), fingerprint);
        info!("{}", "─".repeat(60));

        Ok(results)
    }

    /// 并发执行（可选信号量做滑动窗口）
    ///
    /// 信号量在任务**内部**获取：任何一个站点完成即释放许可，
    /// 排队中的下一个立刻补位，而不是等一轮全部结束。
    async fn run_spawned(
        &self,
        sites: Vec<Site>,
        profile: Arc<ProfileData>,
        runner: Arc<SequenceRunner>,
        semaphore: Option<Arc<Semaphore>>,
    ) -> Vec<SequenceRun> {
        let total = sites.len();
        let mut handles = Vec::with_capacity(total);

        for (index, site) in sites.into_iter().enumerate() {
            let runner = runner.clone();
            let profile = profile.clone();
            let semaphore = semaphore.clone();
            let site_name = site.name.clone();
            let ctx = SequenceCtx::new(&site.name, index + 1, total);

            let handle = tokio::spawn(async move {
                // 信号量只在这里用，不会被关闭；万一关闭就不限流继续跑
                let _permit = match &semaphore {
                    Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
                    None => None,
                };
                info!("  [{}/{}] 启动: {}", ctx.site_index, ctx.total_sites, ctx.site_name);
                runner.run_for_site(&site, &profile, &ctx).await
            });
            handles.push((site_name, handle));
        }

        let mut results = Vec::with_capacity(total);
        for (site_name, handle) in handles {
            match handle.await {
                Ok(run) => results.push(run),
                Err(e) => {
                    error!("[站点 {}] 任务执行失败: {}", site_name, e);
                    let mut run = SequenceRun::new(site_name.clone());
                    run.register = crate::models::StepResult::failed(
                        crate::models::Stage::Register,
                        format!("任务执行失败: {}", e),
                    );
                    run.finalize();
                    results.push(run);
                }
            }
        }
        results
    }
}
