//! # Auto Register Sequence
//!
//! 一个用于多站点自动开户流程的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（浏览器标签页），只暴露能力
//! - `PageHandle` / `SharedSpace` / `BrowserHost` - 驱动 trait，CDP 实现在 `browser/`
//! - `JsBridge` - 和页面注入脚本对话的唯一通道
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `ProgressReporter` - 进度上报能力（单调递增，投递失败不致命）
//! - `AccountSaver` - 账户信息落盘能力（批次内一次性闩锁）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个站点"的完整流程
//! - `SequenceCtx` - 上下文封装（站点名 + 序号）
//! - `SequenceRunner` - 流程编排（注册 → 登录 → 加卡 → 优惠），
//!   每步由核实引擎独立下结论，上游失败下游跳过
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批次调度器，管理资源、并发与准入
//! - `orchestrator/run_registry` - 在途批次指纹登记（重复批次拒绝）
//!
//! ## 横切支撑
//!
//! - `pool` - 共享资源池（并发首次访问只创建一次）
//! - `rotator` - 标签页轮换（防后台节流，空集自停）
//! - `verify` - 核实引擎（token / 字段比对 / 启发式）
//! - `retry` - 重试与轮询组合子（错误分类决定行为）

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod pool;
pub mod retry;
pub mod rotator;
pub mod services;
pub mod utils;
pub mod verify;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, ExecutionMode};
pub use error::{AppError, AppResult, DriverError, PoolError, ScheduleError};
pub use infrastructure::{BrowserHost, JsBridge, PageHandle, SharedSpace};
pub use models::{ProfileData, SequenceRun, SequenceStatus, Site, Stage, StepResult};
pub use orchestrator::{batch_fingerprint, App};
pub use pool::{PoolKey, SharedSpacePool};
pub use rotator::{PromoRotator, TabRotator};
pub use verify::{Verification, VerificationEngine};
pub use workflow::{SequenceCtx, SequenceRunner};
