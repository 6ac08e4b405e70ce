//! 重试与轮询
//!
//! 所有多秒级的"等一等再看"都走这里的两个组合子，不在业务代码里手搓定时器：
//!
//! - `RetryPolicy::run`: 固定间隔重试一个易失败的异步操作
//! - `poll_until`: 固定间隔轮询一个判定条件，带次数上限
//!
//! 错误分类决定了重试行为：瞬时错误重试；标签页被关立刻放弃；
//! 执行上下文销毁立刻上抛（页面很可能是跳转了，调用方应当改为核实页面状态
//! 而不是盲目重试）。

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{DriverError, DriverResult};

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 瞬时错误，可以重试
    Transient,
    /// 标签页已被关闭，立即终止且不再重试
    TabClosed,
    /// 执行上下文被销毁，常见原因是页面跳转，需要调用方重新核实
    ContextDestroyed,
    /// 不可恢复错误，立即终止
    Fatal,
}

/// 给驱动错误分类
pub fn classify(err: &DriverError) -> ErrorClass {
    match err {
        DriverError::TabClosed => ErrorClass::TabClosed,
        DriverError::ContextDestroyed => ErrorClass::ContextDestroyed,
        DriverError::NavigationTimeout { .. }
        | DriverError::NavigationFailed { .. }
        | DriverError::ScriptInjectionFailed { .. }
        | DriverError::EvalFailed { .. }
        | DriverError::Protocol(_) => ErrorClass::Transient,
        DriverError::ConnectionFailed { .. }
        | DriverError::PageCreationFailed { .. }
        | DriverError::ContextCreationFailed { .. } => ErrorClass::Fatal,
    }
}

/// 固定间隔重试策略（刻意不用指数退避，页面操作等不起）
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// 运行一个操作，按分类决定重试还是放弃
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> DriverResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} 第 {} 次尝试成功", what, attempt);
                    }
                    return Ok(value);
                }
                Err(err) => match classify(&err) {
                    ErrorClass::Transient => {
                        warn!(
                            "{} 失败 ({}/{}): {}",
                            what, attempt, self.max_attempts, err
                        );
                        last_err = Some(err);
                        if attempt < self.max_attempts {
                            tokio::time::sleep(self.delay).await;
                        }
                    }
                    ErrorClass::TabClosed => {
                        warn!("{} 中止: 标签页已被关闭", what);
                        return Err(err);
                    }
                    ErrorClass::ContextDestroyed => {
                        debug!("{} 遇到上下文销毁，交回调用方核实", what);
                        return Err(err);
                    }
                    ErrorClass::Fatal => {
                        warn!("{} 中止: {}", what, err);
                        return Err(err);
                    }
                },
            }
        }
        Err(last_err.unwrap_or(DriverError::Protocol(format!("{} 重试耗尽", what))))
    }
}

/// 轮询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// 条件在第 attempts 次探测时满足
    Satisfied { attempts: usize },
    /// 到达次数上限仍未满足
    TimedOut { attempts: usize },
}

impl PollOutcome {
    pub fn satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }
}

/// 固定间隔轮询一个条件
///
/// 探测本身的瞬时错误不终止轮询（页面可能正在重渲染），
/// 只有"标签页被关"会立刻上抛。超时只会返回 TimedOut，
/// 永远不会被当成成功。
pub async fn poll_until<F, Fut>(
    interval: Duration,
    max_attempts: usize,
    mut probe: F,
) -> DriverResult<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DriverResult<bool>>,
{
    for attempt in 1..=max_attempts {
        match probe().await {
            Ok(true) => return Ok(PollOutcome::Satisfied { attempts: attempt }),
            Ok(false) => {}
            Err(err) => match classify(&err) {
                ErrorClass::TabClosed => return Err(err),
                _ => {
                    debug!("轮询探测失败 ({}/{}): {}", attempt, max_attempts, err);
                }
            },
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(PollOutcome::TimedOut {
        attempts: max_attempts,
    })
}
