//! 共享资源池
//!
//! 一个批次里有两件昂贵的共享资源：登录用的共享窗口、领优惠用的共享上下文。
//! 几十个流程会在同一瞬间来要同一件资源，不变量是：
//!
//! - 同一个 key 的创建操作**最多执行一次**（第一个到的发起创建，其余等同一个结果）
//! - 创建失败也是粘性的：所有等待者收到同一个失败，不会各自再试
//! - 已创建的资源中途死掉时直接报 `ResourceLost`，**不会**静默重建
//!   （重建会悄悄打破"所有流程共享同一个窗口"的前提）
//! - 池子从不主动关闭资源，关闭是批次收尾的事

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::PoolError;
use crate::infrastructure::SharedSpace;

/// 池内资源的 key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKey {
    /// 登录步骤共用的浏览器窗口
    LoginWindow,
    /// 领取优惠共用的浏览器上下文
    PromoContext,
}

impl PoolKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKey::LoginWindow => "login_window",
            PoolKey::PromoContext => "promo_context",
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 每个 key 的槽位：创建结果（成功或粘性失败）
type Slot = Result<Arc<dyn SharedSpace>, String>;

/// 共享空间资源池
pub struct SharedSpacePool {
    cells: Mutex<HashMap<PoolKey, Arc<OnceCell<Slot>>>>,
}

impl SharedSpacePool {
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// 取出（或创建）共享资源
    ///
    /// 并发调用时只有第一个触发 `factory`，其余等待同一个结果。
    /// 已创建的资源先做存活检查，死了就快速失败。
    pub async fn get_or_create<F, Fut>(
        &self,
        key: PoolKey,
        factory: F,
    ) -> Result<Arc<dyn SharedSpace>, PoolError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<Arc<dyn SharedSpace>>>,
    {
        let cell = {
            let mut cells = self.cells.lock().expect("资源池锁中毒");
            cells
                .entry(key)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let already_created = cell.initialized();

        let slot = cell
            .get_or_init(|| async move {
                info!("🪟 正在创建共享资源: {}", key);
                match factory().await {
                    Ok(space) => {
                        // 新窗口可能自动带出空白标签页，顺手收掉
                        match space.close_blank_pages().await {
                            Ok(0) => {}
                            Ok(n) => info!("🧹 已清理 {} 个空白标签页 ({})", n, key),
                            Err(e) => warn!("⚠️ 清理空白标签页失败 ({}): {}", key, e),
                        }
                        info!("✅ 共享资源创建完成: {}", key);
                        Ok(space)
                    }
                    Err(e) => {
                        warn!("❌ 共享资源创建失败 ({}): {}", key, e);
                        Err(e.to_string())
                    }
                }
            })
            .await;

        let space = match slot {
            Ok(space) => space.clone(),
            Err(reason) => {
                return Err(PoolError::CreationFailed {
                    key: key.as_str().to_string(),
                    reason: reason.clone(),
                })
            }
        };

        // 只对"早已创建"的资源做存活检查；刚创建出来的没必要再问一遍
        if already_created && !space.is_alive().await {
            return Err(PoolError::ResourceLost {
                key: key.as_str().to_string(),
            });
        }

        Ok(space)
    }

    /// 资源已创建成功时取出，否则 None（不会触发创建）
    pub async fn get_if_ready(&self, key: PoolKey) -> Option<Arc<dyn SharedSpace>> {
        let cell = {
            let cells = self.cells.lock().expect("资源池锁中毒");
            cells.get(&key).cloned()
        }?;
        match cell.get() {
            Some(Ok(space)) => Some(space.clone()),
            _ => None,
        }
    }
}

impl Default for SharedSpacePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DriverError, DriverResult};
    use crate::infrastructure::PageHandle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// 测试用共享空间：记录自己是否存活
    struct FakeSpace {
        alive: AtomicBool,
    }

    #[async_trait]
    impl SharedSpace for FakeSpace {
        async fn open_page(&self, _url: &str) -> DriverResult<Arc<dyn PageHandle>> {
            Err(DriverError::PageCreationFailed {
                reason: "测试空间不开页".to_string(),
            })
        }

        async fn pages(&self) -> DriverResult<Vec<Arc<dyn PageHandle>>> {
            Ok(Vec::new())
        }

        async fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn close_blank_pages(&self) -> DriverResult<usize> {
            Ok(0)
        }
    }

    fn fake_space() -> Arc<FakeSpace> {
        Arc::new(FakeSpace {
            alive: AtomicBool::new(true),
        })
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_creates_once() {
        let pool = Arc::new(SharedSpacePool::new());
        let created = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            let created = created.clone();
            handles.push(tokio::spawn(async move {
                pool.get_or_create(PoolKey::PromoContext, || async move {
                    // 放大创建窗口期，让并发调用真的撞上
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    created.fetch_add(1, Ordering::SeqCst);
                    Ok(fake_space() as Arc<dyn SharedSpace>)
                })
                .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        // 16 个并发调用，底层创建只发生 1 次
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_creation_failure_is_sticky() {
        let pool = SharedSpacePool::new();
        let created = AtomicUsize::new(0);

        let first = pool
            .get_or_create(PoolKey::LoginWindow, || async {
                created.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("窗口创建失败")
            })
            .await;
        assert!(matches!(first, Err(PoolError::CreationFailed { .. })));

        // 第二次调用不会再触发创建，拿到同一个失败
        let second = pool
            .get_or_create(PoolKey::LoginWindow, || async {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(fake_space() as Arc<dyn SharedSpace>)
            })
            .await;
        assert!(matches!(second, Err(PoolError::CreationFailed { .. })));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dead_resource_reports_lost_not_recreated() {
        let pool = SharedSpacePool::new();
        let space = fake_space();
        let space_clone = space.clone();

        pool.get_or_create(PoolKey::PromoContext, || async move {
            Ok(space_clone as Arc<dyn SharedSpace>)
        })
        .await
        .unwrap();

        space.alive.store(false, Ordering::SeqCst);

        let created_again = AtomicUsize::new(0);
        let result = pool
            .get_or_create(PoolKey::PromoContext, || async {
                created_again.fetch_add(1, Ordering::SeqCst);
                Ok(fake_space() as Arc<dyn SharedSpace>)
            })
            .await;

        assert!(matches!(result, Err(PoolError::ResourceLost { .. })));
        assert_eq!(created_again.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_if_ready() {
        let pool = SharedSpacePool::new();
        assert!(pool.get_if_ready(PoolKey::PromoContext).await.is_none());

        pool.get_or_create(PoolKey::PromoContext, || async {
            Ok(fake_space() as Arc<dyn SharedSpace>)
        })
        .await
        .unwrap();

        assert!(pool.get_if_ready(PoolKey::PromoContext).await.is_some());
    }
}
