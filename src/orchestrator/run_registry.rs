//! 在途批次登记表
//!
//! 同一组站点不允许并发跑两个批次（会互相抢同一个账号的会话）。
//! 登记表由调度器实例持有，不做进程级全局状态，多个实例（测试里常见）
//! 互不干扰。
//!
//! 登记在批次"真正开始执行"时写入，批次结束（无论成败）时由守卫的
//! Drop 移除，等价于 finally 语义。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::error::ScheduleError;
use crate::models::Site;

/// 计算批次指纹：按注册 URL 排序后哈希，和提交顺序无关
pub fn batch_fingerprint(sites: &[Site]) -> String {
    let mut ids: Vec<&str> = sites.iter().map(|s| s.register_url.as_str()).collect();
    ids.sort_unstable();

    let mut hasher = DefaultHasher::new();
    for id in ids {
        id.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

/// 在途批次登记表
#[derive(Clone)]
pub struct RunRegistry {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 原子的查重 + 登记；重复批次直接拒绝，不排队不合并
    pub fn try_admit(&self, fingerprint: &str) -> Result<RunGuard, ScheduleError> {
        let mut set = self.inner.lock().expect("登记表锁中毒");
        if !set.insert(fingerprint.to_string()) {
            return Err(ScheduleError::DuplicateBatch {
                fingerprint: fingerprint.to_string(),
            });
        }
        Ok(RunGuard {
            fingerprint: fingerprint.to_string(),
            set: self.inner.clone(),
        })
    }

    pub fn is_running(&self, fingerprint: &str) -> bool {
        self.inner
            .lock()
            .expect("登记表锁中毒")
            .contains(fingerprint)
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 批次执行守卫：活着 = 批次在途；Drop = 注销
pub struct RunGuard {
    fingerprint: String,
    set: Arc<Mutex<HashSet<String>>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.fingerprint);
        }
    }
}
