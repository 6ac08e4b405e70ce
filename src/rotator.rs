//! 标签页轮换
//!
//! 并行跑多个站点时只有前台标签页全速执行，后台标签页会被浏览器节流。
//! 轮换器按固定间隔把未完成的标签页轮流带到前台，保证每个页都能分到时间。
//!
//! - `TabRotator`: 主流程标签页，一次只置前一个（round-robin），
//!   没有可轮换的页时自动停止
//! - `PromoRotator`: 共享优惠上下文，页少且短命，每个 tick 把所有活着的页
//!   都过一遍；只有上下文整体坏掉才停

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infrastructure::{PageHandle, SharedSpace};
use crate::retry::{classify, ErrorClass};

/// 轮换条目
#[derive(Clone)]
pub struct RotatorEntry {
    pub name: String,
    pub page: Arc<dyn PageHandle>,
}

struct RotatorShared {
    entries: Mutex<Vec<RotatorEntry>>,
    completed: Mutex<HashSet<String>>,
    running: AtomicBool,
    activations: AtomicUsize,
}

/// 主流程标签页轮换器
pub struct TabRotator {
    interval: Duration,
    dwell: Duration,
    shared: Arc<RotatorShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TabRotator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            dwell: Duration::from_millis(100),
            shared: Arc::new(RotatorShared {
                entries: Mutex::new(Vec::new()),
                completed: Mutex::new(HashSet::new()),
                running: AtomicBool::new(false),
                activations: AtomicUsize::new(0),
            }),
            handle: Mutex::new(None),
        }
    }

    /// 用一批已知标签页启动轮换
    pub fn start(&self, entries: Vec<RotatorEntry>) {
        {
            let mut current = self.shared.entries.lock().expect("轮换器锁中毒");
            *current = entries;
        }
        self.spawn_loop();
    }

    /// 动态登记一个标签页；轮换循环没在跑就顺便拉起来
    pub fn register(&self, name: impl Into<String>, page: Arc<dyn PageHandle>) {
        {
            let mut entries = self.shared.entries.lock().expect("轮换器锁中毒");
            entries.push(RotatorEntry {
                name: name.into(),
                page,
            });
        }
        self.spawn_loop();
    }

    /// 标记某个站点完成（注册+加卡都结束了）
    ///
    /// 完成的页不再被轮换触碰，但也不从列表里移走。
    pub fn mark_completed(&self, name: &str) {
        let mut completed = self.shared.completed.lock().expect("轮换器锁中毒");
        if completed.insert(name.to_string()) {
            info!("✅ 标签页退出轮换: {} (已完成 {} 个)", name, completed.len());
        }
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.shared
            .completed
            .lock()
            .expect("轮换器锁中毒")
            .contains(name)
    }

    /// 手动停止轮换
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().expect("轮换器锁中毒").take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// 累计置前次数（状态展示用）
    pub fn activation_count(&self) -> usize {
        self.shared.activations.load(Ordering::SeqCst)
    }

    fn spawn_loop(&self) {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        debug!("🔄 启动标签页轮换 (间隔 {:?})", self.interval);

        let shared = self.shared.clone();
        let interval = self.interval;
        let dwell = self.dwell;
        let handle = tokio::spawn(async move {
            let mut cursor = 0usize;
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }

                // 本 tick 的候选：未完成的条目快照
                let candidates: Vec<RotatorEntry> = {
                    let entries = shared.entries.lock().expect("轮换器锁中毒");
                    let completed = shared.completed.lock().expect("轮换器锁中毒");
                    entries
                        .iter()
                        .filter(|e| !completed.contains(&e.name))
                        .cloned()
                        .collect()
                };

                // 再过滤掉已经死掉的页
                let mut eligible = Vec::new();
                for entry in candidates {
                    if entry.page.is_alive().await {
                        eligible.push(entry);
                    }
                }

                if eligible.is_empty() {
                    info!("🛑 没有需要轮换的标签页，轮换自动停止");
                    shared.running.store(false, Ordering::SeqCst);
                    break;
                }

                cursor = (cursor + 1) % eligible.len();
                let next = &eligible[cursor];
                match next.page.bring_to_front().await {
                    Ok(()) => {
                        shared.activations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(dwell).await;
                    }
                    Err(e) => {
                        // 单个页置前失败不影响其他页
                        debug!("⚠️ 置前失败 ({}): {}", next.name, e);
                    }
                }
            }
        });

        *self.handle.lock().expect("轮换器锁中毒") = Some(handle);
    }
}

impl Drop for TabRotator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 优惠共享上下文轮换器
///
/// 和主轮换器不同：每个 tick 把上下文里所有活着的页都置前一遍。
/// 上下文刚建好时还没有页，空 tick 是常态，不触发自动停止；
/// 只有上下文本体坏掉（系统性错误）才停。
pub struct PromoRotator {
    interval: Duration,
    dwell: Duration,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PromoRotator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            dwell: Duration::from_millis(200),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self, space: Arc<dyn SharedSpace>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        info!("🎁 启动优惠窗口轮换 (间隔 {:?})", self.interval);

        let running = self.running.clone();
        let interval = self.interval;
        let dwell = self.dwell;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                if !space.is_alive().await {
                    warn!("🛑 优惠上下文已销毁，轮换停止");
                    running.store(false, Ordering::SeqCst);
                    break;
                }

                let pages = match space.pages().await {
                    Ok(pages) => pages,
                    Err(e) => match classify(&e) {
                        ErrorClass::TabClosed | ErrorClass::ContextDestroyed | ErrorClass::Fatal => {
                            warn!("🛑 优惠上下文枚举失败，轮换停止: {}", e);
                            running.store(false, Ordering::SeqCst);
                            break;
                        }
                        ErrorClass::Transient => {
                            debug!("⚠️ 优惠页枚举瞬时失败: {}", e);
                            continue;
                        }
                    },
                };

                for page in pages {
                    if !page.is_alive().await {
                        continue;
                    }
                    if let Err(e) = page.bring_to_front().await {
                        // 单个页失败跳过即可
                        debug!("⚠️ 优惠页置前失败: {}", e);
                        continue;
                    }
                    tokio::time::sleep(dwell).await;
                }
            }
        });

        *self.handle.lock().expect("轮换器锁中毒") = Some(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().expect("轮换器锁中毒").take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for PromoRotator {
    fn drop(&mut self) {
        self.stop();
    }
}
