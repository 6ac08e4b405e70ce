//! 驱动 trait 的 CDP 实现
//!
//! 把 chromiumoxide 的 Browser / Page 适配成 infrastructure 层的
//! `BrowserHost` / `SharedSpace` / `PageHandle`。上层拿到的都是 trait 对象，
//! 换 mock 跑测试不需要动任何流程代码。
//!
//! 共享空间统一用浏览器上下文实现：登录窗口的首个 target 以独立窗口打开，
//! 同一上下文里后续的标签页会聚在这个窗口里。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CloseParams};
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{DriverError, DriverResult};
use crate::infrastructure::{BrowserHost, PageHandle, SharedSpace};

/// CDP 标签页
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> DriverResult<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                let err = DriverError::from_cdp(e);
                match err {
                    DriverError::TabClosed | DriverError::ContextDestroyed => Err(err),
                    other => Err(DriverError::NavigationFailed {
                        url: url.to_string(),
                        reason: other.to_string(),
                    }),
                }
            }
            Err(_) => Err(DriverError::NavigationTimeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    async fn inject(&self, script: &str) -> DriverResult<()> {
        self.page
            .evaluate(script.to_string())
            .await
            .map_err(|e| {
                let err = DriverError::from_cdp(e);
                match err {
                    DriverError::TabClosed | DriverError::ContextDestroyed => err,
                    other => DriverError::ScriptInjectionFailed {
                        reason: other.to_string(),
                    },
                }
            })?;
        Ok(())
    }

    async fn evaluate(&self, expr: &str) -> DriverResult<JsonValue> {
        let result = self
            .page
            .evaluate(expr.to_string())
            .await
            .map_err(DriverError::from_cdp)?;
        let value = result
            .into_value()
            .map_err(|e| DriverError::EvalFailed {
                reason: format!("返回值取出失败: {}", e),
            })?;
        Ok(value)
    }

    async fn current_url(&self) -> DriverResult<String> {
        let url = self.page.url().await.map_err(DriverError::from_cdp)?;
        Ok(url.unwrap_or_default())
    }

    async fn is_alive(&self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_secs(2), self.page.url()).await,
            Ok(Ok(_))
        )
    }

    async fn bring_to_front(&self) -> DriverResult<()> {
        self.page
            .bring_to_front()
            .await
            .map_err(DriverError::from_cdp)?;
        Ok(())
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(DriverError::from_cdp)
    }

    async fn close(&self) -> DriverResult<()> {
        self.page
            .execute(CloseParams::default())
            .await
            .map_err(DriverError::from_cdp)?;
        Ok(())
    }
}

/// CDP 共享空间（浏览器上下文）
pub struct CdpSpace {
    browser: Arc<Browser>,
    context_id: BrowserContextId,
    /// 本空间里开出的标签页（自己开的自己记，CDP 没有便宜的按上下文枚举）
    pages: Mutex<Vec<Arc<dyn PageHandle>>>,
    destroyed: AtomicBool,
}

impl CdpSpace {
    async fn create(browser: Arc<Browser>, first_target_in_new_window: bool) -> DriverResult<Self> {
        let response = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| DriverError::ContextCreationFailed {
                reason: e.to_string(),
            })?;
        let context_id = response.result.browser_context_id.clone();

        let space = Self {
            browser,
            context_id,
            pages: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        };

        if first_target_in_new_window {
            // 先开一个独立窗口的锚点页，后续标签页会聚在这个窗口里
            let params = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(space.context_id.clone())
                .new_window(true)
                .build()
                .map_err(|e| DriverError::ContextCreationFailed { reason: e })?;
            let page = space
                .browser
                .new_page(params)
                .await
                .map_err(|e| DriverError::PageCreationFailed {
                    reason: e.to_string(),
                })?;
            space
                .pages
                .lock()
                .expect("共享空间锁中毒")
                .push(Arc::new(CdpPage::new(page)));
        }

        Ok(space)
    }

    fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SharedSpace for CdpSpace {
    async fn open_page(&self, url: &str) -> DriverResult<Arc<dyn PageHandle>> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(DriverError::ContextDestroyed);
        }

        let params = CreateTargetParams::builder()
            .url(url)
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(|e| DriverError::PageCreationFailed { reason: e })?;

        let page = self.browser.new_page(params).await.map_err(|e| {
            let err = DriverError::from_cdp(e);
            if matches!(err, DriverError::ContextDestroyed) {
                self.mark_destroyed();
            }
            err
        })?;

        let handle: Arc<dyn PageHandle> = Arc::new(CdpPage::new(page));
        self.pages
            .lock()
            .expect("共享空间锁中毒")
            .push(handle.clone());
        Ok(handle)
    }

    async fn pages(&self) -> DriverResult<Vec<Arc<dyn PageHandle>>> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(DriverError::ContextDestroyed);
        }
        let snapshot: Vec<Arc<dyn PageHandle>> = {
            self.pages.lock().expect("共享空间锁中毒").clone()
        };
        let mut alive = Vec::new();
        for page in snapshot {
            if page.is_alive().await {
                alive.push(page);
            }
        }
        Ok(alive)
    }

    async fn is_alive(&self) -> bool {
        if self.destroyed.load(Ordering::SeqCst) {
            return false;
        }
        // 上下文本身没有便宜的探活命令，以浏览器连接是否存活为准
        self.browser.pages().await.is_ok()
    }

    async fn close_blank_pages(&self) -> DriverResult<usize> {
        let snapshot: Vec<Arc<dyn PageHandle>> = {
            self.pages.lock().expect("共享空间锁中毒").clone()
        };
        if snapshot.len() <= 1 {
            return Ok(0);
        }

        // 最后开出的页可能正要被使用，不动它
        let mut closed = 0;
        for page in &snapshot[..snapshot.len() - 1] {
            match page.current_url().await {
                Ok(url) if url == "about:blank" || url.is_empty() => {
                    if let Err(e) = page.close().await {
                        debug!("清理空白标签页失败: {}", e);
                    } else {
                        closed += 1;
                    }
                }
                _ => {}
            }
        }
        Ok(closed)
    }
}

/// CDP 浏览器宿主
pub struct CdpHost {
    browser: Arc<Browser>,
}

impl CdpHost {
    pub fn new(browser: Browser) -> Self {
        Self {
            browser: Arc::new(browser),
        }
    }
}

#[async_trait]
impl BrowserHost for CdpHost {
    async fn open_page(&self, url: &str) -> DriverResult<Arc<dyn PageHandle>> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| DriverError::PageCreationFailed {
                reason: e.to_string(),
            })?;
        Ok(Arc::new(CdpPage::new(page)))
    }

    async fn create_login_window(&self) -> DriverResult<Arc<dyn SharedSpace>> {
        debug!("创建共享登录窗口（独立上下文 + 新窗口锚点）");
        let space = CdpSpace::create(self.browser.clone(), true).await?;
        Ok(Arc::new(space))
    }

    async fn create_promo_context(&self) -> DriverResult<Arc<dyn SharedSpace>> {
        debug!("创建共享优惠上下文");
        let space = CdpSpace::create(self.browser.clone(), false)
            .await
            .map_err(|e| {
                warn!("优惠上下文创建失败: {}", e);
                e
            })?;
        Ok(Arc::new(space))
    }
}
