//! 页面驱动能力 - 基础设施层
//!
//! 流程层只认识这三个 trait，不认识 chromiumoxide：
//!
//! - `PageHandle`: 单个标签页的能力（导航 / 注入 / 执行脚本 / 置前）
//! - `SharedSpace`: 被多个流程共用的浏览器窗口或上下文
//! - `BrowserHost`: 顶层浏览器，负责开页面和创建共享空间
//!
//! CDP 实现在 `browser::cdp_driver`，测试用 mock 实现同一组 trait。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::DriverResult;

/// 单个标签页
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// 导航到 URL，超时按 `timeout` 截断
    async fn navigate(&self, url: &str, timeout: Duration) -> DriverResult<()>;

    /// 注入桥接脚本
    async fn inject(&self, script: &str) -> DriverResult<()>;

    /// 在页面上下文执行 JS 并返回 JSON 结果
    async fn evaluate(&self, expr: &str) -> DriverResult<JsonValue>;

    /// 当前 URL
    async fn current_url(&self) -> DriverResult<String>;

    /// 标签页是否还活着
    async fn is_alive(&self) -> bool;

    /// 把标签页带到前台（防止后台节流）
    async fn bring_to_front(&self) -> DriverResult<()>;

    /// 截图（PNG 字节）
    async fn screenshot(&self) -> DriverResult<Vec<u8>>;

    /// 关闭标签页
    async fn close(&self) -> DriverResult<()>;
}

/// 共享的浏览器窗口/上下文
///
/// 多个流程各自往里开自己的标签页，互不触碰对方的页。
#[async_trait]
pub trait SharedSpace: Send + Sync {
    /// 在共享空间里开一个新标签页
    async fn open_page(&self, url: &str) -> DriverResult<Arc<dyn PageHandle>>;

    /// 共享空间里当前所有（仍存活的）标签页
    async fn pages(&self) -> DriverResult<Vec<Arc<dyn PageHandle>>>;

    /// 共享空间本身是否还活着
    async fn is_alive(&self) -> bool;

    /// 清理新窗口自动带出来的空白标签页；正在使用中的页不动
    async fn close_blank_pages(&self) -> DriverResult<usize>;
}

/// 顶层浏览器
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// 在默认窗口开一个标签页
    async fn open_page(&self, url: &str) -> DriverResult<Arc<dyn PageHandle>>;

    /// 创建共用的登录窗口（批次内最多建一次，由资源池把关）
    async fn create_login_window(&self) -> DriverResult<Arc<dyn SharedSpace>>;

    /// 创建共用的优惠上下文（批次内最多建一次，由资源池把关）
    async fn create_promo_context(&self) -> DriverResult<Arc<dyn SharedSpace>>;
}
