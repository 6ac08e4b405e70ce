//! 页面桥接调用器 - 基础设施层
//!
//! 持有一个标签页，只暴露"和注入脚本对话"的能力。
//! 表单怎么定位、验证码怎么处理都在注入脚本里，本模块一概不知。

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::DriverResult;
use crate::infrastructure::PageHandle;

/// 注入脚本在页面里挂出的入口函数名
pub const BRIDGE_ENTRY: &str = "_chromeMessageListener";

/// 桥接调用的回包
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// 页面桥接调用器
///
/// 职责：
/// - 持有一个 PageHandle
/// - 暴露 eval() / call() 能力
/// - 不认识 Site / ProfileData
/// - 不处理业务流程
pub struct JsBridge {
    page: Arc<dyn PageHandle>,
    call_timeout: Duration,
}

impl JsBridge {
    pub fn new(page: Arc<dyn PageHandle>, call_timeout: Duration) -> Self {
        Self { page, call_timeout }
    }

    /// 获取标签页引用（用于导航、置前等其他操作）
    pub fn page(&self) -> &Arc<dyn PageHandle> {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> DriverResult<JsonValue> {
        self.page.evaluate(&js_code.into()).await
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> DriverResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value).map_err(|e| {
            crate::error::DriverError::EvalFailed {
                reason: format!("返回值反序列化失败: {}", e),
            }
        })?;
        Ok(typed_value)
    }

    /// 注入脚本是否已就位
    pub async fn ready(&self) -> DriverResult<bool> {
        let expr = format!("typeof window.{} === 'function'", BRIDGE_ENTRY);
        let value = self.eval(expr).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// 调用注入脚本的一个 action，等它的异步回包
    ///
    /// 页面内用 setTimeout 兜底，超时会以 success=false 回来而不是悬死。
    pub async fn call(&self, action: &str, data: &JsonValue) -> DriverResult<BridgeResponse> {
        let js_code = build_bridge_call(action, data, self.call_timeout);
        let value = self.eval(js_code).await?;
        let response = serde_json::from_value(value).map_err(|e| {
            crate::error::DriverError::EvalFailed {
                reason: format!("桥接回包解析失败 (action={}): {}", action, e),
            }
        })?;
        Ok(response)
    }
}

/// 拼出桥接调用的 JS
fn build_bridge_call(action: &str, data: &JsonValue, timeout: Duration) -> String {
    format!(
        r#"
        (() => {{
            return new Promise((resolve) => {{
                const timeout = setTimeout(() => {{
                    resolve({{ success: false, error: '桥接调用超时: {action}' }});
                }}, {timeout_ms});

                if (typeof window.{entry} === 'function') {{
                    window.{entry}(
                        {{ action: '{action}', data: {data} }},
                        {{}},
                        (response) => {{
                            clearTimeout(timeout);
                            resolve(response || {{ success: false, error: 'no response' }});
                        }}
                    );
                }} else {{
                    clearTimeout(timeout);
                    resolve({{ success: false, error: 'bridge not found' }});
                }}
            }});
        }})()
        "#,
        entry = BRIDGE_ENTRY,
        action = action,
        data = data,
        timeout_ms = timeout.as_millis(),
    )
}
