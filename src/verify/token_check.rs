//! token 检查
//!
//! 注册/登录是否真的成功，以页面上出现登录凭据为准。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::DriverResult;
use crate::infrastructure::PageHandle;
use crate::retry::{poll_until, PollOutcome};
use crate::verify::Verification;

/// 已知的登录凭据标记（cookie 名 / storage key）
pub const TOKEN_MARKERS: &[&str] = &[
    "_pat",
    "token",
    "auth",
    "authToken",
    "auth_token",
    "access_token",
    "jwt",
    "sessionToken",
    "userToken",
    "loginToken",
];

/// 拼出 token 探测 JS：cookie 与 local/sessionStorage 里任何一个标记命中即为真
pub fn token_probe_js() -> String {
    let names = serde_json::to_string(TOKEN_MARKERS).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"
        (() => {{
            const names = {names};
            const cookies = document.cookie;
            for (const name of names) {{
                if (cookies.includes(name + '=')) return true;
                try {{
                    if (localStorage.getItem(name) || sessionStorage.getItem(name)) return true;
                }} catch (e) {{}}
            }}
            return false;
        }})()
        "#,
        names = names
    )
}

pub async fn confirm_token(
    page: &Arc<dyn PageHandle>,
    interval: Duration,
    max_attempts: usize,
) -> DriverResult<Verification> {
    debug!("🔍 开始 token 轮询 (最多 {} 次)", max_attempts);

    let outcome = poll_until(interval, max_attempts, || {
        let page = page.clone();
        async move {
            let value = page.evaluate(&token_probe_js()).await?;
            Ok(value.as_bool().unwrap_or(false))
        }
    })
    .await?;

    Ok(match outcome {
        PollOutcome::Satisfied { attempts } => {
            info!("✅ 第 {} 次轮询发现登录凭据", attempts);
            Verification::confirmed(100, format!("第 {} 次轮询发现登录凭据", attempts))
        }
        PollOutcome::TimedOut { attempts } => Verification::failed(format!(
            "轮询 {} 次未发现登录凭据",
            attempts
        )),
    })
}
