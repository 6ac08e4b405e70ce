//! 启发式登录判定
//!
//! 旧的非注册登录路径没有可靠的 token 可查，只能把一堆弱信号加权求和，
//! 过阈值就认为已登录。天生比 token 检查糊，所以只做兜底：
//! 结论永远不带 verified。

use std::sync::Arc;

use phf::phf_map;
use serde::Deserialize;
use tracing::debug;

use crate::error::{DriverError, DriverResult};
use crate::infrastructure::PageHandle;
use crate::verify::token_check::TOKEN_MARKERS;
use crate::verify::Verification;

/// 信号权重表
///
/// 数值沿用旧工具长期跑出来的经验值，动之前先想清楚。
static SIGNAL_WEIGHTS: phf::Map<&'static str, u32> = phf_map! {
    "auth_tokens" => 50,
    "logout_control" => 30,
    "no_login_form" => 25,
    "logged_in_url" => 20,
    "user_info" => 15,
    "success_marker" => 40,
    "logout_text" => 20,
    "balance_text" => 15,
    "off_auth_page" => 15,
};

/// 页面侧采集到的登录信号
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSignals {
    #[serde(default)]
    pub has_auth_tokens: bool,
    #[serde(default)]
    pub has_logout_control: bool,
    #[serde(default)]
    pub has_login_form: bool,
    #[serde(default)]
    pub logged_in_url: bool,
    #[serde(default)]
    pub has_user_info: bool,
    #[serde(default)]
    pub has_success_marker: bool,
    #[serde(default)]
    pub body_has_logout_text: bool,
    #[serde(default)]
    pub body_has_balance_text: bool,
    #[serde(default)]
    pub off_auth_page: bool,
}

impl LoginSignals {
    /// 加权求和
    pub fn score(&self) -> u32 {
        let mut total = 0;
        let mut add = |key: &str, hit: bool| {
            if hit {
                total += SIGNAL_WEIGHTS.get(key).copied().unwrap_or(0);
            }
        };
        add("auth_tokens", self.has_auth_tokens);
        add("logout_control", self.has_logout_control);
        add("no_login_form", !self.has_login_form);
        add("logged_in_url", self.logged_in_url);
        add("user_info", self.has_user_info);
        add("success_marker", self.has_success_marker);
        add("logout_text", self.body_has_logout_text);
        add("balance_text", self.body_has_balance_text);
        add("off_auth_page", self.off_auth_page);
        total
    }

    /// 命中的信号名列表（写进结论详情）
    pub fn hits(&self) -> Vec<&'static str> {
        let mut hits = Vec::new();
        if self.has_auth_tokens {
            hits.push("auth_tokens");
        }
        if self.has_logout_control {
            hits.push("logout_control");
        }
        if !self.has_login_form {
            hits.push("no_login_form");
        }
        if self.logged_in_url {
            hits.push("logged_in_url");
        }
        if self.has_user_info {
            hits.push("user_info");
        }
        if self.has_success_marker {
            hits.push("success_marker");
        }
        if self.body_has_logout_text {
            hits.push("logout_text");
        }
        if self.body_has_balance_text {
            hits.push("balance_text");
        }
        if self.off_auth_page {
            hits.push("off_auth_page");
        }
        hits
    }
}

/// 信号采集 JS
pub fn signals_probe_js() -> String {
    let markers = serde_json::to_string(TOKEN_MARKERS).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"
        (() => {{
            const markers = {markers};
            const cookies = document.cookie;
            let hasAuthTokens = false;
            for (const name of markers) {{
                if (cookies.includes(name + '=')) {{ hasAuthTokens = true; break; }}
                try {{
                    if (localStorage.getItem(name) || sessionStorage.getItem(name)) {{
                        hasAuthTokens = true;
                        break;
                    }}
                }} catch (e) {{}}
            }}

            const url = window.location.href.toLowerCase();
            const onAuthPage = url.includes('/login') || url.includes('/signin') || url.includes('/register');
            const body = document.body ? document.body.textContent.toLowerCase() : '';

            return {{
                hasAuthTokens: hasAuthTokens,
                hasLogoutControl: !!(
                    document.querySelector('a[href*="logout"]') ||
                    document.querySelector('button[onclick*="logout"]') ||
                    document.querySelector('.logout')
                ),
                hasLoginForm: !!document.querySelector('input[type="password"]'),
                loggedInUrl: (
                    url.includes('/dashboard') || url.includes('/home') ||
                    url.includes('/main') || url.includes('/account')
                ) && !onAuthPage,
                hasUserInfo: !!(
                    document.querySelector('.user-info') ||
                    document.querySelector('.username') ||
                    document.querySelector('.balance')
                ),
                hasSuccessMarker: !!window.__loginSuccessMarker,
                bodyHasLogoutText: body.includes('logout') || body.includes('đăng xuất'),
                bodyHasBalanceText: body.includes('balance') || body.includes('số dư'),
                offAuthPage: !onAuthPage
            }};
        }})()
        "#,
        markers = markers
    )
}

pub async fn confirm_login_heuristic(
    page: &Arc<dyn PageHandle>,
    threshold: u32,
) -> DriverResult<Verification> {
    let value = page.evaluate(&signals_probe_js()).await?;
    let signals: LoginSignals =
        serde_json::from_value(value).map_err(|e| DriverError::EvalFailed {
            reason: format!("登录信号解析失败: {}", e),
        })?;

    let score = signals.score();
    let hits = signals.hits();
    debug!("📊 登录启发式得分 {} (阈值 {}), 信号: {:?}", score, threshold, hits);

    let confidence = score.min(100);
    let details = format!("启发式得分 {} (阈值 {}), 信号: {}", score, threshold, hits.join(", "));

    Ok(if score >= threshold {
        // 启发式结论永远不是 verified
        Verification::unconfirmed(confidence, details)
    } else {
        Verification::failed(details)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_weights_sum() {
        let signals = LoginSignals {
            has_auth_tokens: true,
            has_logout_control: true,
            has_login_form: true, // no_login_form 不加分
            ..Default::default()
        };
        // 50 + 30
        assert_eq!(signals.score(), 80);
    }

    #[test]
    fn test_empty_page_still_scores_no_login_form() {
        // 什么都没有的页面：没有密码框也算一个弱信号
        let signals = LoginSignals::default();
        assert_eq!(signals.score(), 25);
    }

    #[test]
    fn test_threshold_decision() {
        let strong = LoginSignals {
            has_auth_tokens: true,
            ..Default::default()
        };
        // 50 + 25 (no_login_form) = 75 >= 45
        assert!(strong.score() >= 45);

        let weak = LoginSignals {
            has_login_form: true,
            body_has_balance_text: true,
            ..Default::default()
        };
        // 15 < 45
        assert!(weak.score() < 45);
    }

    #[test]
    fn test_probe_js_shape() {
        let js = signals_probe_js();
        assert!(js.contains("hasAuthTokens"));
        assert!(js.contains("hasLoginForm"));
        assert!(js.contains("loggedInUrl"));
    }
}
