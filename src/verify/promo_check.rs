//! 优惠结果判定
//!
//! 优惠页是个黑盒子流程（填账号 → 选优惠 → 过验证 → 提交），
//! 这里只看它落在页面上的最终痕迹：优惠码 / 成功文案 / 失败文案。

use regex::Regex;
use serde::Deserialize;

use crate::verify::Verification;

/// 页面侧读回的优惠页快照
///
/// 由注入脚本的 `__readPromoStatus()` 产出。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoSnapshot {
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub has_username_form: bool,
    #[serde(default)]
    pub username_filled: bool,
    #[serde(default)]
    pub has_captcha: bool,
}

/// 优惠页当前状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoStatus {
    /// 已出结果
    Completed {
        success: bool,
        message: String,
        promo_code: Option<String>,
    },
    /// 还需要触发一次动作（填账号 / 处理验证）
    NeedsAction { reason: String },
    /// 等待页面出结果
    Waiting,
}

/// 读取快照的 JS（注入脚本不在时返回 null）
pub fn promo_snapshot_js() -> &'static str {
    r#"
    (() => {
        if (typeof window.__readPromoStatus === 'function') {
            return window.__readPromoStatus();
        }
        return null;
    })()
    "#
}

/// 成功文案关键字
const SUCCESS_TEXTS: &[&str] = &["thành công", "Thành công", "Success"];

/// 失败文案关键字（含"已领过"）
const FAILURE_TEXTS: &[&str] = &["thất bại", "không hợp lệ", "Error", "đã nhận"];

/// 从正文里抠优惠码
fn extract_promo_code(body: &str) -> Option<String> {
    let re = Regex::new(r"(?i)(?:mã khuyến mãi|promo code)[:\s]*([A-Z0-9]{4,})").ok()?;
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// 快照判定（纯函数）
pub fn judge_promo_snapshot(snapshot: &PromoSnapshot) -> PromoStatus {
    let promo_code = extract_promo_code(&snapshot.body_text);
    let has_success = SUCCESS_TEXTS.iter().any(|t| snapshot.body_text.contains(t));
    let has_failure = FAILURE_TEXTS.iter().any(|t| snapshot.body_text.contains(t));

    if promo_code.is_some() || has_success {
        return PromoStatus::Completed {
            success: true,
            message: "已拿到优惠结果".to_string(),
            promo_code,
        };
    }

    if has_failure {
        return PromoStatus::Completed {
            success: false,
            message: "优惠领取失败或已领过".to_string(),
            promo_code: None,
        };
    }

    if snapshot.has_username_form && !snapshot.username_filled {
        return PromoStatus::NeedsAction {
            reason: "账号表单未填".to_string(),
        };
    }

    if snapshot.has_captcha {
        return PromoStatus::NeedsAction {
            reason: "页面出现验证环节".to_string(),
        };
    }

    PromoStatus::Waiting
}

/// 把最终状态折算成核实结论（轮询到上限时调用）
pub fn promo_status_to_verification(status: &PromoStatus) -> Verification {
    match status {
        PromoStatus::Completed {
            success: true,
            message,
            promo_code,
        } => {
            let details = match promo_code {
                Some(code) => format!("{} (优惠码: {})", message, code),
                None => message.clone(),
            };
            Verification::confirmed(90, details)
        }
        PromoStatus::Completed {
            success: false,
            message,
            ..
        } => Verification::failed(message.clone()),
        PromoStatus::NeedsAction { reason } => {
            Verification::failed(format!("轮询超时，仍停留在: {}", reason))
        }
        PromoStatus::Waiting => Verification::failed("轮询超时，优惠结果未出"),
    }
}
