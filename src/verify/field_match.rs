//! 银行卡字段比对
//!
//! 加卡提交后的核实分五档，按优先级判定：
//!
//! 1. 展示的开户人 + 支行和预期完全吻合 → 确认成功（唯一给 verified 的正路）
//! 2. 出现成功提示 toast → 确认成功
//! 3. 出现内容为失败的弹窗 → 确认失败
//! 4. 有银行卡展示但字段对不上 → 弱成功（可能是旧卡或填错）
//! 5. 表单消失但以上都没出现 → 弱成功（"大概成了，证明不了"）
//!
//! 页面可能还在重渲染，所以带重试；重试窗口内页面跳转（上下文销毁）
//! 按弱成功处理，跳转本身往往就是提交成功的表现。

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{DriverError, DriverResult};
use crate::infrastructure::PageHandle;
use crate::retry::{classify, ErrorClass};
use crate::verify::Verification;

/// 预期的银行卡展示值
#[derive(Debug, Clone)]
pub struct ExpectedBankFields {
    pub fullname: String,
    pub branch: String,
    pub account_number: String,
}

/// 页面侧读回的银行卡展示快照
///
/// 由注入脚本的 `__readBankDetail()` 产出；字段怎么从 DOM 里抠出来是
/// 注入脚本的事，这里只认快照。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankSnapshot {
    #[serde(default)]
    pub has_error_modal: bool,
    #[serde(default)]
    pub modal_text: String,
    #[serde(default)]
    pub form_still_visible: bool,
    #[serde(default)]
    pub has_bank_display: bool,
    #[serde(default)]
    pub has_success_toast: bool,
    #[serde(default)]
    pub displayed_fullname: String,
    #[serde(default)]
    pub displayed_branch: String,
    #[serde(default)]
    pub displayed_account_number: String,
}

/// 弹窗文本里表示失败的关键字
const ERROR_TEXTS: &[&str] = &[
    "thất bại",
    "Lỗi",
    "Error",
    "không hợp lệ",
    "không thành công",
    "failed",
];

/// 读取快照的 JS（注入脚本不在时返回 null）
pub fn bank_snapshot_js() -> &'static str {
    r#"
    (() => {
        if (typeof window.__readBankDetail === 'function') {
            return window.__readBankDetail();
        }
        return null;
    })()
    "#
}

/// 归一化展示值：大写、剥掉城市惯用前缀、压缩空白
pub fn normalize_display(value: &str, strip_prefixes: &[String]) -> String {
    let mut text = value.to_uppercase();
    for prefix in strip_prefixes {
        text = text.replace(&prefix.to_uppercase(), "");
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// 姓名/支行的比对：归一化后相等或互相包含
fn loose_match(expected: &str, observed: &str, strip_prefixes: &[String]) -> bool {
    let expected = normalize_display(expected, strip_prefixes);
    let observed = normalize_display(observed, strip_prefixes);
    if expected.is_empty() || observed.is_empty() {
        return false;
    }
    expected == observed || expected.contains(&observed) || observed.contains(&expected)
}

/// 账号比对：页面会把中间打码，只核对末四位；预期为空则跳过
fn account_match(expected: &str, observed: &str) -> bool {
    if expected.len() < 4 {
        return true;
    }
    let last4 = &expected[expected.len() - 4..];
    observed.contains(last4)
}

/// 快照判定（纯函数，方便单测）
pub fn judge_snapshot(
    snapshot: &BankSnapshot,
    expected: &ExpectedBankFields,
    strip_prefixes: &[String],
) -> Verification {
    let fullname_match = loose_match(&expected.fullname, &snapshot.displayed_fullname, strip_prefixes);
    let branch_match = loose_match(&expected.branch, &snapshot.displayed_branch, strip_prefixes);
    let account_ok = account_match(&expected.account_number, &snapshot.displayed_account_number);

    let is_error_content = ERROR_TEXTS
        .iter()
        .any(|t| snapshot.modal_text.contains(t));

    // 档位 1: 字段完全匹配
    if snapshot.has_bank_display && fullname_match && branch_match {
        let mut verification = Verification::confirmed(
            100,
            format!(
                "字段完全匹配 (姓名: {}, 支行: {})",
                snapshot.displayed_fullname, snapshot.displayed_branch
            ),
        );
        if !account_ok {
            // 末四位对不上只降置信度，姓名+支行仍是决定性的
            verification.confidence = 80;
        }
        return verification;
    }

    // 档位 2: 成功提示
    if snapshot.has_success_toast {
        return Verification::confirmed(90, "页面出现成功提示");
    }

    // 档位 3: 失败弹窗
    if snapshot.has_error_modal && is_error_content {
        let mut text = snapshot.modal_text.clone();
        text.truncate(200);
        return Verification::failed(format!("页面弹出失败提示: {}", text));
    }

    // 档位 4: 有展示但对不上
    if snapshot.has_bank_display {
        return Verification::unconfirmed(
            50,
            format!(
                "有银行卡展示但字段不匹配 (页面显示: {}/{})",
                snapshot.displayed_fullname, snapshot.displayed_branch
            ),
        );
    }

    // 档位 5: 表单消失
    if !snapshot.form_still_visible {
        return Verification::unconfirmed(40, "表单已消失，可能成功但无法核实");
    }

    // 表单还在、又没有任何信号：当失败处理，留给上游决定要不要重试
    Verification::failed("表单仍在显示，未见任何提交结果")
}

pub async fn confirm_bank_fields(
    page: &Arc<dyn PageHandle>,
    expected: &ExpectedBankFields,
    strip_prefixes: &[String],
    max_attempts: usize,
    delay: Duration,
) -> DriverResult<Verification> {
    let mut last = Verification::failed("未执行核实");

    for attempt in 1..=max_attempts {
        debug!("🔍 银行卡核实 ({}/{})...", attempt, max_attempts);

        let snapshot = match read_snapshot(page).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                // 注入脚本不在（页面可能刚跳转完），按"读不到快照"继续重试
                warn!("⚠️ 页面快照不可用 ({}/{})", attempt, max_attempts);
                last = Verification::failed("无法读取页面快照");
                if attempt < max_attempts {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }
            Err(e) => match classify(&e) {
                ErrorClass::ContextDestroyed => {
                    // 核实途中页面跳转，多半是提交成功后的重定向
                    info!("✅ 核实途中页面发生跳转，按弱成功处理");
                    return Ok(Verification::unconfirmed(
                        40,
                        "核实途中页面跳转，可能成功但无法核实",
                    ));
                }
                ErrorClass::TabClosed => return Err(e),
                _ => {
                    warn!("⚠️ 读取快照失败 ({}/{}): {}", attempt, max_attempts, e);
                    if attempt < max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                    continue;
                }
            },
        };

        last = judge_snapshot(&snapshot, expected, strip_prefixes);

        // 有决定性结论就不再等了
        if last.verified || (!last.success && snapshot.has_error_modal) {
            return Ok(last);
        }

        // 表单还在可能是页面没渲染完，隔一会儿再看
        if snapshot.form_still_visible && attempt < max_attempts {
            debug!("⏳ 表单仍在，{}s 后重试", delay.as_secs());
            tokio::time::sleep(delay).await;
            continue;
        }

        return Ok(last);
    }

    Ok(last)
}

async fn read_snapshot(page: &Arc<dyn PageHandle>) -> DriverResult<Option<BankSnapshot>> {
    let value = page.evaluate(bank_snapshot_js()).await?;
    if value.is_null() {
        return Ok(None);
    }
    let snapshot = serde_json::from_value(value).map_err(|e| DriverError::EvalFailed {
        reason: format!("银行卡快照解析失败: {}", e),
    })?;
    Ok(Some(snapshot))
}
