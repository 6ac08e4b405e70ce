//! 核实引擎
//!
//! 页面动作的回包不可信（表单提交"成功"不代表账号真的建好了），
//! 每个步骤完成后都要由这里独立核实页面状态，给出三态结论：
//!
//! - `success=true, verified=true`: 有正向证据，确认成功
//! - `success=true, verified=false`: 动作自称成功但核实不了（弱结果）
//! - `success=false`: 有明确的失败信号，或超时也没等到正向证据
//!
//! 三种核实手段按可靠程度排序：token 检查 > 字段比对 > 启发式打分。
//! 启发式只做兜底，能用 token 的地方一律用 token。

pub mod field_match;
pub mod login_heuristic;
pub mod promo_check;
pub mod token_check;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::DriverResult;
use crate::infrastructure::PageHandle;

pub use field_match::{BankSnapshot, ExpectedBankFields};
pub use login_heuristic::LoginSignals;
pub use promo_check::{PromoSnapshot, PromoStatus};

/// 核实结论
#[derive(Debug, Clone)]
pub struct Verification {
    pub success: bool,
    pub verified: bool,
    /// 置信度 0-100
    pub confidence: u32,
    pub details: String,
}

impl Verification {
    pub fn confirmed(confidence: u32, details: impl Into<String>) -> Self {
        Self {
            success: true,
            verified: true,
            confidence,
            details: details.into(),
        }
    }

    pub fn unconfirmed(confidence: u32, details: impl Into<String>) -> Self {
        Self {
            success: true,
            verified: false,
            confidence,
            details: details.into(),
        }
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            success: false,
            verified: false,
            confidence: 0,
            details: details.into(),
        }
    }
}

/// 核实引擎
#[derive(Debug, Clone)]
pub struct VerificationEngine {
    pub token_poll_attempts: usize,
    pub token_poll_interval: Duration,
    pub bank_verify_attempts: usize,
    pub bank_verify_delay: Duration,
    pub branch_strip_prefixes: Vec<String>,
    pub login_confidence_threshold: u32,
}

impl VerificationEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            token_poll_attempts: config.token_poll_attempts,
            token_poll_interval: Duration::from_secs(config.token_poll_interval_secs),
            bank_verify_attempts: config.bank_verify_attempts,
            bank_verify_delay: Duration::from_secs(config.bank_verify_delay_secs),
            branch_strip_prefixes: config.branch_strip_prefixes.clone(),
            login_confidence_threshold: config.login_confidence_threshold,
        }
    }

    /// token 检查：轮询登录凭据（cookie / storage 标记）
    ///
    /// 只会因为正向发现而成功，超时永远是失败，不做"大概登上了"的假设。
    pub async fn confirm_token(&self, page: &Arc<dyn PageHandle>) -> DriverResult<Verification> {
        token_check::confirm_token(
            page,
            self.token_poll_interval,
            self.token_poll_attempts,
        )
        .await
    }

    /// 字段比对：读回页面展示的银行卡信息，和预期值逐项核对
    pub async fn confirm_bank_fields(
        &self,
        page: &Arc<dyn PageHandle>,
        expected: &ExpectedBankFields,
    ) -> DriverResult<Verification> {
        field_match::confirm_bank_fields(
            page,
            expected,
            &self.branch_strip_prefixes,
            self.bank_verify_attempts,
            self.bank_verify_delay,
        )
        .await
    }

    /// 启发式登录判定（兜底路径，不产出 verified）
    pub async fn confirm_login_heuristic(
        &self,
        page: &Arc<dyn PageHandle>,
    ) -> DriverResult<Verification> {
        login_heuristic::confirm_login_heuristic(page, self.login_confidence_threshold).await
    }
}
