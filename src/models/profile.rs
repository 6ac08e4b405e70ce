//! 账户资料
//!
//! 一个批次里所有站点共用同一份资料，只读。

use serde::{Deserialize, Serialize};

/// 账户资料
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileData {
    /// 登录账号
    pub username: String,
    /// 登录密码
    pub password: String,
    /// 提现密码
    pub withdraw_password: String,
    /// 真实姓名（开户人）
    pub fullname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// 银行名称
    #[serde(default)]
    pub bank_name: String,
    /// 开户支行
    #[serde(default)]
    pub bank_branch: String,
    /// 银行账号
    #[serde(default)]
    pub account_number: String,
    /// 外部验证服务的 API key（原样透传给页面桥接脚本，本程序不使用）
    #[serde(default)]
    pub api_key: String,
    /// 页面侧验证码处理的延迟（毫秒，透传）
    #[serde(default = "default_captcha_delay_ms")]
    pub captcha_delay_ms: u64,
}

fn default_captcha_delay_ms() -> u64 {
    10_000
}

impl ProfileData {
    /// 是否携带了完整的银行卡信息（缺了就跳过加卡步骤）
    pub fn has_bank_info(&self) -> bool {
        !self.bank_name.is_empty() && !self.account_number.is_empty()
    }
}
