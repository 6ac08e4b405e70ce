//! 站点定义
//!
//! 一个站点 = 一组固定的流程入口 URL。批次开始后不再变动。

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, AppResult, ConfigError};

/// 站点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// 站点名（批次内唯一，日志和结果都用它标识）
    pub name: String,
    /// 注册页 URL
    pub register_url: String,
    /// 登录页 URL（缺省时由注册页推导）
    #[serde(default)]
    pub login_url: Option<String>,
    /// 加银行卡页 URL（缺省时由注册页 origin 推导）
    #[serde(default)]
    pub withdraw_url: Option<String>,
    /// 领取优惠页 URL（缺省 = 该站点不跑优惠步骤）
    #[serde(default)]
    pub promo_url: Option<String>,
}

impl Site {
    /// 登录页 URL：显式配置优先，否则把注册路径换成登录路径
    pub fn login_url(&self) -> String {
        match &self.login_url {
            Some(url) => url.clone(),
            None => self.register_url.replace("/Register", "/Login"),
        }
    }

    /// 加银行卡页 URL：显式配置优先，否则用注册页的 origin 拼出提现页
    pub fn withdraw_url(&self) -> AppResult<String> {
        if let Some(url) = &self.withdraw_url {
            return Ok(url.clone());
        }
        let parsed = Url::parse(&self.register_url).map_err(|e| {
            AppError::Config(ConfigError::InvalidValue {
                field: format!("sites.{}.register_url", self.name),
                reason: e.to_string(),
            })
        })?;
        Ok(format!("{}/Financial?type=withdraw", parsed.origin().ascii_serialization()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(register_url: &str) -> Site {
        Site {
            name: "demo".to_string(),
            register_url: register_url.to_string(),
            login_url: None,
            withdraw_url: None,
            promo_url: None,
        }
    }

    #[test]
    fn test_login_url_derived_from_register() {
        let s = site("https://example.com/Account/Register");
        assert_eq!(s.login_url(), "https://example.com/Account/Login");
    }

    #[test]
    fn test_withdraw_url_derived_from_origin() {
        let s = site("https://example.com/Account/Register");
        assert_eq!(
            s.withdraw_url().unwrap(),
            "https://example.com/Financial?type=withdraw"
        );
    }

    #[test]
    fn test_explicit_urls_win() {
        let mut s = site("https://example.com/Account/Register");
        s.login_url = Some("https://example.com/signin".to_string());
        s.withdraw_url = Some("https://example.com/wd".to_string());
        assert_eq!(s.login_url(), "https://example.com/signin");
        assert_eq!(s.withdraw_url().unwrap(), "https://example.com/wd");
    }

    #[test]
    fn test_withdraw_url_rejects_bad_register_url() {
        let s = site("not a url");
        assert!(s.withdraw_url().is_err());
    }
}
