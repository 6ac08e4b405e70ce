//! 账户信息落盘 - 业务能力层
//!
//! 一个批次里所有站点共用同一个账号，所以注册成功后只保存一次。
//! 用原子标记做一次性闩锁；保存失败会把闩锁放开，允许下一个成功的站点再试。

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use tracing::{info, warn};

use crate::models::ProfileData;

/// 账户保存器
pub struct AccountSaver {
    client: reqwest::Client,
    endpoint: String,
    saved: AtomicBool,
}

impl AccountSaver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            saved: AtomicBool::new(false),
        }
    }

    /// 保存共享账户信息（批次内只执行一次）
    ///
    /// 并发的流程同时调用时只有第一个真正发请求。
    pub async fn save_once(&self, profile: &ProfileData, first_site: &str, all_sites: &[String]) {
        if self
            .saved
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("💾 账户信息已保存过，跳过 ({})", first_site);
            return;
        }

        if self.endpoint.is_empty() {
            // 没配仪表盘就只留日志
            info!("💾 账户信息 (仅日志): {} @ {}", profile.username, first_site);
            return;
        }

        info!("💾 保存共享账户信息 (首个成功站点: {})...", first_site);

        let body = json!({
            "username": profile.username,
            "password": profile.password,
            "withdrawPassword": profile.withdraw_password,
            "fullname": profile.fullname,
            "email": profile.email,
            "phone": profile.phone,
            "bank": {
                "name": profile.bank_name,
                "branch": profile.bank_branch,
                "accountNumber": profile.account_number,
                "accountHolder": profile.fullname,
            },
            "registeredAt": chrono::Local::now().to_rfc3339(),
            "firstSite": first_site,
            "sites": all_sites,
            "status": "active",
        });

        let url = format!("{}/api/accounts/{}", self.endpoint, profile.username);
        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                info!("✅ 账户信息已保存");
            }
            Ok(response) => {
                warn!("⚠️ 账户保存失败: HTTP {}", response.status());
                // 放开闩锁，让后面的站点有机会再试
                self.saved.store(false, Ordering::SeqCst);
            }
            Err(e) => {
                warn!("⚠️ 账户保存失败: {}", e);
                self.saved.store(false, Ordering::SeqCst);
            }
        }
    }

    pub fn is_saved(&self) -> bool {
        self.saved.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ProfileData {
        toml::from_str(
            r#"
            username = "user01"
            password = "pass"
            withdraw_password = "wpass"
            fullname = "NGUYEN VAN A"
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_once_latches_even_on_unreachable_endpoint() {
        // 端点不可达：闩锁会被放开，允许重试
        let saver = AccountSaver::new("http://127.0.0.1:1");
        saver.save_once(&profile(), "a", &["a".to_string()]).await;
        assert!(!saver.is_saved());
    }
}
