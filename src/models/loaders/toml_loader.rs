use crate::models::{ProfileData, Site};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// sites.toml 的顶层结构
///
/// ```toml
/// [[sites]]
/// name = "demo"
/// register_url = "https://example.com/Account/Register"
/// promo_url = "https://example.com/Promo/Deposit"
/// ```
#[derive(Debug, Deserialize)]
struct SitesFile {
    #[serde(default)]
    sites: Vec<Site>,
}

/// 从 TOML 文件加载站点列表
pub async fn load_sites(path: impl AsRef<Path>) -> Result<Vec<Site>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取站点文件: {}", path.display()))?;

    let parsed: SitesFile = toml::from_str(&content)
        .with_context(|| format!("无法解析站点文件: {}", path.display()))?;

    for site in &parsed.sites {
        if site.name.is_empty() {
            anyhow::bail!("站点名不能为空 (文件: {})", path.display());
        }
        if site.register_url.is_empty() {
            anyhow::bail!("站点 {} 缺少 register_url", site.name);
        }
    }

    tracing::info!("成功加载 {} 个站点", parsed.sites.len());
    Ok(parsed.sites)
}

/// 从 TOML 文件加载账户资料
pub async fn load_profile(path: impl AsRef<Path>) -> Result<ProfileData> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取账户资料文件: {}", path.display()))?;

    let profile: ProfileData = toml::from_str(&content)
        .with_context(|| format!("无法解析账户资料文件: {}", path.display()))?;

    if profile.username.is_empty() {
        anyhow::bail!("账户资料缺少 username (文件: {})", path.display());
    }

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sites_file_parses() {
        let parsed: SitesFile = toml::from_str(
            r#"
            [[sites]]
            name = "a"
            register_url = "https://a.example/Account/Register"

            [[sites]]
            name = "b"
            register_url = "https://b.example/Account/Register"
            promo_url = "https://b.example/Promo/Deposit"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.sites.len(), 2);
        assert!(parsed.sites[0].promo_url.is_none());
        assert!(parsed.sites[1].promo_url.is_some());
    }

    #[test]
    fn test_empty_sites_file() {
        let parsed: SitesFile = toml::from_str("").unwrap();
        assert!(parsed.sites.is_empty());
    }
}
