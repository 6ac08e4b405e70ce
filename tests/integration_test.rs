use std::sync::Arc;

use auto_register_sequence::browser::{connect_to_browser, CdpHost};
use auto_register_sequence::services::LogProgressSink;
use auto_register_sequence::utils::logging;
use auto_register_sequence::{App, Config, ExecutionMode, ProfileData, Site};

#[tokio::test]
#[ignore] // 默认忽略，需要真实浏览器：cargo test -- --ignored
async fn test_browser_connection() {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 测试浏览器连接
    let result = connect_to_browser(config.browser_debug_port).await;

    assert!(result.is_ok(), "应该能够成功连接浏览器");
}

#[tokio::test]
#[ignore]
async fn test_single_site_sequence() {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 连接浏览器
    let browser = connect_to_browser(config.browser_debug_port)
        .await
        .expect("连接浏览器失败");

    let script_bundle = tokio::fs::read_to_string(&config.script_bundle_file)
        .await
        .expect("读取桥接脚本失败");

    let app = App::with_host(
        config.clone(),
        Arc::new(CdpHost::new(browser)),
        Arc::new(LogProgressSink),
        script_bundle,
    );

    // 注意：请根据实际情况修改站点与资料
    let site = Site {
        name: "demo".to_string(),
        register_url: "https://demo.example/Account/Register".to_string(),
        login_url: None,
        withdraw_url: None,
        promo_url: None,
    };
    let profile: ProfileData = toml::from_str(
        r#"
        username = "user01"
        password = "pass-123456"
        withdraw_password = "wpass-123456"
        fullname = "NGUYEN VAN A"
        "#,
    )
    .expect("解析账户资料失败");

    let results = app
        .run_batch(vec![site], Arc::new(profile), ExecutionMode::Sequential)
        .await
        .expect("批次执行失败");

    assert_eq!(results.len(), 1);
    println!("流程结果: {:?}", results[0].status);
}

#[tokio::test]
#[ignore]
async fn test_load_input_files() {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 测试加载站点与账户资料文件
    let sites = auto_register_sequence::models::load_sites(&config.sites_file).await;
    assert!(sites.is_ok(), "应该能够加载站点文件");
    println!("找到 {} 个站点", sites.unwrap().len());

    let profile = auto_register_sequence::models::load_profile(&config.profile_file).await;
    assert!(profile.is_ok(), "应该能够加载账户资料文件");
}
