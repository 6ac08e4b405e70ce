use anyhow::Result;
/// 日志工具模块
///
/// 提供日志初始化和批次级的格式化输出
use std::fs;
use tracing::info;

use crate::config::{Config, ExecutionMode};
use crate::models::{SequenceRun, SequenceStatus};

/// 初始化 tracing 日志
pub fn init() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 初始化输出日志文件
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n批次执行日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多站点流程模式");
    info!("📊 执行模式: {} (并发数 {})", config.execution_mode, config.max_concurrent_sites);
    info!("🎁 优惠检查: {}", if config.check_promo { "开" } else { "关" });
    info!("{}", "=".repeat(60));
}

/// 记录站点加载信息
pub fn log_sites_loaded(total: usize, mode: ExecutionMode) {
    info!("✓ 找到 {} 个待处理的站点", total);
    match mode {
        ExecutionMode::Parallel => info!("💡 全部站点同时启动\n"),
        ExecutionMode::Sliding(n) => {
            info!("📋 滑动窗口: 始终保持 {} 个在跑", n);
            info!("💡 完成一个立刻补位，不等整批\n");
        }
        ExecutionMode::Sequential => info!("📋 逐个串行处理\n"),
    }
}

/// 打印最终统计信息
pub fn print_final_stats(results: &[SequenceRun], config: &Config) {
    let count = |status: SequenceStatus| results.iter().filter(|r| r.status == status).count();

    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", count(SequenceStatus::Succeeded), results.len());
    info!("⚠️ 部分成功: {}", count(SequenceStatus::PartiallyFailed));
    info!("❌ 失败: {}", count(SequenceStatus::Failed));
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", config.output_log_file);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("一二三四五六", 3), "一二三...");
    }
}
