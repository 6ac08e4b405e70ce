/// 执行模式
///
/// - `Parallel`: 所有站点同时启动
/// - `Sliding(n)`: 滑动窗口，始终保持 n 个站点在跑，完成一个立刻补位
/// - `Sequential`: 串行，站点之间留出固定间隔
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Parallel,
    Sliding(usize),
    Sequential,
}

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 站点列表 TOML 文件
    pub sites_file: String,
    /// 账户资料 TOML 文件
    pub profile_file: String,
    /// 注入脚本（页面桥接脚本）文件
    pub script_bundle_file: String,
    /// 执行模式: parallel / sequential
    pub execution_mode: String,
    /// 并发站点数量（0 = 全部同时跑）
    pub max_concurrent_sites: usize,
    /// 串行模式下站点之间的间隔（秒）
    pub sequential_settle_secs: u64,
    /// 是否在加银行卡之后领取优惠
    pub check_promo: bool,
    /// 领取优惠是否要求银行卡信息"已核实"（而不仅仅是提交成功）
    pub promo_requires_verified: bool,
    /// token 轮询次数（注册/登录确认）
    pub token_poll_attempts: usize,
    /// token 轮询间隔（秒）
    pub token_poll_interval_secs: u64,
    /// 脚本注入重试次数
    pub inject_retry_attempts: usize,
    /// 脚本注入重试间隔（秒）
    pub inject_retry_delay_secs: u64,
    /// 银行卡核验重试次数
    pub bank_verify_attempts: usize,
    /// 银行卡核验重试间隔（秒）
    pub bank_verify_delay_secs: u64,
    /// 注册完成到跳转加卡页之间的等待窗口（秒，下限）
    pub bank_settle_min_secs: u64,
    /// 注册完成到跳转加卡页之间的等待窗口（秒，上限）
    pub bank_settle_max_secs: u64,
    /// 页面操作之间的固定沉降等待（秒）
    pub page_settle_secs: u64,
    /// 普通导航超时（秒）
    pub navigation_timeout_secs: u64,
    /// 加卡页导航超时（秒，要覆盖等待窗口所以放得很长）
    pub bank_navigation_timeout_secs: u64,
    /// 页面桥接调用超时（秒）
    pub bridge_call_timeout_secs: u64,
    /// 主标签轮换间隔（秒）
    pub tab_rotation_interval_secs: u64,
    /// 优惠窗口轮换间隔（秒）
    pub promo_rotation_interval_secs: u64,
    /// 优惠结果轮询轮数
    pub promo_poll_rounds: usize,
    /// 优惠结果轮询间隔（秒）
    pub promo_poll_interval_secs: u64,
    /// 登录确认是否严格要求 token（false = 退回启发式判定的旧路径）
    pub login_strict_token: bool,
    /// 登录启发式判定的置信度阈值
    pub login_confidence_threshold: u32,
    /// 核对支行名称时要剥掉的前缀（城市惯用写法）
    pub branch_strip_prefixes: Vec<String>,
    /// 仪表盘地址（进度/账户上报，留空则只打日志）
    pub dashboard_endpoint: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            sites_file: "sites.toml".to_string(),
            profile_file: "profile.toml".to_string(),
            script_bundle_file: "scripts/bridge.js".to_string(),
            execution_mode: "parallel".to_string(),
            max_concurrent_sites: 0,
            sequential_settle_secs: 3,
            check_promo: true,
            promo_requires_verified: true,
            token_poll_attempts: 10,
            token_poll_interval_secs: 1,
            inject_retry_attempts: 3,
            inject_retry_delay_secs: 2,
            bank_verify_attempts: 3,
            bank_verify_delay_secs: 3,
            bank_settle_min_secs: 30,
            bank_settle_max_secs: 120,
            page_settle_secs: 2,
            navigation_timeout_secs: 30,
            bank_navigation_timeout_secs: 150,
            bridge_call_timeout_secs: 60,
            tab_rotation_interval_secs: 2,
            promo_rotation_interval_secs: 3,
            promo_poll_rounds: 10,
            promo_poll_interval_secs: 3,
            login_strict_token: true,
            login_confidence_threshold: 45,
            branch_strip_prefixes: vec!["THÀNH PHỐ".to_string(), "TP.".to_string()],
            dashboard_endpoint: "http://localhost:3000".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            browser_debug_port: std::env::var("BROWSER_DEBUG_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.browser_debug_port),
            sites_file: std::env::var("SITES_FILE").unwrap_or(default.sites_file),
            profile_file: std::env::var("PROFILE_FILE").unwrap_or(default.profile_file),
            script_bundle_file: std::env::var("SCRIPT_BUNDLE_FILE").unwrap_or(default.script_bundle_file),
            execution_mode: std::env::var("EXECUTION_MODE").unwrap_or(default.execution_mode),
            max_concurrent_sites: std::env::var("MAX_CONCURRENT_SITES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_sites),
            sequential_settle_secs: std::env::var("SEQUENTIAL_SETTLE_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.sequential_settle_secs),
            check_promo: std::env::var("CHECK_PROMO").ok().and_then(|v| v.parse().ok()).unwrap_or(default.check_promo),
            promo_requires_verified: std::env::var("PROMO_REQUIRES_VERIFIED").ok().and_then(|v| v.parse().ok()).unwrap_or(default.promo_requires_verified),
            token_poll_attempts: std::env::var("TOKEN_POLL_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.token_poll_attempts),
            token_poll_interval_secs: std::env::var("TOKEN_POLL_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.token_poll_interval_secs),
            inject_retry_attempts: std::env::var("INJECT_RETRY_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.inject_retry_attempts),
            inject_retry_delay_secs: std::env::var("INJECT_RETRY_DELAY_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.inject_retry_delay_secs),
            bank_verify_attempts: std::env::var("BANK_VERIFY_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.bank_verify_attempts),
            bank_verify_delay_secs: std::env::var("BANK_VERIFY_DELAY_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.bank_verify_delay_secs),
            bank_settle_min_secs: std::env::var("BANK_SETTLE_MIN_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.bank_settle_min_secs),
            bank_settle_max_secs: std::env::var("BANK_SETTLE_MAX_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.bank_settle_max_secs),
            page_settle_secs: std::env::var("PAGE_SETTLE_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.page_settle_secs),
            navigation_timeout_secs: std::env::var("NAVIGATION_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.navigation_timeout_secs),
            bank_navigation_timeout_secs: std::env::var("BANK_NAVIGATION_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.bank_navigation_timeout_secs),
            bridge_call_timeout_secs: std::env::var("BRIDGE_CALL_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.bridge_call_timeout_secs),
            tab_rotation_interval_secs: std::env::var("TAB_ROTATION_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.tab_rotation_interval_secs),
            promo_rotation_interval_secs: std::env::var("PROMO_ROTATION_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.promo_rotation_interval_secs),
            promo_poll_rounds: std::env::var("PROMO_POLL_ROUNDS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.promo_poll_rounds),
            promo_poll_interval_secs: std::env::var("PROMO_POLL_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.promo_poll_interval_secs),
            login_strict_token: std::env::var("LOGIN_STRICT_TOKEN").ok().and_then(|v| v.parse().ok()).unwrap_or(default.login_strict_token),
            login_confidence_threshold: std::env::var("LOGIN_CONFIDENCE_THRESHOLD").ok().and_then(|v| v.parse().ok()).unwrap_or(default.login_confidence_threshold),
            branch_strip_prefixes: default.branch_strip_prefixes,
            dashboard_endpoint: std::env::var("DASHBOARD_ENDPOINT").unwrap_or(default.dashboard_endpoint),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        }
    }

    /// 把 execution_mode + max_concurrent_sites 合成执行模式
    ///
    /// 语义沿用旧工具：parallel 且并发数为 0（或 >= 站点数）= 全并行，
    /// 否则为滑动窗口；sequential 忽略并发数。
    pub fn resolve_mode(&self, total_sites: usize) -> ExecutionMode {
        if self.execution_mode == "sequential" {
            ExecutionMode::Sequential
        } else if self.max_concurrent_sites == 0 || self.max_concurrent_sites >= total_sites {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sliding(self.max_concurrent_sites)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_mode_parallel_when_unbounded() {
        let config = Config::default();
        assert_eq!(config.resolve_mode(5), ExecutionMode::Parallel);
    }

    #[test]
    fn test_resolve_mode_sliding_when_bounded() {
        let config = Config {
            max_concurrent_sites: 2,
            ..Config::default()
        };
        assert_eq!(config.resolve_mode(5), ExecutionMode::Sliding(2));
        // 并发数不小于站点数时退化为全并行
        assert_eq!(config.resolve_mode(2), ExecutionMode::Parallel);
    }

    #[test]
    fn test_resolve_mode_sequential() {
        let config = Config {
            execution_mode: "sequential".to_string(),
            max_concurrent_sites: 2,
            ..Config::default()
        };
        assert_eq!(config.resolve_mode(5), ExecutionMode::Sequential);
    }
}
