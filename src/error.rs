use std::fmt;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 浏览器驱动相关错误
    Driver(DriverError),
    /// 共享资源池错误
    Pool(PoolError),
    /// 批次调度错误
    Schedule(ScheduleError),
    /// 文件操作错误
    File(FileError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Driver(e) => write!(f, "浏览器错误: {}", e),
            AppError::Pool(e) => write!(f, "资源池错误: {}", e),
            AppError::Schedule(e) => write!(f, "调度错误: {}", e),
            AppError::File(e) => write!(f, "文件错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Driver(e) => Some(e),
            AppError::Pool(e) => Some(e),
            AppError::Schedule(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 浏览器驱动错误
///
/// 重试策略依赖这里的变体区分：`TabClosed` 与 `ContextDestroyed`
/// 必须保持为独立变体，不能折叠进 `Protocol`。
#[derive(Debug, Error)]
pub enum DriverError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {reason}")]
    ConnectionFailed { port: u16, reason: String },

    /// 创建页面失败
    #[error("创建页面失败: {reason}")]
    PageCreationFailed { reason: String },

    /// 创建浏览器上下文/窗口失败
    #[error("创建浏览器上下文失败: {reason}")]
    ContextCreationFailed { reason: String },

    /// 导航超时
    #[error("导航到 {url} 超时 ({timeout_secs}s)")]
    NavigationTimeout { url: String, timeout_secs: u64 },

    /// 导航失败
    #[error("导航到 {url} 失败: {reason}")]
    NavigationFailed { url: String, reason: String },

    /// 脚本注入失败
    #[error("脚本注入失败: {reason}")]
    ScriptInjectionFailed { reason: String },

    /// 执行页面脚本失败
    #[error("执行页面脚本失败: {reason}")]
    EvalFailed { reason: String },

    /// 标签页已被关闭（用户手动关闭或页面崩溃）
    #[error("标签页已被关闭")]
    TabClosed,

    /// 页面执行上下文被销毁（通常是页面发生了跳转）
    #[error("页面执行上下文已销毁")]
    ContextDestroyed,

    /// 其他协议层错误
    #[error("浏览器协议错误: {0}")]
    Protocol(String),
}

impl DriverError {
    /// 从 chromiumoxide 错误转换，按错误文本还原出可分类的变体
    ///
    /// CDP 层把"标签页没了"和"执行上下文没了"都混在错误消息里，
    /// 这里是唯一一处做字符串匹配的地方。
    pub fn from_cdp(err: chromiumoxide::error::CdpError) -> Self {
        let text = err.to_string();
        if text.contains("Target closed")
            || text.contains("Session closed")
            || text.contains("No target with given id")
        {
            DriverError::TabClosed
        } else if text.contains("Execution context was destroyed")
            || text.contains("Cannot find context")
        {
            DriverError::ContextDestroyed
        } else {
            DriverError::Protocol(text)
        }
    }
}

/// 共享资源池错误
#[derive(Debug, Error)]
pub enum PoolError {
    /// 资源创建失败（对同一个 key 的所有等待者都会收到同一个失败）
    #[error("共享资源 {key} 创建失败: {reason}")]
    CreationFailed { key: String, reason: String },

    /// 资源在批次运行中途消失（不会静默重建，直接快速失败）
    #[error("共享资源 {key} 已丢失")]
    ResourceLost { key: String },
}

/// 批次调度错误
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// 相同站点集合的批次已在运行中
    #[error("重复批次: 指纹 {fingerprint} 对应的批次已在运行中")]
    DuplicateBatch { fingerprint: String },

    /// 批次内站点重复
    #[error("批次内站点重复: {url}")]
    DuplicateTarget { url: String },

    /// 批次为空
    #[error("批次站点列表为空")]
    EmptyBatch,
}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 文件不存在
    NotFound { path: String },
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    TomlParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::NotFound { path } => write!(f, "文件不存在: {}", path),
            FileError::ReadFailed { path, source } => {
                write!(f, "读取文件失败 ({}): {}", path, source)
            }
            FileError::TomlParseFailed { path, source } => {
                write!(f, "TOML解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. } | FileError::TomlParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值非法
    InvalidValue { field: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "配置项 {} 非法: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<DriverError> for AppError {
    fn from(err: DriverError) -> Self {
        AppError::Driver(err)
    }
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        AppError::Pool(err)
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        AppError::Schedule(err)
    }
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Driver(DriverError::from_cdp(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON解析失败: {}", err))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 驱动层结果类型
pub type DriverResult<T> = Result<T, DriverError>;
