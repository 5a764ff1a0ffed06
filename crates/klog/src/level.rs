//! 日志级别定义
//!
//! 级别数值与 Linux 内核的 `KERN_*` 保持一致：数值越小越紧急。

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// 系统不可用
    Emergency = 0,
    /// 必须立即处理
    Alert = 1,
    /// 严重错误
    Critical = 2,
    /// 错误
    Error = 3,
    /// 警告
    Warning = 4,
    /// 正常但值得注意
    Notice = 5,
    /// 一般信息
    Info = 6,
    /// 调试信息
    Debug = 7,
}

impl LogLevel {
    /// 由原始数值构造（越界一律按 Debug 处理）
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Emergency,
            1 => LogLevel::Alert,
            2 => LogLevel::Critical,
            3 => LogLevel::Error,
            4 => LogLevel::Warning,
            5 => LogLevel::Notice,
            6 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    /// 级别的短名称（对齐 syslog 习惯）
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Emergency => "EMERG",
            LogLevel::Alert => "ALERT",
            LogLevel::Critical => "CRIT",
            LogLevel::Error => "ERR",
            LogLevel::Warning => "WARN",
            LogLevel::Notice => "NOTICE",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    /// 控制台输出使用的 ANSI 颜色码
    pub const fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical | LogLevel::Error => {
                "\x1b[31m"
            }
            LogLevel::Warning => "\x1b[33m",
            LogLevel::Notice | LogLevel::Info => "\x1b[37m",
            LogLevel::Debug => "\x1b[90m",
        }
    }

    /// ANSI 颜色复位码
    pub const fn reset_color_code(&self) -> &'static str {
        "\x1b[0m"
    }
}
