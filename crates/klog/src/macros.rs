//! 面向用户的日志宏
//!
//! 与 Linux 内核的 `pr_*` 宏对应。级别过滤发生在格式化之前，
//! 被过滤的日志不会评估格式化参数。

/// 记录 Error 级别日志
#[macro_export]
macro_rules! pr_err {
    ($($arg:tt)*) => {
        $crate::log_impl($crate::LogLevel::Error, format_args!($($arg)*))
    };
}

/// 记录 Warning 级别日志
#[macro_export]
macro_rules! pr_warn {
    ($($arg:tt)*) => {
        $crate::log_impl($crate::LogLevel::Warning, format_args!($($arg)*))
    };
}

/// 记录 Notice 级别日志
#[macro_export]
macro_rules! pr_notice {
    ($($arg:tt)*) => {
        $crate::log_impl($crate::LogLevel::Notice, format_args!($($arg)*))
    };
}

/// 记录 Info 级别日志
#[macro_export]
macro_rules! pr_info {
    ($($arg:tt)*) => {
        $crate::log_impl($crate::LogLevel::Info, format_args!($($arg)*))
    };
}

/// 记录 Debug 级别日志
#[macro_export]
macro_rules! pr_debug {
    ($($arg:tt)*) => {
        if $crate::is_level_enabled($crate::LogLevel::Debug) {
            $crate::log_impl($crate::LogLevel::Debug, format_args!($($arg)*))
        }
    };
}
