// Unit tests for klog, run with standard host `cargo test`.

extern crate alloc;

use crate::LogLevel;
use crate::log_core::LogCore;

/// Test-only logging helper (mirrors production macro behavior, but targets a local `LogCore`).
macro_rules! test_log {
    ($logger:expr, $level:expr, $($arg:tt)*) => {
        $logger._log($level, format_args!($($arg)*))
    };
}
