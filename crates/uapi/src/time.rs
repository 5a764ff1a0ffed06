//! 时间相关类型
//!
//! 对应 Linux 的 `struct timespec`，系统调用以此传递超时。

use core::ffi::c_long;

/// 纳秒级时间值
/// 对应 Linux 的 `struct timespec`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSpec {
    /// 秒
    pub tv_sec: c_long,
    /// 纳秒（0 <= tv_nsec < 1_000_000_000）
    pub tv_nsec: c_long,
}

/// 每秒的纳秒数
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

impl TimeSpec {
    /// 由秒和纳秒构造
    pub const fn new(tv_sec: c_long, tv_nsec: c_long) -> Self {
        TimeSpec { tv_sec, tv_nsec }
    }

    /// 字段是否构成一个合法的 timespec
    pub const fn is_valid(&self) -> bool {
        self.tv_sec >= 0 && self.tv_nsec >= 0 && (self.tv_nsec as u64) < NSEC_PER_SEC
    }

    /// 转换为纳秒总数（调用前需保证 `is_valid`）
    pub const fn as_nanos(&self) -> u64 {
        self.tv_sec as u64 * NSEC_PER_SEC + self.tv_nsec as u64
    }
}
