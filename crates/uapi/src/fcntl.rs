//! 文件控制标志
//!
//! `fcntl` 相关的标志位，内核与用户空间共用。

use bitflags::bitflags;

bitflags! {
    /// 文件描述符标志（随 fd 而非文件对象，`F_GETFD`/`F_SETFD`）
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FdFlags: u32 {
        /// exec 时自动关闭
        const CLOEXEC = 0x1;
    }
}
