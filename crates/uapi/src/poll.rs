//! poll/select 事件位
//!
//! 与 Linux UAPI `poll.h` 一致的事件掩码定义。

use bitflags::bitflags;

bitflags! {
    /// poll 事件掩码
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollEvents: u16 {
        /// 有数据可读
        const POLLIN = 0x0001;
        /// 紧急数据可读
        const POLLPRI = 0x0002;
        /// 可写
        const POLLOUT = 0x0004;
        /// 发生错误
        const POLLERR = 0x0008;
        /// 对端挂起
        const POLLHUP = 0x0010;
        /// 无效的 fd
        const POLLNVAL = 0x0020;
    }
}
