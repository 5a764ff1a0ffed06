//! 系统调用错误码
//!
//! 与 Linux UAPI `errno-base.h`/`errno.h` 保持一致的常量子集。
//! 系统调用返回负的错误码（`-EINVAL` 等），0 或正值表示成功。

/// 操作不被允许 (Operation not permitted)
pub const EPERM: isize = 1;
/// 被中断的系统调用 (Interrupted system call)
pub const EINTR: isize = 4;
/// 重试 / 资源暂时不可用 (Try again)
pub const EAGAIN: isize = 11;
/// 内存不足 (Out of memory)
pub const ENOMEM: isize = 12;
/// 错误的地址 (Bad address)
pub const EFAULT: isize = 14;
/// 无效参数 (Invalid argument)
pub const EINVAL: isize = 22;
/// 打开的文件过多 (Too many open files)
pub const EMFILE: isize = 24;
/// 设备上没有剩余空间 (No space left on device)
pub const ENOSPC: isize = 28;
/// 连接超时 (Connection timed out)
pub const ETIMEDOUT: isize = 110;

/// 与 `EAGAIN` 同值（POSIX 允许两者相等）
pub const EWOULDBLOCK: isize = EAGAIN;
