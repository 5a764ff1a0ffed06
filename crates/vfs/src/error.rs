//! VFS 错误类型
//!
//! 定义了与 POSIX 兼容的文件系统错误码，可通过 [`FsError::to_errno()`] 转换为系统调用错误码。

use uapi::errno;

/// VFS 错误类型
///
/// 各错误码对应标准 POSIX errno 值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// 无效的文件描述符 (-EBADF)
    BadFileDescriptor,
    /// 打开的文件过多 (-EMFILE)
    TooManyOpenFiles,
    /// 无效参数 (-EINVAL)
    InvalidArgument,
    /// 非阻塞操作将阻塞 (-EAGAIN)
    WouldBlock,
    /// 操作不支持 (-ENOTSUP)
    NotSupported,
}

impl FsError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            FsError::BadFileDescriptor => -9,
            FsError::WouldBlock => -errno::EAGAIN,
            FsError::InvalidArgument => -errno::EINVAL,
            FsError::TooManyOpenFiles => -errno::EMFILE,
            FsError::NotSupported => -95,
        }
    }
}
