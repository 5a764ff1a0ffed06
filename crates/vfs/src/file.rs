//! 文件抽象层 - 会话层接口
//!
//! 该模块定义了统一的文件操作接口 [`File`] trait。
//! 所有打开的文件以 `Arc<dyn File>` 形式存储在进程的文件描述符表中。

use crate::FsError;
use uapi::poll::PollEvents;

/// 文件操作的统一接口
///
/// 所有打开的文件以 `Arc<dyn File>` 形式存储在进程的文件描述符表中。
pub trait File: Send + Sync {
    /// 检查文件是否可读
    fn readable(&self) -> bool;

    /// 检查文件是否可写
    fn writable(&self) -> bool;

    /// 从文件读取数据
    fn read(&self, buf: &mut [u8]) -> Result<usize, FsError>;

    /// 向文件写入数据
    fn write(&self, buf: &[u8]) -> Result<usize, FsError>;

    /// 查询当前就绪状态（可选方法，用于 poll/select）
    fn poll(&self) -> PollEvents {
        PollEvents::empty()
    }

    /// 获取异步 I/O 所有者（可选方法，用于 F_GETOWN）
    fn get_owner(&self) -> Result<i32, FsError> {
        Err(FsError::NotSupported)
    }

    /// 设置异步 I/O 所有者（可选方法，用于 F_SETOWN）
    fn set_owner(&self, _pid: i32) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// 获取 Any trait 引用，用于安全的类型转换
    fn as_any(&self) -> &dyn core::any::Any;
}

impl core::fmt::Debug for dyn File {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("File")
            .field("readable", &self.readable())
            .field("writable", &self.writable())
            .finish_non_exhaustive()
    }
}
