//! 文件抽象层
//!
//! 提供打开文件的统一接口 [`File`]、进程级文件描述符表 [`FDTable`]
//! 以及文件系统错误码 [`FsError`]。
//!
//! 本层是会话层抽象：文件对象是"有状态"的（poll 就绪状态、异步通知
//! 所有者等），以 `Arc<dyn File>` 形式存储在进程的文件描述符表中。
//! 具体文件类型（futex fd、管道等）由各子系统实现 [`File`] 提供。

#![no_std]

extern crate alloc;

mod error;
mod fd_table;
mod file;

pub use error::FsError;
pub use fd_table::FDTable;
pub use file::File;
