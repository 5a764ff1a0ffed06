//! 文件描述符表
//!
//! 该模块实现了进程级的文件描述符管理。
//!
//! 约定与语义（与用户态常见预期保持一致）：
//!
//! - `alloc()` 分配"最小可用 fd"
//! - `FD_CLOEXEC` 用于控制 exec 时是否关闭 fd（由 `FdFlags` 表示）
//! - 进程退出时通过 `take_all()` 一次性取走全部文件对象，由调用方
//!   丢弃引用完成各文件类型自己的清理

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use sync::SpinLock;
use uapi::fcntl::FdFlags;

use crate::{File, FsError};

/// 默认的单进程文件描述符上限
const DEFAULT_MAX_FDS: usize = 1024;

/// 文件描述符表
pub struct FDTable {
    /// 文件描述符数组
    files: SpinLock<Vec<Option<Arc<dyn File>>>>,
    /// 文件描述符标志数组
    fd_flags: SpinLock<Vec<FdFlags>>,
    /// 最大文件描述符数量
    max_fds: usize,
}

impl fmt::Debug for FDTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let files = self.files.lock();
        let used = files.iter().filter(|slot| slot.is_some()).count();
        f.debug_struct("FDTable")
            .field("max_fds", &self.max_fds)
            .field("slots", &files.len())
            .field("used", &used)
            .finish()
    }
}

impl FDTable {
    /// 创建新的文件描述符表
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_FDS)
    }

    /// 创建指定 fd 上限的文件描述符表
    pub fn with_capacity(max_fds: usize) -> Self {
        Self {
            files: SpinLock::new(Vec::new()),
            fd_flags: SpinLock::new(Vec::new()),
            max_fds,
        }
    }

    /// 分配一个新的文件描述符（默认无 FD 标志）
    pub fn alloc(&self, file: Arc<dyn File>) -> Result<usize, FsError> {
        self.alloc_with_flags(file, FdFlags::empty())
    }

    /// 分配一个新的文件描述符并指定 FD 标志
    pub fn alloc_with_flags(&self, file: Arc<dyn File>, flags: FdFlags) -> Result<usize, FsError> {
        let mut files = self.files.lock();
        let mut fd_flags = self.fd_flags.lock();

        // 查找最小可用 FD
        for (fd, slot) in files.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(file);
                fd_flags[fd] = flags;
                return Ok(fd);
            }
        }

        // 如果没有空闲槽位，扩展数组
        let fd = files.len();
        if fd >= self.max_fds {
            return Err(FsError::TooManyOpenFiles);
        }

        files.push(Some(file));
        fd_flags.push(flags);
        Ok(fd)
    }

    /// 获取文件对象
    pub fn get(&self, fd: usize) -> Result<Arc<dyn File>, FsError> {
        let files = self.files.lock();
        files
            .get(fd)
            .and_then(|f| f.clone())
            .ok_or(FsError::BadFileDescriptor)
    }

    /// 关闭文件描述符
    ///
    /// 从表中取下文件对象并丢弃本表持有的引用；若这是最后一个引用，
    /// 文件类型自身的 `Drop` 负责释放底层资源。
    pub fn close(&self, fd: usize) -> Result<(), FsError> {
        let mut files = self.files.lock();
        let mut fd_flags = self.fd_flags.lock();

        if fd >= files.len() || files[fd].is_none() {
            return Err(FsError::BadFileDescriptor);
        }

        files[fd] = None;
        fd_flags[fd] = FdFlags::empty();
        Ok(())
    }

    /// 取走并清空所有已打开的文件描述符（进程退出清理）
    pub fn take_all(&self) -> Vec<(usize, Arc<dyn File>)> {
        let mut files = self.files.lock();
        let mut fd_flags = self.fd_flags.lock();

        let mut out = Vec::new();
        for (fd, slot) in files.iter_mut().enumerate() {
            if let Some(file) = slot.take() {
                out.push((fd, file));
            }
        }
        for f in fd_flags.iter_mut() {
            *f = FdFlags::empty();
        }
        out
    }

    /// 获取文件描述符标志 (F_GETFD)
    pub fn get_fd_flags(&self, fd: usize) -> Result<FdFlags, FsError> {
        let files = self.files.lock();
        let fd_flags = self.fd_flags.lock();

        if fd >= files.len() || files[fd].is_none() {
            return Err(FsError::BadFileDescriptor);
        }

        Ok(fd_flags[fd])
    }

    /// 设置文件描述符标志 (F_SETFD)
    pub fn set_fd_flags(&self, fd: usize, flags: FdFlags) -> Result<(), FsError> {
        let files = self.files.lock();
        let mut fd_flags = self.fd_flags.lock();

        if fd >= files.len() || files[fd].is_none() {
            return Err(FsError::BadFileDescriptor);
        }

        fd_flags[fd] = flags;
        Ok(())
    }
}

impl Default for FDTable {
    fn default() -> Self {
        Self::new()
    }
}
