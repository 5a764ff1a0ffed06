//! FUTEX_FD：绑定到 futex 的一次性文件描述符
//!
//! 返回的 fd 是一次性的：对应的排队条目被某次 Wake 取走后，fd 变为
//! poll 可读并（可选）向属主进程投递信号；不会重新武装，下一轮等待
//! 需要新的 fd。任何时刻关闭 fd（包括从未被唤醒时）都会干净地出队
//! 并释放页引用；进程退出由 fd 表的统一清扫走同一条路径。

use alloc::sync::Arc;
use klog::pr_debug;
use sync::SpinLock;
use uapi::poll::PollEvents;
use uapi::signal::valid_signal;
use vfs::{FDTable, File, FsError};

use crate::error::FutexError;
use crate::key::futex_offset;
use crate::ops::{AspaceId, kernel_ops};
use crate::queue::{FdNotify, FutexQ, FutexTable};

/// futex fd 的文件对象
///
/// 持有排队条目和所属哈希表；最后一个引用消失时（显式 close 或进程
/// 退出清扫）出队并释放资源。与并发 Wake 的竞争由桶锁仲裁：谁先拿到
/// 锁谁完成出队，另一方看到条目已不在链表便不再动它。
pub struct FutexFile {
    table: Arc<FutexTable>,
    q: Arc<FutexQ>,
}

impl FutexTable {
    /// FUTEX_FD：创建绑定到 `uaddr` 的一次性 fd
    ///
    /// `signum` 非 0 时等价于 `F_SETOWN` + `F_SETSIG`：唤醒时向当前
    /// 进程投递该信号。越界信号编号返回
    /// [`FutexError::InvalidArgument`]；fd 表满时返回
    /// [`FutexError::TooManyOpenFiles`]。
    pub fn fd(
        self: &Arc<Self>,
        fd_table: &FDTable,
        aspace: AspaceId,
        uaddr: usize,
        signum: u32,
    ) -> Result<usize, FutexError> {
        let offset = futex_offset(uaddr)?;
        if signum != 0 && !valid_signal(signum) {
            return Err(FutexError::InvalidArgument);
        }

        let notify = FdNotify {
            signum,
            owner: SpinLock::new(None),
        };
        let q = Arc::new(FutexQ::new_fd_entry(aspace, uaddr, offset, notify));
        self.pin_and_enqueue(&q)?;

        let file = Arc::new(FutexFile {
            table: self.clone(),
            q,
        });
        if signum != 0 {
            // 异步通知默认归创建进程所有
            let _ = file.set_owner(kernel_ops().current_pid());
        }

        match fd_table.alloc(file) {
            Ok(fd) => {
                pr_debug!("futex: fd {} armed at {:#x}", fd, uaddr);
                Ok(fd)
            }
            // 安装失败时文件对象随错误路径丢弃，Drop 负责出队
            Err(FsError::TooManyOpenFiles) => Err(FutexError::TooManyOpenFiles),
            Err(_) => Err(FutexError::InvalidArgument),
        }
    }
}

impl File for FutexFile {
    fn readable(&self) -> bool {
        self.q.is_woken()
    }

    fn writable(&self) -> bool {
        false
    }

    fn read(&self, _buf: &mut [u8]) -> Result<usize, FsError> {
        Err(FsError::NotSupported)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotSupported)
    }

    fn poll(&self) -> PollEvents {
        if self.q.is_woken() {
            PollEvents::POLLIN
        } else {
            PollEvents::empty()
        }
    }

    fn get_owner(&self) -> Result<i32, FsError> {
        match self.q.notify {
            Some(ref notify) => Ok((*notify.owner.lock()).unwrap_or(0)),
            None => Err(FsError::NotSupported),
        }
    }

    fn set_owner(&self, pid: i32) -> Result<(), FsError> {
        match self.q.notify {
            Some(ref notify) => {
                *notify.owner.lock() = Some(pid);
                Ok(())
            }
            None => Err(FsError::NotSupported),
        }
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

impl Drop for FutexFile {
    /// 关闭路径：若条目仍在排队则出队并释放页引用
    fn drop(&mut self) {
        self.table.unqueue(&self.q);
    }
}
