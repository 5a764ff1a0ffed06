//! Futex（fast userspace mutex）子系统
//!
//! 以**物理页身份**为键的跨进程睡眠/唤醒原语：互相协作的线程通过
//! 共享内存里的一个 4 字节单元同步，仅在竞争时进入内核。两个不同的
//! 虚拟地址（不同进程或共享映射）指向同一物理页/偏移时指的是同一个
//! futex，无需任何命名内核对象。
//!
//! # 操作
//!
//! - **WAIT**：值仍等于期望值则阻塞，可带超时，可被信号打断；
//! - **WAKE**：按 FIFO 唤醒至多 N 个键匹配的等待者；
//! - **FD**：返回一个一次性 fd，唤醒时 poll 可读并可投递信号。
//!
//! # 结构
//!
//! - [`FutexTable`]：哈希桶数组 + 重映射（vcache）注册表。进程范围的
//!   单例 [`FUTEX_TABLE`] 在首次使用时建立、从不销毁；所有操作都以
//!   表引用为参数，测试可构造隔离实例。
//! - [`KernelOps`]：子系统消费的全部外部能力（钉页、读用户内存、
//!   阻塞原语、信号投递），启动时经 [`register_kernel_ops`] 注册。
//! - [`do_futex`]：面向系统调用分发层的入口，操作码见
//!   `uapi::futex`，错误以负 errno 返回。
//!
//! # 生命周期不变量
//!
//! 排队条目在队期间始终持有对其键页的引用（[`PagePin`] RAII），无论
//! 正常唤醒、超时、信号还是错误回退，引用恰好释放一次；写时复制把
//! 物理页换掉时，重映射回调把条目搬到新桶而不是唤醒或丢弃它。

#![no_std]

extern crate alloc;

mod error;
mod fd;
mod key;
mod ops;
mod page;
mod queue;

pub use error::FutexError;
pub use fd::FutexFile;
pub use key::{FUTEX_BUCKET_COUNT, FUTEX_HASHBITS, FutexKey};
pub use ops::{AspaceId, BlockOutcome, KernelOps, PageId, WaiterId, kernel_ops, register_kernel_ops};
pub use page::PagePin;
pub use queue::{FutexTable, WaitOutcome};

use alloc::sync::Arc;
use uapi::errno;
use uapi::futex::{FUTEX_FD, FUTEX_WAIT, FUTEX_WAKE};
use uapi::time::TimeSpec;
use vfs::FDTable;

lazy_static::lazy_static! {
    /// 进程范围的全局 futex 哈希表
    pub static ref FUTEX_TABLE: Arc<FutexTable> = Arc::new(FutexTable::new());
}

/// futex 系统调用入口
///
/// 由（本仓库范围之外的）系统调用分发层调用：`op` 取
/// `uapi::futex` 中的操作码，`val` 依操作分别是期望值（WAIT）、
/// 最大唤醒数（WAKE）或信号编号（FD）。返回非负结果或负 errno。
pub fn do_futex(
    table: &Arc<FutexTable>,
    fd_table: &FDTable,
    aspace: AspaceId,
    uaddr: usize,
    op: u32,
    val: u32,
    timeout: Option<&TimeSpec>,
) -> isize {
    match op {
        FUTEX_WAIT => {
            let timeout_ns = match timeout {
                Some(ts) if !ts.is_valid() => return -errno::EINVAL,
                Some(ts) => Some(ts.as_nanos()),
                None => None,
            };
            match table.wait(aspace, uaddr, val, timeout_ns) {
                Ok(WaitOutcome::Woken) => 0,
                Ok(WaitOutcome::WouldBlock) => -errno::EWOULDBLOCK,
                Ok(WaitOutcome::TimedOut) => -errno::ETIMEDOUT,
                Ok(WaitOutcome::Interrupted) => -errno::EINTR,
                Err(e) => e.to_errno(),
            }
        }
        FUTEX_WAKE => match table.wake(aspace, uaddr, val as usize) {
            Ok(woken) => woken as isize,
            Err(e) => e.to_errno(),
        },
        FUTEX_FD => match table.fd(fd_table, aspace, uaddr, val) {
            Ok(fd) => fd as isize,
            Err(e) => e.to_errno(),
        },
        _ => -errno::EINVAL,
    }
}
