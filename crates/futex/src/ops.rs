//! 内核边界操作 trait 定义和注册
//!
//! futex 子系统消费的全部外部能力在这里声明：页钉住/解钉、
//! 用户内存读取、当前任务标识、可超时的阻塞原语和信号投递。
//! 内核入口 crate（或测试）实现此 trait 并在启动时注册。

use crate::error::FutexError;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 地址空间标识（进程的内存描述符）
pub type AspaceId = u64;

/// 物理页标识
///
/// 同一物理页在其生命周期内标识不变；写时复制产生的新页拥有新标识。
pub type PageId = u64;

/// 等待者标识（当前执行流的阻塞句柄）
pub type WaiterId = usize;

/// 阻塞原语的返回值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// 被 [`KernelOps::wake_waiter`] 唤醒
    Woken,
    /// 超时到期
    TimedOut,
    /// 被信号打断
    Interrupted,
}

/// 内核边界操作
///
/// # 阻塞语义
///
/// `block_current`/`wake_waiter` 必须构成"单许可事件"：对同一
/// `WaiterId` 的 wake 先于 block 到达时，block 立即返回
/// [`BlockOutcome::Woken`] 而不是丢失唤醒。这是关闭
/// 唤醒-先于-等待竞态的基础。
pub trait KernelOps: Send + Sync {
    /// 钉住 `uaddr` 所在的物理页并返回页标识
    ///
    /// 每次成功调用获取一个引用，必须与一次 `unpin_page` 配对。
    /// 地址未映射时返回 [`FutexError::Fault`]。
    fn pin_page(&self, aspace: AspaceId, uaddr: usize) -> Result<PageId, FutexError>;

    /// 对一个已解析出的页再取一个引用（重映射回调路径）
    fn pin_existing(&self, page: PageId);

    /// 释放一个页引用
    fn unpin_page(&self, page: PageId);

    /// 查询 `uaddr` 当前映射到的物理页（不取引用）
    ///
    /// 用于钉住后、入队前在桶锁下重新校验映射未被换出/复制。
    fn page_of(&self, aspace: AspaceId, uaddr: usize) -> Option<PageId>;

    /// 读取用户空间的 4 字节值
    fn read_user_u32(&self, aspace: AspaceId, uaddr: usize) -> Result<u32, FutexError>;

    /// 当前执行流的等待者标识
    fn current_waiter(&self) -> WaiterId;

    /// 当前进程号（FUTEX_FD 异步通知的默认属主）
    fn current_pid(&self) -> i32;

    /// 阻塞当前执行流直到被唤醒、超时或被信号打断
    ///
    /// 阻塞期间调用方不持有任何锁。
    fn block_current(&self, waiter: WaiterId, timeout_ns: Option<u64>) -> BlockOutcome;

    /// 唤醒指定等待者（见 trait 级的单许可语义）
    fn wake_waiter(&self, waiter: WaiterId);

    /// 向进程投递信号（FUTEX_FD 的 SIGIO 式通知）
    fn deliver_signal(&self, pid: i32, signum: u32);
}

/// 全局内核操作实例（存储 fat pointer 的两个部分）
static KERNEL_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static KERNEL_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册内核操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_kernel_ops(ops: &'static dyn KernelOps) {
    let ptr = ops as *const dyn KernelOps;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn KernelOps, (usize, usize)>(ptr) };
    KERNEL_OPS_DATA.store(data, Ordering::Release);
    KERNEL_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的内核操作实现
///
/// # Panics
/// 如果尚未调用 [`register_kernel_ops`] 注册实现，则 panic
#[inline]
pub fn kernel_ops() -> &'static dyn KernelOps {
    let data = KERNEL_OPS_DATA.load(Ordering::Acquire);
    let vtable = KERNEL_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("futex: KernelOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn KernelOps>((data, vtable)) }
}
