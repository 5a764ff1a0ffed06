//! 架构相关操作的 Mock 实现
//!
//! 宿主机测试没有真实的中断控制，这里用一个原子布尔值模拟
//! 本地中断开关状态。

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Mock 架构操作
pub struct MockArchOps {
    /// 模拟的本地中断使能状态
    pub interrupt_state: AtomicBool,
    /// 模拟的当前 CPU ID
    pub cpu_id: AtomicUsize,
}

/// Mock 的中断使能位
const MOCK_INTR_ENABLE: usize = 0x2;

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            interrupt_state: AtomicBool::new(true),
            cpu_id: AtomicUsize::new(0),
        }
    }
}

impl sync::ArchOps for MockArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        if self.interrupt_state.swap(false, Ordering::SeqCst) {
            MOCK_INTR_ENABLE
        } else {
            0
        }
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        self.interrupt_state
            .store(flags & MOCK_INTR_ENABLE != 0, Ordering::SeqCst);
    }

    fn intr_enable_mask(&self) -> usize {
        MOCK_INTR_ENABLE
    }

    fn cpu_id(&self) -> usize {
        self.cpu_id.load(Ordering::Relaxed)
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();

/// 注册全局 Mock 架构实现（重复调用是幂等的）
pub fn init() {
    // SAFETY: 测试环境下重复注册同一 static 实例是无害的
    unsafe { sync::register_arch_ops(&MOCK_ARCH_OPS) };
}
