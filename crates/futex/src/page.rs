//! 页引用的 RAII 封装
//!
//! 钉住的页引用必须在每条退出路径上恰好释放一次；
//! [`PagePin`] 在构造时取得引用，`Drop` 时释放。

use crate::error::FutexError;
use crate::ops::{AspaceId, PageId, kernel_ops};

/// 一个已钉住的物理页引用。
/// 实现了 RAII 模式：当此结构体被 drop 时，页引用会被自动释放。
#[derive(Debug)]
pub struct PagePin(PageId);

impl PagePin {
    /// 解析 `uaddr` 并钉住其物理页
    pub fn pin(aspace: AspaceId, uaddr: usize) -> Result<Self, FutexError> {
        Ok(PagePin(kernel_ops().pin_page(aspace, uaddr)?))
    }

    /// 对已解析出的页再取一个引用（重映射回调路径）
    pub fn pin_existing(page: PageId) -> Self {
        kernel_ops().pin_existing(page);
        PagePin(page)
    }

    /// 被钉住的页标识
    pub fn page(&self) -> PageId {
        self.0
    }
}

impl Drop for PagePin {
    /// 自动释放页引用。
    fn drop(&mut self) {
        kernel_ops().unpin_page(self.0);
    }
}
