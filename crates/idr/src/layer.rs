//! 基数树节点
//!
//! 每个节点固定 [`IDR_SIZE`] 个槽位，并维护：
//!
//! - **bitmap**：第 i 位为 1 表示子树 i **完全满**（叶层则表示槽位 i
//!   被占用）。查找空闲 id 时据此整树剪枝。
//! - **count**：非空槽位数，用于判断节点何时可以回收。
//!
//! 空闲节点不复用槽位存储链表指针，而是由分配器的空闲池
//! （`Vec<Box<Layer>>`）持有，节点本身始终是结构良好的空节点。

use crate::{IDR_BITS, IDR_SIZE};
use alloc::boxed::Box;

/// 槽位内容：下层节点或叶值
pub(crate) enum Child<T> {
    /// 指向下一层的内部节点
    Node(Box<Layer<T>>),
    /// 叶层存储的值
    Value(T),
}

/// 基数树的一层节点
pub(crate) struct Layer<T> {
    /// 子槽位
    pub slots: [Option<Child<T>>; IDR_SIZE],
    /// 满子树位图
    pub bitmap: u32,
    /// 非空槽位计数
    pub count: u32,
}

/// 位图全满时的值
pub(crate) const FULL_BITMAP: u32 = u32::MAX;

impl<T> Layer<T> {
    /// 在堆上分配一个空节点
    pub fn new_boxed() -> Box<Self> {
        Box::new(Layer {
            slots: core::array::from_fn(|_| None),
            bitmap: 0,
            count: 0,
        })
    }

    /// 本节点（对应的子树）是否完全满
    pub fn is_full(&self) -> bool {
        self.bitmap == FULL_BITMAP
    }

    /// 从 `from` 起查找第一个未满的槽位
    pub fn find_next_clear(&self, from: usize) -> Option<usize> {
        if from >= IDR_SIZE {
            return None;
        }
        let candidates = !self.bitmap & (u32::MAX << from);
        if candidates == 0 {
            None
        } else {
            Some(candidates.trailing_zeros() as usize)
        }
    }

    /// 取 `index` 在 `level` 层的基数位
    #[inline]
    pub fn digit_of(index: usize, level: usize) -> usize {
        (index >> (level * IDR_BITS)) & (IDR_SIZE - 1)
    }
}
