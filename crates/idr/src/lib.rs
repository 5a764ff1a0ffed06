//! 稀疏整数 id 分配器
//!
//! 将调用方提供的值映射到**最小可用**的非负整数 id，支持按 id 查找
//! 和释放。内部是一棵扇出为 [`IDR_SIZE`] 的基数树：
//!
//! - 每层节点用"满子树位图"剪枝，查找空闲 id 时整棵满子树 O(1) 跳过；
//! - 树深按需增长（把旧根包进新根的 0 号槽位）、按需收缩
//!   （根只剩 0 号链时降层）；
//! - 返回的 id 在高位混入逐次递增的 generation（见 [`IdrId`]）。
//!
//! # 内存策略
//!
//! 树操作自身**从不**调用后备分配器：新节点只从内部空闲池取用。
//! 调用方在进入自己的临界区之前先调用 [`Idr::pre_reserve`] 补满池子，
//! 之后的 [`Idr::alloc`] 便不会触发可能阻塞的分配；池子耗尽时
//! `alloc` 返回可重试的 [`IdrError::NoFreeNodes`]，与结构性满
//! （[`IdrError::SpaceExhausted`]）严格区分。
//!
//! # 加锁约定
//!
//! `alloc`/`find`/`remove` 依赖调用方的外部互斥（`&mut self` 即体现
//! 这一点）；只有空闲池由内部自旋锁保护，且该锁不与任何其它子系统
//! 的锁嵌套。

#![no_std]

extern crate alloc;

mod id;
mod layer;

pub use id::IdrId;

use alloc::boxed::Box;
use alloc::vec::Vec;
use layer::{Child, Layer};
use sync::SpinLock;

/// 每层消耗的 id 位数
pub const IDR_BITS: usize = 5;
/// 每层节点的槽位数（树的扇出）
pub const IDR_SIZE: usize = 1 << IDR_BITS;
/// index 字段的位宽
pub const INDEX_BITS: usize = 24;
/// 原始 id 中的 index 掩码
pub const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;
/// 可分配的最大树内索引
pub const MAX_INDEX: usize = INDEX_MASK;
/// 覆盖全部 index 位所需的最大层数
pub const MAX_LAYERS: usize = INDEX_BITS.div_ceil(IDR_BITS);
/// 空闲池的容量上限
pub const IDR_FREE_MAX: usize = MAX_LAYERS * 2;

/// 分配失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdrError {
    /// 空闲池中没有可用节点：先 [`Idr::pre_reserve`] 再重试
    NoFreeNodes,
    /// id 空间在最大树深下已结构性耗尽
    SpaceExhausted,
}

impl IdrError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            IdrError::NoFreeNodes => -11,  // -EAGAIN
            IdrError::SpaceExhausted => -28, // -ENOSPC
        }
    }
}

/// `sub_alloc` 的内部失败原因；`Full` 是相对搜索起点而言的
enum SubErr {
    Full,
    NoNodes,
}

/// 稀疏整数 id 分配器句柄
pub struct Idr<T> {
    /// 树根；空树时为 None
    top: Option<Box<Layer<T>>>,
    /// 当前树深（0 表示空树）
    layers: usize,
    /// 存活的 id 数
    count: usize,
    /// 下一次分配使用的复用代数
    generation: u8,
    /// 空闲节点池（内部自旋锁保护）
    free: SpinLock<Vec<Box<Layer<T>>>>,
}

impl<T> Idr<T> {
    /// 创建一个空的分配器
    pub const fn new() -> Self {
        Idr {
            top: None,
            layers: 0,
            count: 0,
            generation: 0,
            free: SpinLock::new(Vec::new()),
        }
    }

    /// 把空闲池补到 [`IDR_FREE_MAX`] 个备用节点
    ///
    /// 这是唯一调用后备分配器的增长路径，必须在调用方进入不可阻塞的
    /// 临界区之前调用。返回 `false` 仅表示后备分配器内存耗尽
    /// （Rust 的全局分配器在真正耗尽时中止进程，这里保留返回值以
    /// 维持调用契约）。
    pub fn pre_reserve(&self) -> bool {
        loop {
            {
                let free = self.free.lock();
                if free.len() >= IDR_FREE_MAX {
                    return true;
                }
            }
            // 在锁外向后备分配器要节点
            let node = Layer::new_boxed();
            let mut free = self.free.lock();
            if free.len() < IDR_FREE_MAX {
                free.push(node);
            }
        }
    }

    /// 分配最小可用 id（≥ `lower_bound`）并与 `value` 关联
    ///
    /// 新节点只从空闲池取用；池子不够时返回
    /// [`IdrError::NoFreeNodes`]，调用方应 [`Idr::pre_reserve`] 后重试。
    /// id 空间在最大树深下用尽时返回 [`IdrError::SpaceExhausted`]。
    /// 两种错误下 `value` 都被丢弃。
    pub fn alloc(&mut self, value: T, lower_bound: usize) -> Result<IdrId, IdrError> {
        if lower_bound > MAX_INDEX {
            return Err(IdrError::SpaceExhausted);
        }

        let mut value = value;
        loop {
            // 树至少一层，且容量覆盖 lower_bound
            while self.layers == 0 || self.capacity() <= lower_bound {
                self.grow()?;
            }

            let layers = self.layers;
            let top = match self.top.as_mut() {
                Some(top) => top,
                None => return Err(IdrError::SpaceExhausted),
            };

            match Self::sub_alloc(top, layers - 1, lower_bound, 0, &self.free, value) {
                Ok(index) => {
                    self.count += 1;
                    return Ok(self.stamp_generation(index));
                }
                Err((SubErr::Full, v)) => {
                    // 当前树深下 lower_bound 之上已无空位：加层重试
                    if self.layers >= MAX_LAYERS {
                        return Err(IdrError::SpaceExhausted);
                    }
                    self.grow()?;
                    value = v;
                }
                Err((SubErr::NoNodes, _)) => return Err(IdrError::NoFreeNodes),
            }
        }
    }

    /// 按原始 id 查找值
    ///
    /// 只使用 id 的 index 位（高位 generation 被掩掉）；generation
    /// 校验由调用方完成。任何一级槽位为空即返回 `None`。
    pub fn find(&self, raw: i32) -> Option<&T> {
        let index = IdrId::from_raw(raw).index();
        if self.layers == 0 || index >= self.capacity() {
            return None;
        }

        let mut node = self.top.as_deref()?;
        let mut level = self.layers - 1;
        loop {
            let digit = Layer::<T>::digit_of(index, level);
            match node.slots[digit] {
                None => return None,
                Some(Child::Value(ref value)) => {
                    return if level == 0 { Some(value) } else { None };
                }
                Some(Child::Node(ref child)) => {
                    if level == 0 {
                        return None;
                    }
                    node = child;
                    level -= 1;
                }
            }
        }
    }

    /// 释放一个 id，返回其关联的值
    ///
    /// 释放未分配（或已释放）的 id 是定义良好的无操作，返回 `None`。
    /// 沿途清除祖先的满位图，清空的节点归还空闲池；根只剩 0 号子链时
    /// 树深收缩。
    pub fn remove(&mut self, raw: i32) -> Option<T> {
        let index = IdrId::from_raw(raw).index();
        if self.layers == 0 || index >= self.capacity() {
            return None;
        }

        let layers = self.layers;
        let top = self.top.as_mut()?;
        let (removed, _) = Self::sub_remove(top, layers - 1, index, &self.free);
        if removed.is_some() {
            self.count -= 1;
            self.shrink();
        }
        removed
    }

    /// 存活的 id 数
    pub fn len(&self) -> usize {
        self.count
    }

    /// 是否没有存活的 id
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    // ========== 内部实现 ==========

    /// 当前树深能表示的 index 数
    fn capacity(&self) -> usize {
        let bits = self.layers * IDR_BITS;
        if bits >= INDEX_BITS {
            MAX_INDEX + 1
        } else {
            1 << bits
        }
    }

    /// 在 index 上打上当前代数，并跳过会产生 -1 的组合
    fn stamp_generation(&mut self, index: usize) -> IdrId {
        let mut generation = self.generation;
        self.generation = self.generation.wrapping_add(1);

        if IdrId::new(index as u32, generation).to_raw() == -1 {
            generation = self.generation;
            self.generation = self.generation.wrapping_add(1);
        }
        IdrId::new(index as u32, generation)
    }

    /// 加一层：从空闲池取新根，旧根挂到新根的 0 号槽位
    fn grow(&mut self) -> Result<(), IdrError> {
        let mut new_root = match self.free.lock().pop() {
            Some(node) => node,
            None => return Err(IdrError::NoFreeNodes),
        };

        if let Some(old_root) = self.top.take() {
            if old_root.is_full() {
                new_root.bitmap = 1;
            }
            new_root.slots[0] = Some(Child::Node(old_root));
            new_root.count = 1;
        }
        self.top = Some(new_root);
        self.layers += 1;
        Ok(())
    }

    /// 根收缩：根只含 0 号子节点时降层；树空时收回根节点
    fn shrink(&mut self) {
        while self.layers > 1 {
            let top = match self.top.as_mut() {
                Some(top) => top,
                None => return,
            };
            if top.count != 1 || !matches!(top.slots[0], Some(Child::Node(_))) {
                break;
            }
            let child = match top.slots[0].take() {
                Some(Child::Node(child)) => child,
                _ => return,
            };
            top.count = 0;
            top.bitmap = 0;
            if let Some(old_root) = self.top.replace(child) {
                Self::release_node(&self.free, old_root);
            }
            self.layers -= 1;
        }

        if self.top.as_ref().is_some_and(|top| top.count == 0) {
            if let Some(root) = self.top.take() {
                Self::release_node(&self.free, root);
            }
            self.layers = 0;
        }
    }

    /// 递归查找并占用最小空位
    ///
    /// `start` 是本子树内的最小可用索引，`prefix` 是上层已确定的
    /// 高位。返回占用的子树内索引；`Full` 表示 `start` 之上无空位
    /// （注意：不代表子树完全满）。
    fn sub_alloc(
        node: &mut Layer<T>,
        level: usize,
        start: usize,
        prefix: usize,
        free: &SpinLock<Vec<Box<Layer<T>>>>,
        value: T,
    ) -> Result<usize, (SubErr, T)> {
        let shift = level * IDR_BITS;
        let mut digit = (start >> shift) & (IDR_SIZE - 1);
        let mut sub_start = start & ((1usize << shift) - 1);
        let mut value = value;

        loop {
            let candidate = match node.find_next_clear(digit) {
                Some(c) => c,
                None => return Err((SubErr::Full, value)),
            };
            if candidate != digit {
                digit = candidate;
                sub_start = 0;
            }

            if level == 0 {
                if (prefix | digit) > MAX_INDEX {
                    return Err((SubErr::Full, value));
                }
                node.slots[digit] = Some(Child::Value(value));
                node.bitmap |= 1 << digit;
                node.count += 1;
                return Ok(digit);
            }

            let child_prefix = prefix | (digit << shift);
            if child_prefix > MAX_INDEX {
                return Err((SubErr::Full, value));
            }

            if node.slots[digit].is_none() {
                let new_node = match free.lock().pop() {
                    Some(n) => n,
                    None => return Err((SubErr::NoNodes, value)),
                };
                node.slots[digit] = Some(Child::Node(new_node));
                node.count += 1;
            }
            let child = match node.slots[digit] {
                Some(Child::Node(ref mut child)) => child,
                // 内部层不会出现叶值
                _ => return Err((SubErr::Full, value)),
            };

            match Self::sub_alloc(child, level - 1, sub_start, child_prefix, free, value) {
                Ok(index) => {
                    if child.is_full() {
                        node.bitmap |= 1 << digit;
                    }
                    return Ok((digit << shift) | index);
                }
                Err((SubErr::Full, v)) => {
                    // 子树在 sub_start 之上无空位：尝试下一个槽位
                    value = v;
                    digit += 1;
                    sub_start = 0;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// 递归释放；返回 (被移除的值, 本节点是否因此变空)
    fn sub_remove(
        node: &mut Layer<T>,
        level: usize,
        index: usize,
        free: &SpinLock<Vec<Box<Layer<T>>>>,
    ) -> (Option<T>, bool) {
        let digit = Layer::<T>::digit_of(index, level);

        if level == 0 {
            let removed = match node.slots[digit].take() {
                Some(Child::Value(value)) => {
                    node.bitmap &= !(1 << digit);
                    node.count -= 1;
                    Some(value)
                }
                other => {
                    // 未分配或已释放：恢复槽位原状，无操作
                    node.slots[digit] = other;
                    None
                }
            };
            let emptied = removed.is_some() && node.count == 0;
            return (removed, emptied);
        }

        let (removed, child_emptied) = match node.slots[digit] {
            Some(Child::Node(ref mut child)) => Self::sub_remove(child, level - 1, index, free),
            _ => return (None, false),
        };

        if removed.is_some() {
            // 子树必然不再满
            node.bitmap &= !(1 << digit);
            if child_emptied {
                if let Some(Child::Node(child)) = node.slots[digit].take() {
                    Self::release_node(free, child);
                }
                node.count -= 1;
            }
        }
        let removed_some = removed.is_some();
        (removed, removed_some && node.count == 0)
    }

    /// 空节点归还空闲池；池满时直接还给后备分配器
    fn release_node(free: &SpinLock<Vec<Box<Layer<T>>>>, node: Box<Layer<T>>) {
        debug_assert!(node.count == 0 && node.bitmap == 0);
        let mut pool = free.lock();
        if pool.len() < IDR_FREE_MAX {
            pool.push(node);
        }
    }

    /// 空闲池中的节点数（仅用于调试/测试）
    #[doc(hidden)]
    pub fn free_pool_len(&self) -> usize {
        self.free.lock().len()
    }
}

impl<T> Default for Idr<T> {
    fn default() -> Self {
        Self::new()
    }
}
