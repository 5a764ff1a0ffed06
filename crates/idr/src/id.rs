//! id 编码
//!
//! 对外的 id 是一个 `i32`，由两个字段打包而成：
//!
//! ```text
//!  31            24 23                         0
//! ┌────────────────┬───────────────────────────┐
//! │   generation   │           index           │
//! └────────────────┴───────────────────────────┘
//! ```
//!
//! - **index**：基数树路径，即真正的槽位编号（24 位）；
//! - **generation**：每次分配递增的复用计数。同一 index 被释放又立刻
//!   复用时，新 id 的高位不同，便于调用方发现过期句柄。
//!
//! generation 只是降低（而非消除）过期句柄碰撞的概率；分配器查找时
//! 只看 index，不校验 generation，校验由调用方自行完成。

use crate::{INDEX_BITS, INDEX_MASK};

/// 一个已分配的 id：树内索引 + 复用代数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdrId {
    index: u32,
    generation: u8,
}

impl IdrId {
    /// 由字段构造（index 超出 24 位的部分被截断）
    pub(crate) const fn new(index: u32, generation: u8) -> Self {
        Self {
            index: index & INDEX_MASK as u32,
            generation,
        }
    }

    /// 树内索引（基数树路径）
    pub const fn index(&self) -> usize {
        self.index as usize
    }

    /// 复用代数
    pub const fn generation(&self) -> u8 {
        self.generation
    }

    /// 打包为对外的原始 id
    pub const fn to_raw(&self) -> i32 {
        (((self.generation as u32) << INDEX_BITS) | self.index) as i32
    }

    /// 由原始 id 解包
    pub const fn from_raw(raw: i32) -> Self {
        Self {
            index: raw as u32 & INDEX_MASK as u32,
            generation: (raw as u32 >> INDEX_BITS) as u8,
        }
    }
}
