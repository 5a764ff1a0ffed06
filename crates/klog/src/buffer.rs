//! 无锁日志环形缓冲区
//!
//! 多生产者、单消费者的有界环形缓冲区：
//!
//! - 写者通过 CAS 认领单调递增的写索引，随后填充槽位并用槽位序号"提交"；
//! - 读者（单消费者）按读索引消费，通过槽位序号确认写入已完成；
//! - 缓冲区满时**丢弃新条目**并递增丢弃计数，保证旧日志不被覆盖。
//!
//! 读写索引是单调计数器，对外即 reader/writer index，可用于 `peek`。

use crate::config::GLOBAL_LOG_BUFFER_SIZE;
use crate::entry::LogEntry;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 一个槽位：序号 + 条目存储
///
/// `seq == index + 1` 表示该单调索引处的条目已完整写入。
struct Slot {
    seq: AtomicUsize,
    entry: UnsafeCell<LogEntry>,
}

impl Slot {
    const fn new() -> Self {
        Self {
            seq: AtomicUsize::new(0),
            entry: UnsafeCell::new(LogEntry::empty()),
        }
    }
}

/// 全局日志环形缓冲区
pub(crate) struct GlobalLogBuffer {
    slots: [Slot; GLOBAL_LOG_BUFFER_SIZE],
    /// 写索引（单调递增）
    head: AtomicUsize,
    /// 读索引（单调递增）
    tail: AtomicUsize,
    /// 因缓冲区满而丢弃的条目数
    dropped: AtomicUsize,
    /// 未读条目格式化后的总字节数
    unread_bytes: AtomicUsize,
}

impl GlobalLogBuffer {
    pub(crate) const fn new() -> Self {
        const SLOT: Slot = Slot::new();
        Self {
            slots: [SLOT; GLOBAL_LOG_BUFFER_SIZE],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            unread_bytes: AtomicUsize::new(0),
        }
    }

    /// 写入一个条目；缓冲区满时丢弃该条目并计数。
    ///
    /// `formatted_len` 是该条目格式化后的字节数，用于未读字节统计。
    pub(crate) fn write(&self, entry: &LogEntry, formatted_len: usize) {
        let index = loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            if head.wrapping_sub(tail) >= GLOBAL_LOG_BUFFER_SIZE {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            if self
                .head
                .compare_exchange_weak(head, head + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                break head;
            }
        };

        let slot = &self.slots[index % GLOBAL_LOG_BUFFER_SIZE];
        // SAFETY: CAS 使该单调索引只被本写者认领；读者在 seq 提交前不会访问。
        unsafe { *slot.entry.get() = *entry };
        slot.seq.store(index + 1, Ordering::Release);
        self.unread_bytes.fetch_add(formatted_len, Ordering::Relaxed);
    }

    /// 读出最旧的未读条目（单消费者），并返回其格式化字节数。
    pub(crate) fn read(&self) -> Option<(LogEntry, usize)> {
        let tail = self.tail.load(Ordering::Acquire);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        let slot = &self.slots[tail % GLOBAL_LOG_BUFFER_SIZE];
        // 等待写者提交（认领与填充之间的窗口极短）
        while slot.seq.load(Ordering::Acquire) != tail + 1 {
            core::hint::spin_loop();
        }
        // SAFETY: seq 已提交且读者唯一，槽位在 tail 前进前不会被复用。
        let entry = unsafe { *slot.entry.get() };
        self.tail.store(tail + 1, Ordering::Release);

        let len = crate::log_core::formatted_length(&entry);
        self.unread_bytes.fetch_sub(len, Ordering::Relaxed);
        Some((entry, len))
    }

    /// 按单调索引非破坏性读取，不移动读指针。
    pub(crate) fn peek(&self, index: usize) -> Option<LogEntry> {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        if index < tail || index >= head {
            return None;
        }

        let slot = &self.slots[index % GLOBAL_LOG_BUFFER_SIZE];
        if slot.seq.load(Ordering::Acquire) != index + 1 {
            return None;
        }
        // SAFETY: seq 确认该索引的条目已提交且尚未被覆盖。
        Some(unsafe { *slot.entry.get() })
    }

    /// 当前读索引
    pub(crate) fn reader_index(&self) -> usize {
        self.tail.load(Ordering::Acquire)
    }

    /// 当前写索引
    pub(crate) fn writer_index(&self) -> usize {
        self.head.load(Ordering::Acquire)
    }

    /// 未读条目数
    pub(crate) fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.saturating_sub(tail)
    }

    /// 未读条目格式化后的总字节数
    pub(crate) fn unread_bytes(&self) -> usize {
        self.unread_bytes.load(Ordering::Relaxed)
    }

    /// 已丢弃条目数
    pub(crate) fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

// Safety: 槽位访问由 seq/head/tail 原子协议保护。
unsafe impl Sync for GlobalLogBuffer {}
