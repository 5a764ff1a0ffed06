//! 等待队列核心
//!
//! [`FutexTable`] 维护固定数量的哈希桶，每个桶是一条按入队顺序排列
//! 的等待者链表（唤醒按 FIFO 进行）。所有入队/出队/扫描都在桶自旋锁
//! 下完成，睡眠前必然放锁。
//!
//! ## 键的再校验
//!
//! 键是被钉住页的物理标识。钉页和入队之间映射可能被换出或写时复制
//! 顶替，因此入队必须在桶锁下重读映射并与刚钉住的页比对，不一致则
//! 整个查找重来（有限次）。入队之后映射再变动由重映射回调
//! [`FutexTable::page_remapped`] 处理：条目被**搬运**到新页对应的桶，
//! 不唤醒、不丢失。
//!
//! ## 锁序
//!
//! - 桶锁 → 条目 pin 锁 / 重映射注册表锁，不存在反向获取；
//! - 重映射回调先拷贝注册表再放开注册表锁，之后按桶下标顺序加双桶锁。

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use hashbrown::HashMap;
use klog::{pr_debug, pr_warn};
use sync::{SpinLock, SpinLockGuard};

use crate::error::FutexError;
use crate::key::{FUTEX_BUCKET_COUNT, FutexKey, futex_offset};
use crate::ops::{AspaceId, BlockOutcome, PageId, WaiterId, kernel_ops};
use crate::page::PagePin;

/// Wait 操作的正常结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// 被 Wake 唤醒
    Woken,
    /// 入队后重读发现值已不等于期望值，未阻塞
    WouldBlock,
    /// 超时到期
    TimedOut,
    /// 被信号打断
    Interrupted,
}

/// 条目仍在某个桶里排队
const Q_QUEUED: u8 = 0;
/// 条目已被唤醒方取走
const Q_WOKEN: u8 = 1;

/// FUTEX_FD 条目的异步通知信息
pub(crate) struct FdNotify {
    /// 唤醒时投递的信号编号（0 表示不投递）
    pub signum: u32,
    /// 异步通知属主进程（F_SETOWN 语义）
    pub owner: SpinLock<Option<i32>>,
}

/// 一个排队的等待者
///
/// WAIT 路径由阻塞线程持有；FD 路径由文件对象持有。条目同一时刻至多
/// 出现在一个桶的链表中，排队期间始终持有对当前键页的引用。
pub struct FutexQ {
    /// 所属地址空间
    pub(crate) aspace: AspaceId,
    /// 监视的用户虚拟地址
    pub(crate) uaddr: usize,
    /// 页内偏移（重映射不改变）
    pub(crate) offset: u32,
    /// 当前键页（重映射回调更新）
    page: AtomicU64,
    /// 排队期间持有的页引用
    pin: SpinLock<Option<PagePin>>,
    /// Q_QUEUED / Q_WOKEN
    state: AtomicU8,
    /// WAIT 路径的阻塞句柄
    waiter: Option<WaiterId>,
    /// FD 路径的通知信息
    pub(crate) notify: Option<FdNotify>,
}

impl FutexQ {
    fn new(aspace: AspaceId, uaddr: usize, offset: u32, waiter: Option<WaiterId>, notify: Option<FdNotify>) -> Self {
        FutexQ {
            aspace,
            uaddr,
            offset,
            page: AtomicU64::new(0),
            pin: SpinLock::new(None),
            state: AtomicU8::new(Q_QUEUED),
            waiter,
            notify,
        }
    }

    /// 条目是否已被唤醒方取走
    pub(crate) fn is_woken(&self) -> bool {
        self.state.load(Ordering::Acquire) == Q_WOKEN
    }

    /// 条目当前的键
    fn key(&self) -> FutexKey {
        FutexKey {
            page: self.page.load(Ordering::Acquire),
            offset: self.offset,
        }
    }
}

type Bucket = Vec<Arc<FutexQ>>;

/// futex 哈希表：桶数组 + 重映射回调注册表
///
/// 进程范围内是一个启动时建立、从不销毁的单例（见
/// [`crate::FUTEX_TABLE`]）；测试可以构造隔离实例。
pub struct FutexTable {
    buckets: [SpinLock<Bucket>; FUTEX_BUCKET_COUNT],
    /// (地址空间, 虚拟地址) → 已注册的排队条目
    vcache: SpinLock<HashMap<(AspaceId, usize), Vec<Weak<FutexQ>>>>,
}

impl FutexTable {
    /// 创建一张空表
    pub fn new() -> Self {
        FutexTable {
            buckets: core::array::from_fn(|_| SpinLock::new(Vec::new())),
            vcache: SpinLock::new(HashMap::new()),
        }
    }

    /// FUTEX_WAIT：若 `*uaddr == expected` 则阻塞，直到被唤醒、
    /// 超时或被信号打断
    pub fn wait(
        &self,
        aspace: AspaceId,
        uaddr: usize,
        expected: u32,
        timeout_ns: Option<u64>,
    ) -> Result<WaitOutcome, FutexError> {
        let offset = futex_offset(uaddr)?;
        let ops = kernel_ops();
        let waiter = ops.current_waiter();

        let q = Arc::new(FutexQ::new(aspace, uaddr, offset, Some(waiter), None));
        self.pin_and_enqueue(&q)?;

        // 入队之后重读用户值：关闭"唤醒发生在初次读值与入队之间"的窗口
        let current = match ops.read_user_u32(aspace, uaddr) {
            Ok(value) => value,
            Err(e) => {
                self.unqueue(&q);
                return Err(e);
            }
        };
        if current != expected {
            self.unqueue(&q);
            return Ok(WaitOutcome::WouldBlock);
        }

        let outcome = loop {
            match ops.block_current(waiter, timeout_ns) {
                BlockOutcome::Woken if !q.is_woken() => {
                    // 陈旧的唤醒许可（上一轮等待的迟到 wake）：重新阻塞
                    continue;
                }
                outcome => break outcome,
            }
        };

        // 桶锁仲裁唤醒与超时/信号的竞争：条目已被取走即算唤醒成功
        if !self.unqueue(&q) {
            return Ok(WaitOutcome::Woken);
        }
        match outcome {
            BlockOutcome::Woken => Ok(WaitOutcome::Woken),
            BlockOutcome::TimedOut => Ok(WaitOutcome::TimedOut),
            BlockOutcome::Interrupted => Ok(WaitOutcome::Interrupted),
        }
    }

    /// FUTEX_WAKE：唤醒至多 `max_count` 个键匹配的等待者，返回唤醒数
    pub fn wake(
        &self,
        aspace: AspaceId,
        uaddr: usize,
        max_count: usize,
    ) -> Result<usize, FutexError> {
        let offset = futex_offset(uaddr)?;
        let pin = PagePin::pin(aspace, uaddr)?;
        let key = FutexKey {
            page: pin.page(),
            offset,
        };

        // 桶锁下按 FIFO 摘取匹配条目；唤醒动作放到锁外
        let mut claimed: Vec<(Arc<FutexQ>, Option<PagePin>)> = Vec::new();
        {
            let mut bucket = self.buckets[key.bucket_index()].lock();
            let mut i = 0;
            while i < bucket.len() && claimed.len() < max_count {
                if bucket[i].key() == key {
                    let q = bucket.remove(i);
                    q.state.store(Q_WOKEN, Ordering::Release);
                    let entry_pin = q.pin.lock().take();
                    claimed.push((q, entry_pin));
                } else {
                    i += 1;
                }
            }
        }

        let woken = claimed.len();
        for (q, entry_pin) in claimed {
            self.vcache_unregister(&q);
            if let Some(w) = q.waiter {
                kernel_ops().wake_waiter(w);
            }
            if let Some(ref notify) = q.notify {
                if notify.signum != 0 {
                    if let Some(owner) = *notify.owner.lock() {
                        kernel_ops().deliver_signal(owner, notify.signum);
                    }
                }
            }
            drop(entry_pin);
        }

        if woken > 0 {
            pr_debug!("futex: woke {} waiter(s) at {:#x}", woken, uaddr);
        }
        Ok(woken)
    }

    /// 重映射回调（vcache）：`uaddr` 背后的物理页变为 `new_page`
    ///
    /// 把所有仍在排队的注册条目搬到新页对应的桶：取新页引用、释放旧页
    /// 引用、更新键页。条目既不被唤醒也不丢失。
    pub fn page_remapped(&self, aspace: AspaceId, uaddr: usize, new_page: PageId) {
        let entries: Vec<Arc<FutexQ>> = {
            let vcache = self.vcache.lock();
            match vcache.get(&(aspace, uaddr)) {
                Some(list) => list.iter().filter_map(Weak::upgrade).collect(),
                None => return,
            }
        };

        for q in entries {
            self.relocate(&q, new_page);
        }
    }

    /// 把单个条目搬到 `new_page` 对应的桶
    fn relocate(&self, q: &Arc<FutexQ>, new_page: PageId) {
        loop {
            let old_page = q.page.load(Ordering::Acquire);
            if old_page == new_page {
                return;
            }
            let old_idx = FutexKey {
                page: old_page,
                offset: q.offset,
            }
            .bucket_index();
            let new_idx = FutexKey {
                page: new_page,
                offset: q.offset,
            }
            .bucket_index();

            if old_idx == new_idx {
                let bucket = self.buckets[old_idx].lock();
                if q.page.load(Ordering::Acquire) != old_page {
                    continue;
                }
                let old_pin = if bucket.iter().any(|e| Arc::ptr_eq(e, q)) {
                    let new_pin = PagePin::pin_existing(new_page);
                    let old_pin = q.pin.lock().replace(new_pin);
                    q.page.store(new_page, Ordering::Release);
                    old_pin
                } else {
                    None
                };
                drop(bucket);
                drop(old_pin);
                return;
            }

            // 双桶搬运：按下标顺序加锁避免交叉死锁
            let (mut b_old, mut b_new) = self.lock_pair(old_idx, new_idx);
            if q.page.load(Ordering::Acquire) != old_page {
                continue;
            }
            let mut old_pin = None;
            if let Some(pos) = b_old.iter().position(|e| Arc::ptr_eq(e, q)) {
                let entry = b_old.remove(pos);
                let new_pin = PagePin::pin_existing(new_page);
                old_pin = entry.pin.lock().replace(new_pin);
                entry.page.store(new_page, Ordering::Release);
                b_new.push(entry);
            }
            drop(b_old);
            drop(b_new);
            drop(old_pin);
            return;
        }
    }

    /// 钉页 → 桶锁下校验映射 → 入队并注册重映射回调
    ///
    /// 钉页和取桶锁之间映射被顶替时，放掉一切重来一次；连续两次
    /// 失败返回 [`FutexError::Again`]。
    pub(crate) fn pin_and_enqueue(&self, q: &Arc<FutexQ>) -> Result<(), FutexError> {
        for _ in 0..2 {
            let pin = PagePin::pin(q.aspace, q.uaddr)?;
            let key = FutexKey {
                page: pin.page(),
                offset: q.offset,
            };

            let mut bucket = self.buckets[key.bucket_index()].lock();

            // 先入队并注册回调，再校验映射。顺序是关键：校验通过即说明
            // 映射变动发生在校验之后，而那时的回调快照必然已看到本条目。
            q.page.store(pin.page(), Ordering::Release);
            *q.pin.lock() = Some(pin);
            q.state.store(Q_QUEUED, Ordering::Release);
            bucket.push(q.clone());
            self.vcache
                .lock()
                .entry((q.aspace, q.uaddr))
                .or_default()
                .push(Arc::downgrade(q));

            if kernel_ops().page_of(q.aspace, q.uaddr) == Some(key.page) {
                return Ok(());
            }

            // 钉住的页已不是当前映射：撤销入队与注册，整个查找重来
            if let Some(pos) = bucket.iter().position(|e| Arc::ptr_eq(e, q)) {
                bucket.remove(pos);
            }
            let stale_pin = q.pin.lock().take();
            drop(bucket);
            self.vcache_unregister(q);
            drop(stale_pin);
        }

        pr_warn!(
            "futex: mapping at {:#x} kept changing under pin, giving up",
            q.uaddr
        );
        Err(FutexError::Again)
    }

    /// 把条目摘出其所在桶，释放页引用并注销重映射回调
    ///
    /// 返回条目此前是否仍在排队。与并发 Wake 争抢同一条目时，先拿到
    /// 桶锁的一方完成出队，另一方看到条目已不在链表中则不再动它。
    pub(crate) fn unqueue(&self, q: &Arc<FutexQ>) -> bool {
        let removed_pin;
        let removed;
        loop {
            let page = q.page.load(Ordering::Acquire);
            let idx = FutexKey {
                page,
                offset: q.offset,
            }
            .bucket_index();
            let mut bucket = self.buckets[idx].lock();
            // 重映射可能在取锁前把条目搬去了别的桶
            if q.page.load(Ordering::Acquire) != page {
                continue;
            }
            match bucket.iter().position(|e| Arc::ptr_eq(e, q)) {
                Some(pos) => {
                    bucket.remove(pos);
                    removed_pin = q.pin.lock().take();
                    removed = true;
                }
                None => {
                    removed_pin = None;
                    removed = false;
                }
            }
            break;
        }

        if removed {
            self.vcache_unregister(q);
        }
        drop(removed_pin);
        removed
    }

    /// 条目数（仅用于调试/测试）
    #[doc(hidden)]
    pub fn queued_count(&self) -> usize {
        self.buckets.iter().map(|b| b.lock().len()).sum()
    }

    // ========== 内部辅助函数 ==========

    /// 按下标顺序锁住两个不同的桶，按 (old, new) 顺序返回
    fn lock_pair(
        &self,
        old_idx: usize,
        new_idx: usize,
    ) -> (SpinLockGuard<'_, Bucket>, SpinLockGuard<'_, Bucket>) {
        if old_idx < new_idx {
            let a = self.buckets[old_idx].lock();
            let b = self.buckets[new_idx].lock();
            (a, b)
        } else {
            let b = self.buckets[new_idx].lock();
            let a = self.buckets[old_idx].lock();
            (a, b)
        }
    }

    /// 注销条目的重映射回调注册
    fn vcache_unregister(&self, q: &Arc<FutexQ>) {
        let mut vcache = self.vcache.lock();
        if let Some(list) = vcache.get_mut(&(q.aspace, q.uaddr)) {
            list.retain(|w| w.upgrade().is_some_and(|e| !Arc::ptr_eq(&e, q)));
            if list.is_empty() {
                vcache.remove(&(q.aspace, q.uaddr));
            }
        }
    }
}

impl Default for FutexTable {
    fn default() -> Self {
        Self::new()
    }
}

// 供 fd 模块构造 FD 路径的条目
impl FutexQ {
    pub(crate) fn new_fd_entry(aspace: AspaceId, uaddr: usize, offset: u32, notify: FdNotify) -> Self {
        Self::new(aspace, uaddr, offset, None, Some(notify))
    }
}
