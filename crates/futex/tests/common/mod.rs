//! Shared harness for futex integration tests: a thread-backed `KernelOps`
//! implementation simulating address spaces, page pinning and the blocking
//! primitive, so the subsystem can be driven end-to-end on the host.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

use futex::{AspaceId, BlockOutcome, FutexError, KernelOps, PageId, WaiterId};
use uapi::mm::{page_align_down, page_offset};

/// Per-page state: pin count and the 4-byte cells stored on the page.
struct Page {
    pins: u64,
    cells: HashMap<u32, u32>,
}

#[derive(Default)]
struct Memory {
    /// (aspace, page-aligned vaddr) → page id
    mappings: HashMap<(AspaceId, usize), PageId>,
    pages: HashMap<PageId, Page>,
    next_page: PageId,
}

/// One blocked-thread slot: a one-permit event with interrupt support.
#[derive(Default)]
struct SlotState {
    permit: bool,
    interrupted: bool,
}

struct WaiterSlot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

/// Host-side machine simulation implementing the kernel boundary.
pub struct MachineSim {
    memory: Mutex<Memory>,
    slots: Mutex<Vec<&'static WaiterSlot>>,
    signals: Mutex<Vec<(i32, u32)>>,
    next_aspace: AtomicU64,
}

thread_local! {
    static CURRENT_WAITER: Cell<Option<WaiterId>> = const { Cell::new(None) };
}

impl MachineSim {
    fn new() -> Self {
        MachineSim {
            memory: Mutex::new(Memory::default()),
            slots: Mutex::new(Vec::new()),
            signals: Mutex::new(Vec::new()),
            next_aspace: AtomicU64::new(1),
        }
    }

    /// Create a fresh address space, isolated from every other test.
    pub fn new_aspace(&self) -> AspaceId {
        self.next_aspace.fetch_add(1, Ordering::SeqCst)
    }

    /// Map a fresh zeroed page covering `vaddr`, returning its id.
    pub fn map_page(&self, aspace: AspaceId, vaddr: usize) -> PageId {
        let mut mem = self.memory.lock().unwrap();
        mem.next_page += 1;
        let page = mem.next_page;
        mem.pages.insert(
            page,
            Page {
                pins: 0,
                cells: HashMap::new(),
            },
        );
        mem.mappings.insert((aspace, page_align_down(vaddr)), page);
        page
    }

    /// Map an existing page into another address space (shared mapping).
    pub fn map_shared(&self, aspace: AspaceId, vaddr: usize, page: PageId) {
        let mut mem = self.memory.lock().unwrap();
        mem.mappings.insert((aspace, page_align_down(vaddr)), page);
    }

    /// Drop the mapping covering `vaddr` (faults afterwards).
    pub fn unmap(&self, aspace: AspaceId, vaddr: usize) {
        let mut mem = self.memory.lock().unwrap();
        mem.mappings.remove(&(aspace, page_align_down(vaddr)));
    }

    /// Copy-on-write: replace the page under `vaddr` with a copy, returning
    /// (old page, new page). The caller is responsible for firing the remap
    /// callback, as the MM layer would.
    pub fn remap_cow(&self, aspace: AspaceId, vaddr: usize) -> (PageId, PageId) {
        let mut mem = self.memory.lock().unwrap();
        let key = (aspace, page_align_down(vaddr));
        let old = mem.mappings[&key];
        let cells = mem.pages[&old].cells.clone();
        mem.next_page += 1;
        let new = mem.next_page;
        mem.pages.insert(new, Page { pins: 0, cells });
        mem.mappings.insert(key, new);
        (old, new)
    }

    /// Store a 4-byte value through a mapping.
    pub fn write_u32(&self, aspace: AspaceId, vaddr: usize, value: u32) {
        let mut mem = self.memory.lock().unwrap();
        let page = mem.mappings[&(aspace, page_align_down(vaddr))];
        let offset = page_offset(vaddr) as u32;
        mem.pages.get_mut(&page).unwrap().cells.insert(offset, value);
    }

    /// Current pin count of a page.
    pub fn pin_count(&self, page: PageId) -> u64 {
        self.memory.lock().unwrap().pages[&page].pins
    }

    /// Sum of all pin counts (the leak detector baseline).
    pub fn total_pins(&self) -> u64 {
        self.memory
            .lock()
            .unwrap()
            .pages
            .values()
            .map(|p| p.pins)
            .sum()
    }

    /// Snapshot of the signals delivered so far (tests assert on their own
    /// unique signum, so the log is shared and never drained).
    pub fn signals(&self) -> Vec<(i32, u32)> {
        self.signals.lock().unwrap().clone()
    }

    /// Post a signal interruption to a blocked waiter.
    pub fn post_interrupt(&self, waiter: WaiterId) {
        let slot = self.slot(waiter);
        let mut state = slot.state.lock().unwrap();
        state.interrupted = true;
        slot.cond.notify_all();
    }

    fn slot(&self, waiter: WaiterId) -> &'static WaiterSlot {
        self.slots.lock().unwrap()[waiter]
    }

    fn resolve(&self, aspace: AspaceId, vaddr: usize) -> Option<PageId> {
        self.memory
            .lock()
            .unwrap()
            .mappings
            .get(&(aspace, page_align_down(vaddr)))
            .copied()
    }
}

impl KernelOps for MachineSim {
    fn pin_page(&self, aspace: AspaceId, uaddr: usize) -> Result<PageId, FutexError> {
        let mut mem = self.memory.lock().unwrap();
        let page = *mem
            .mappings
            .get(&(aspace, page_align_down(uaddr)))
            .ok_or(FutexError::Fault)?;
        mem.pages.get_mut(&page).unwrap().pins += 1;
        Ok(page)
    }

    fn pin_existing(&self, page: PageId) {
        let mut mem = self.memory.lock().unwrap();
        mem.pages.get_mut(&page).unwrap().pins += 1;
    }

    fn unpin_page(&self, page: PageId) {
        let mut mem = self.memory.lock().unwrap();
        let entry = mem.pages.get_mut(&page).unwrap();
        assert!(entry.pins > 0, "unpin without pin");
        entry.pins -= 1;
    }

    fn page_of(&self, aspace: AspaceId, uaddr: usize) -> Option<PageId> {
        self.resolve(aspace, uaddr)
    }

    fn read_user_u32(&self, aspace: AspaceId, uaddr: usize) -> Result<u32, FutexError> {
        let mem = self.memory.lock().unwrap();
        let page = mem
            .mappings
            .get(&(aspace, page_align_down(uaddr)))
            .ok_or(FutexError::Fault)?;
        let offset = page_offset(uaddr) as u32;
        Ok(mem.pages[page].cells.get(&offset).copied().unwrap_or(0))
    }

    fn current_waiter(&self) -> WaiterId {
        CURRENT_WAITER.with(|current| {
            if let Some(id) = current.get() {
                return id;
            }
            let slot: &'static WaiterSlot = Box::leak(Box::new(WaiterSlot {
                state: Mutex::new(SlotState::default()),
                cond: Condvar::new(),
            }));
            let mut slots = self.slots.lock().unwrap();
            let id = slots.len();
            slots.push(slot);
            current.set(Some(id));
            id
        })
    }

    fn current_pid(&self) -> i32 {
        1
    }

    fn block_current(&self, waiter: WaiterId, timeout_ns: Option<u64>) -> BlockOutcome {
        let slot = self.slot(waiter);
        let deadline = timeout_ns.map(|ns| Instant::now() + Duration::from_nanos(ns));
        let mut state = slot.state.lock().unwrap();
        loop {
            if state.permit {
                state.permit = false;
                return BlockOutcome::Woken;
            }
            if state.interrupted {
                state.interrupted = false;
                return BlockOutcome::Interrupted;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return BlockOutcome::TimedOut;
                    }
                    let (guard, _) = slot
                        .cond
                        .wait_timeout(state, deadline - now)
                        .unwrap();
                    state = guard;
                }
                None => {
                    state = slot.cond.wait(state).unwrap();
                }
            }
        }
    }

    fn wake_waiter(&self, waiter: WaiterId) {
        let slot = self.slot(waiter);
        let mut state = slot.state.lock().unwrap();
        state.permit = true;
        slot.cond.notify_all();
    }

    fn deliver_signal(&self, pid: i32, signum: u32) {
        self.signals.lock().unwrap().push((pid, signum));
    }
}

static SIM: OnceLock<&'static MachineSim> = OnceLock::new();

/// The one simulator per test binary, registered as the kernel boundary.
pub fn sim() -> &'static MachineSim {
    *SIM.get_or_init(|| {
        test_support::mock::arch::init();
        let sim: &'static MachineSim = Box::leak(Box::new(MachineSim::new()));
        // SAFETY: registered once, before any futex call in this binary.
        unsafe { futex::register_kernel_ops(sim) };
        sim
    })
}
