//! Wait/wake pairing, lost-wakeup races, ordering, timeout and error paths.

mod common;

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use common::sim;
use futex::{FutexError, FutexTable, KernelOps, WaitOutcome, do_futex};
use uapi::errno;
use uapi::futex::{FUTEX_WAIT, FUTEX_WAKE};
use uapi::time::TimeSpec;
use vfs::FDTable;

const ADDR: usize = 0x4000_1000;

/// Spin until `n` entries are queued (bounded, so a bug fails instead of hanging).
fn wait_until_queued(table: &FutexTable, n: usize) {
    let start = Instant::now();
    while table.queued_count() < n {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "waiter never reached the queue"
        );
        thread::yield_now();
    }
}

#[test]
fn test_wake_with_no_waiters() {
    let s = sim();
    let aspace = s.new_aspace();
    s.map_page(aspace, ADDR);
    let table = Arc::new(FutexTable::new());

    assert_eq!(table.wake(aspace, ADDR, 1).unwrap(), 0);
}

#[test]
fn test_wait_returns_would_block_on_changed_value() {
    let s = sim();
    let aspace = s.new_aspace();
    let page = s.map_page(aspace, ADDR);
    s.write_u32(aspace, ADDR, 5);
    let table = Arc::new(FutexTable::new());

    // The value no longer matches: no blocking, no queued entry, no leak.
    let outcome = table.wait(aspace, ADDR, 4, None).unwrap();
    assert_eq!(outcome, WaitOutcome::WouldBlock);
    assert_eq!(table.queued_count(), 0);
    assert_eq!(s.pin_count(page), 0);
}

#[test]
fn test_wait_then_wake() {
    let s = sim();
    let aspace = s.new_aspace();
    let page = s.map_page(aspace, ADDR);
    s.write_u32(aspace, ADDR, 7);
    let table = Arc::new(FutexTable::new());

    let waiter = {
        let table = table.clone();
        thread::spawn(move || table.wait(aspace, ADDR, 7, None))
    };
    wait_until_queued(&table, 1);

    s.write_u32(aspace, ADDR, 8);
    assert_eq!(table.wake(aspace, ADDR, 1).unwrap(), 1);

    assert_eq!(waiter.join().unwrap().unwrap(), WaitOutcome::Woken);
    assert_eq!(table.queued_count(), 0);
    assert_eq!(s.pin_count(page), 0);
}

#[test]
fn test_cross_aspace_wake_via_shared_page() {
    let s = sim();
    let aspace_a = s.new_aspace();
    let aspace_b = s.new_aspace();
    let addr_a = 0x1000_0000;
    let addr_b = 0x7fff_0000;

    // Two "processes" map the same physical page at different addresses.
    let page = s.map_page(aspace_a, addr_a);
    s.map_shared(aspace_b, addr_b, page);
    s.write_u32(aspace_a, addr_a, 1);

    let table = Arc::new(FutexTable::new());
    let waiter = {
        let table = table.clone();
        thread::spawn(move || table.wait(aspace_a, addr_a, 1, None))
    };
    wait_until_queued(&table, 1);

    // The wake goes through the other mapping; the key is the page identity.
    assert_eq!(table.wake(aspace_b, addr_b, 1).unwrap(), 1);
    assert_eq!(waiter.join().unwrap().unwrap(), WaitOutcome::Woken);
    assert_eq!(s.pin_count(page), 0);
}

#[test]
fn test_no_lost_wakeup_under_race() {
    let s = sim();
    let aspace = s.new_aspace();
    let page = s.map_page(aspace, ADDR);
    let table = Arc::new(FutexTable::new());

    for trial in 0..60 {
        s.write_u32(aspace, ADDR, 0);
        let waiter = {
            let table = table.clone();
            thread::spawn(move || table.wait(aspace, ADDR, 0, Some(5_000_000_000)))
        };
        if trial % 3 == 0 {
            thread::yield_now();
        }

        s.write_u32(aspace, ADDR, 1);
        table.wake(aspace, ADDR, 1).unwrap();

        // The waiter is never left blocked forever.
        let outcome = waiter.join().unwrap().unwrap();
        assert!(
            matches!(outcome, WaitOutcome::Woken | WaitOutcome::WouldBlock),
            "trial {}: unexpected outcome {:?}",
            trial,
            outcome
        );
        assert_eq!(table.queued_count(), 0);
        assert_eq!(s.pin_count(page), 0);
    }
}

#[test]
fn test_wake_is_fifo_and_respects_count() {
    let s = sim();
    let aspace = s.new_aspace();
    s.map_page(aspace, ADDR);
    s.write_u32(aspace, ADDR, 3);
    let table = Arc::new(FutexTable::new());
    let (tx, rx) = mpsc::channel();

    let mut handles = Vec::new();
    for tag in 0..2 {
        let waiter_table = table.clone();
        let tx = tx.clone();
        handles.push(thread::spawn(move || {
            let outcome = waiter_table.wait(aspace, ADDR, 3, None).unwrap();
            tx.send(tag).unwrap();
            outcome
        }));
        wait_until_queued(&table, tag + 1);
    }

    // Wake one: the oldest waiter (tag 0) goes first.
    assert_eq!(table.wake(aspace, ADDR, 1).unwrap(), 1);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
    assert_eq!(table.queued_count(), 1);

    assert_eq!(table.wake(aspace, ADDR, 1).unwrap(), 1);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

    for handle in handles {
        assert_eq!(handle.join().unwrap(), WaitOutcome::Woken);
    }
}

#[test]
fn test_wait_timeout() {
    let s = sim();
    let aspace = s.new_aspace();
    let page = s.map_page(aspace, ADDR);
    s.write_u32(aspace, ADDR, 42);
    let table = Arc::new(FutexTable::new());

    // No writer, no waker: a 100ms wait expires close to 100ms.
    let start = Instant::now();
    let outcome = table.wait(aspace, ADDR, 42, Some(100_000_000)).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert!(elapsed >= Duration::from_millis(95), "woke early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "woke far too late: {:?}", elapsed);
    assert_eq!(table.queued_count(), 0);
    assert_eq!(s.pin_count(page), 0);
}

#[test]
fn test_wait_interrupted_by_signal() {
    let s = sim();
    let aspace = s.new_aspace();
    let page = s.map_page(aspace, ADDR);
    s.write_u32(aspace, ADDR, 9);
    let table = Arc::new(FutexTable::new());
    let (tx, rx) = mpsc::channel();

    let waiter = {
        let table = table.clone();
        thread::spawn(move || {
            tx.send(KernelOps::current_waiter(sim())).unwrap();
            table.wait(aspace, ADDR, 9, None)
        })
    };
    let waiter_id = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    wait_until_queued(&table, 1);

    s.post_interrupt(waiter_id);

    // Interruption is reported distinctly from wake and timeout.
    assert_eq!(waiter.join().unwrap().unwrap(), WaitOutcome::Interrupted);
    assert_eq!(table.queued_count(), 0);
    assert_eq!(s.pin_count(page), 0);
}

#[test]
fn test_unaligned_address_is_invalid() {
    let s = sim();
    let aspace = s.new_aspace();
    s.map_page(aspace, ADDR);
    let table = Arc::new(FutexTable::new());

    assert_eq!(
        table.wait(aspace, ADDR + 2, 0, None).unwrap_err(),
        FutexError::InvalidArgument
    );
    assert_eq!(
        table.wake(aspace, ADDR + 1, 1).unwrap_err(),
        FutexError::InvalidArgument
    );
}

#[test]
fn test_unmapped_address_faults() {
    let s = sim();
    let aspace = s.new_aspace();
    let table = Arc::new(FutexTable::new());

    assert_eq!(
        table.wait(aspace, ADDR, 0, None).unwrap_err(),
        FutexError::Fault
    );
    assert_eq!(table.wake(aspace, ADDR, 1).unwrap_err(), FutexError::Fault);
    assert_eq!(table.queued_count(), 0);
}

#[test]
fn test_do_futex_dispatch() {
    let s = sim();
    let aspace = s.new_aspace();
    s.map_page(aspace, ADDR);
    s.write_u32(aspace, ADDR, 5);
    let table = Arc::new(FutexTable::new());
    let fd_table = FDTable::new();

    // Unrecognized op code.
    assert_eq!(
        do_futex(&table, &fd_table, aspace, ADDR, 99, 0, None),
        -errno::EINVAL
    );

    // Malformed timeout.
    let bad = TimeSpec::new(0, 2_000_000_000);
    assert_eq!(
        do_futex(&table, &fd_table, aspace, ADDR, FUTEX_WAIT, 5, Some(&bad)),
        -errno::EINVAL
    );

    // Value mismatch surfaces as would-block.
    assert_eq!(
        do_futex(&table, &fd_table, aspace, ADDR, FUTEX_WAIT, 6, None),
        -errno::EWOULDBLOCK
    );

    // Wake with nobody queued.
    assert_eq!(
        do_futex(&table, &fd_table, aspace, ADDR, FUTEX_WAKE, 1, None),
        0
    );
}
