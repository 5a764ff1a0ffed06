//! Integration tests for the fd table.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use uapi::fcntl::FdFlags;
use vfs::{FDTable, File, FsError};

/// Minimal file object counting live instances, to observe fd-table drops.
struct DummyFile {
    live: Arc<AtomicUsize>,
}

impl DummyFile {
    fn new(live: &Arc<AtomicUsize>) -> Arc<Self> {
        live.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self { live: live.clone() })
    }
}

impl Drop for DummyFile {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl File for DummyFile {
    fn readable(&self) -> bool {
        true
    }

    fn writable(&self) -> bool {
        false
    }

    fn read(&self, _buf: &mut [u8]) -> Result<usize, FsError> {
        Ok(0)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotSupported)
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

fn init() {
    test_support::mock::arch::init();
}

#[test]
fn test_alloc_smallest_fd() {
    init();
    let live = Arc::new(AtomicUsize::new(0));
    let table = FDTable::new();

    assert_eq!(table.alloc(DummyFile::new(&live)).unwrap(), 0);
    assert_eq!(table.alloc(DummyFile::new(&live)).unwrap(), 1);
    assert_eq!(table.alloc(DummyFile::new(&live)).unwrap(), 2);

    table.close(1).unwrap();
    assert_eq!(table.alloc(DummyFile::new(&live)).unwrap(), 1);
}

#[test]
fn test_get_and_close() {
    init();
    let live = Arc::new(AtomicUsize::new(0));
    let table = FDTable::new();

    let fd = table.alloc(DummyFile::new(&live)).unwrap();
    assert!(table.get(fd).is_ok());

    table.close(fd).unwrap();
    assert_eq!(table.get(fd).unwrap_err(), FsError::BadFileDescriptor);
    assert_eq!(table.close(fd).unwrap_err(), FsError::BadFileDescriptor);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn test_fd_limit() {
    init();
    let live = Arc::new(AtomicUsize::new(0));
    let table = FDTable::with_capacity(2);

    table.alloc(DummyFile::new(&live)).unwrap();
    table.alloc(DummyFile::new(&live)).unwrap();
    assert_eq!(
        table.alloc(DummyFile::new(&live)).unwrap_err(),
        FsError::TooManyOpenFiles
    );
}

#[test]
fn test_take_all_for_process_exit() {
    init();
    let live = Arc::new(AtomicUsize::new(0));
    let table = FDTable::new();

    table.alloc(DummyFile::new(&live)).unwrap();
    table.alloc(DummyFile::new(&live)).unwrap();
    let fd2 = table.alloc(DummyFile::new(&live)).unwrap();
    table.close(1).unwrap();

    let taken = table.take_all();
    assert_eq!(taken.len(), 2);
    assert_eq!(taken[0].0, 0);
    assert_eq!(taken[1].0, fd2);

    // Dropping the taken references releases every file.
    drop(taken);
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert!(table.get(0).is_err());
}

#[test]
fn test_fd_flags() {
    init();
    let live = Arc::new(AtomicUsize::new(0));
    let table = FDTable::new();

    let fd = table
        .alloc_with_flags(DummyFile::new(&live), FdFlags::CLOEXEC)
        .unwrap();
    assert_eq!(table.get_fd_flags(fd).unwrap(), FdFlags::CLOEXEC);

    table.set_fd_flags(fd, FdFlags::empty()).unwrap();
    assert_eq!(table.get_fd_flags(fd).unwrap(), FdFlags::empty());

    table.close(fd).unwrap();
    assert!(table.get_fd_flags(fd).is_err());
}
