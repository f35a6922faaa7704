use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use eni_ipam::lock::{ExclusiveScope, FileLock, MemoryLock};

/// Run `threads` holders through `scope` and return the most that were ever
/// inside at once.
fn max_concurrency<S: ExclusiveScope + Sync>(scope: &S, threads: usize) -> usize {
    let inside = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                scope
                    .with_exclusive(|| {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                    .expect("lock acquired");
            });
        }
    });

    peak.load(Ordering::SeqCst)
}

#[test]
fn test_memory_lock_is_exclusive() {
    assert_eq!(max_concurrency(&MemoryLock::new(), 4), 1);
}

#[test]
fn test_file_lock_is_exclusive() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("eni-ipam.lock");

    // separate FileLock values share nothing but the path, like separate processes
    let locks: Vec<FileLock> = (0..4).map(|_| FileLock::new(&path)).collect();
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    thread::scope(|s| {
        for lock in &locks {
            let inside = Arc::clone(&inside);
            let peak = Arc::clone(&peak);
            s.spawn(move || {
                lock.with_exclusive(|| {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
                .expect("lock acquired");
            });
        }
    });

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(path.exists());
    Ok(())
}

#[test]
fn test_file_lock_released_after_scope() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let lock = FileLock::new(dir.path().join("eni-ipam.lock"));

    assert_eq!(lock.with_exclusive(|| 1)?, 1);
    // would block forever if the first scope had kept the lock
    assert_eq!(lock.with_exclusive(|| 2)?, 2);
    Ok(())
}

#[test]
fn test_memory_lock_survives_panicking_holder() {
    let lock = MemoryLock::new();

    let panicked = thread::scope(|s| {
        s.spawn(|| {
            let _ = lock.with_exclusive(|| panic!("holder failed"));
        })
        .join()
        .is_err()
    });

    assert!(panicked);
    assert_eq!(lock.with_exclusive(|| "free").unwrap(), "free");
}

#[test]
fn test_missing_lock_directory_is_an_error() {
    let lock = FileLock::new("/nonexistent-eni-ipam-dir/eni-ipam.lock");
    assert!(lock.with_exclusive(|| ()).is_err());
}
