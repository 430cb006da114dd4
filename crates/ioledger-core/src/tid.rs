//! Kernel thread id, cached per thread.
//!
//! `record_rw` needs the tid on every event; the cache turns a syscall
//! into a TLS load after the first call. The cell is const-initialized so
//! the first access from a given thread performs no lazy allocation.
//!
//! The cache survives `fork()`: a child's main thread keeps reporting the
//! parent's tid until it spawns fresh threads. Acceptable, since the
//! child's pre-fork aggregates were attributed under that tid anyway.

use std::cell::Cell;

pub(crate) fn current_tid() -> u64 {
    thread_local! {
        static CACHED: Cell<u64> = const { Cell::new(0) };
    }
    CACHED.with(|slot| {
        let tid = slot.get();
        if tid != 0 {
            return tid;
        }
        let tid = os_tid();
        slot.set(tid);
        tid
    })
}

#[cfg(target_os = "linux")]
fn os_tid() -> u64 {
    unsafe { libc::syscall(libc::SYS_gettid) as u64 }
}

#[cfg(target_os = "macos")]
fn os_tid() -> u64 {
    let mut tid: u64 = 0;
    unsafe { libc::pthread_threadid_np(libc::pthread_self(), &mut tid) };
    tid
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn os_tid() -> u64 {
    // No kernel tid available; hand out process-unique ids instead.
    static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);
    NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_stable_within_thread() {
        assert_eq!(current_tid(), current_tid());
        assert_ne!(current_tid(), 0);
    }

    #[test]
    fn test_distinct_across_live_threads() {
        // Both threads sample while alive simultaneously, so the kernel
        // cannot have recycled either id.
        let barrier = Arc::new(Barrier::new(2));
        let b1 = barrier.clone();
        let b2 = barrier.clone();

        let t1 = thread::spawn(move || {
            let tid = current_tid();
            b1.wait();
            tid
        });
        let t2 = thread::spawn(move || {
            let tid = current_tid();
            b2.wait();
            tid
        });

        assert_ne!(t1.join().unwrap(), t2.join().unwrap());
    }
}
