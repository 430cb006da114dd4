//! Ticket-style reader/writer spinlock.
//!
//! Two 32-bit atomics, `head` and `tail`, each split into a low 16-bit
//! exclusive counter and a high 16-bit shared counter. A writer takes a
//! ticket by bumping the exclusive half of `tail` and spins until `head`
//! catches up entirely; a reader bumps the shared half and spins only
//! until the exclusive halves match, so readers already in flight finish
//! before a queued writer but readers arriving after it wait behind it.
//!
//! Chosen over a kernel rwlock because the guarded critical sections are
//! tens of nanoseconds; a futex round trip would dominate. Waiters yield
//! to the scheduler between polls rather than burning the core.
//!
//! Not safe against a holder thread dying with the lock held, and unlock
//! is not tied to a guard: `write_lock` in one call frame may be paired
//! with `write_unlock` in another. The fork coordination in
//! ioledger-core depends on exactly that.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

const SHARED_STEP: u32 = 1 << 16;
const EXCLUSIVE_MASK: u32 = SHARED_STEP - 1;
const EXCLUSIVE_STEP: u32 = 1;

pub struct RwSpinLock {
    head: AtomicU32,
    tail: AtomicU32,
}

impl Default for RwSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RwSpinLock {
    pub const fn new() -> Self {
        Self {
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
        }
    }

    /// Acquire exclusive. Blocks readers and writers that arrive later.
    pub fn write_lock(&self) {
        let ticket = self.tail.fetch_add(EXCLUSIVE_STEP, Ordering::Relaxed);
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head == ticket {
                break;
            }
            thread::yield_now();
        }
    }

    pub fn try_write_lock(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        head == tail
            && self
                .tail
                .compare_exchange(
                    tail,
                    tail.wrapping_add(EXCLUSIVE_STEP),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
    }

    pub fn write_unlock(&self) {
        let head = self.head.load(Ordering::Relaxed);
        self.head
            .store(head.wrapping_add(EXCLUSIVE_STEP), Ordering::Release);
    }

    /// Acquire shared. Waits only for writers queued ahead of this ticket.
    pub fn read_lock(&self) {
        let ticket = self.tail.fetch_add(SHARED_STEP, Ordering::Relaxed) & EXCLUSIVE_MASK;
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head & EXCLUSIVE_MASK == ticket {
                break;
            }
            thread::yield_now();
        }
    }

    pub fn try_read_lock(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        (head & EXCLUSIVE_MASK) == (tail & EXCLUSIVE_MASK)
            && self
                .tail
                .compare_exchange(
                    tail,
                    tail.wrapping_add(SHARED_STEP),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
    }

    pub fn read_unlock(&self) {
        self.head.fetch_add(SHARED_STEP, Ordering::Release);
    }

    /// Force the lock back to the released state, discarding any queued
    /// tickets.
    ///
    /// Only sound while the caller is the sole thread that can touch the
    /// lock. Exists for the post-fork child: threads that were *waiting*
    /// on a ticket at fork time do not exist in the child, and their
    /// queued tickets would otherwise never be served, wedging the lock
    /// forever.
    pub fn reset(&self) {
        self.head.store(0, Ordering::Relaxed);
        self.tail.store(0, Ordering::Relaxed);
    }

    /// Run `f` under the shared lock.
    #[inline]
    pub fn with_read<R>(&self, f: impl FnOnce() -> R) -> R {
        self.read_lock();
        let res = f();
        self.read_unlock();
        res
    }

    /// Run `f` under the exclusive lock.
    #[inline]
    pub fn with_write<R>(&self, f: impl FnOnce() -> R) -> R {
        self.write_lock();
        let res = f();
        self.write_unlock();
        res
    }
}
