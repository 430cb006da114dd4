//! Double-buffer accumulator.
//!
//! Two sharded maps with an atomic selector: writers always fold into the
//! active side, and a rotation retires the active side for reading while
//! ingestion continues into the other. Over a snapshot interval the
//! writers contend only on bucket locks; the consumer touches the maps
//! once per rotation.
//!
//! The selector discipline uses a single ticket rwlock: every `write`
//! holds it shared across the selector load and the bucket upsert, and
//! `rotate` holds it exclusive across the flip. A writer therefore can
//! never load side A, get preempted, and complete its upsert after A has
//! been retired; the flip waits for the shared holders to drain. The
//! lock does not protect bucket contents; those stay per-bucket-locked
//! inside [`ShardMap`].

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ioledger_sync::{Merge, RwSpinLock, ShardMap};

pub struct DoubleBuffer<K, V> {
    sides: [ShardMap<K, V>; 2],
    /// Index of the side receiving writes. Only mutated under the
    /// exclusive gate; the gate's acquire/release pairs publish it, so
    /// plain relaxed accesses suffice.
    active: AtomicUsize,
    /// Events folded in since the last rotation. A shedding hint, not an
    /// exact element count.
    approx_len: AtomicU64,
    gate: RwSpinLock,
}

impl<K: Hash + Eq, V: Merge> Default for DoubleBuffer<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V: Merge> DoubleBuffer<K, V> {
    pub fn new() -> Self {
        Self {
            sides: [ShardMap::new(), ShardMap::new()],
            active: AtomicUsize::new(0),
            approx_len: AtomicU64::new(0),
            gate: RwSpinLock::new(),
        }
    }

    /// Fold `value` into the active side under `key`.
    pub fn write(&self, key: K, value: V) {
        self.gate.read_lock();
        let side = &self.sides[self.active.load(Ordering::Relaxed)];
        side.upsert_merge(key, value);
        self.approx_len.fetch_add(1, Ordering::Relaxed);
        self.gate.read_unlock();
    }

    /// Retire the active side and return it for iteration.
    ///
    /// The idle side is cleared first (no writer targets it, so that
    /// needs no coordination), then the selector flips under the
    /// exclusive gate. Once `rotate` returns, the retired side is
    /// quiescent: in-flight writers that targeted it completed before the
    /// flip, and new writers see the new selector.
    ///
    /// One consumer at a time; a second rotation invalidates the side
    /// returned by the first.
    pub fn rotate(&self) -> &ShardMap<K, V> {
        let idle = 1 - self.active.load(Ordering::Relaxed);
        self.sides[idle].clear();

        self.gate.write_lock();
        let retired = self.active.swap(idle, Ordering::Relaxed);
        self.approx_len.store(0, Ordering::Relaxed);
        self.gate.write_unlock();

        &self.sides[retired]
    }

    /// Approximate number of events folded in since the last rotation.
    pub fn approx_len(&self) -> u64 {
        self.approx_len.load(Ordering::Relaxed)
    }

    /// Freeze for `fork()`: exclusive gate first (drains in-flight
    /// writers), then every bucket of both sides.
    pub fn freeze(&self) {
        self.gate.write_lock();
        self.sides[0].lock_all();
        self.sides[1].lock_all();
    }

    /// Release everything [`DoubleBuffer::freeze`] took, in reverse order.
    pub fn thaw(&self) {
        self.sides[1].unlock_all();
        self.sides[0].unlock_all();
        self.gate.write_unlock();
    }

    /// Force every lock back to the released state. Post-fork child
    /// only: parent threads that were queued on a ticket at fork time do
    /// not exist in the child, and a plain unlock would hand the lock to
    /// one of those ghosts. See [`RwSpinLock::reset`].
    pub fn reset_locks(&self) {
        self.sides[0].reset_locks();
        self.sides[1].reset_locks();
        self.gate.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Bytes(u64);

    impl Merge for Bytes {
        fn merge(&mut self, other: Self) {
            self.0 += other.0;
        }
    }

    fn drain(side: &ShardMap<u64, Bytes>) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        side.for_each(|k, v| out.push((*k, v.0)));
        out
    }

    #[test]
    fn test_rotate_hands_over_written_entries() {
        let buf: DoubleBuffer<u64, Bytes> = DoubleBuffer::new();
        buf.write(1, Bytes(10));
        buf.write(1, Bytes(5));
        buf.write(2, Bytes(7));
        assert_eq!(buf.approx_len(), 3);

        let mut entries = drain(buf.rotate());
        entries.sort_unstable();
        assert_eq!(entries, vec![(1, 15), (2, 7)]);
        assert_eq!(buf.approx_len(), 0);
    }

    #[test]
    fn test_back_to_back_rotations_yield_empty() {
        let buf: DoubleBuffer<u64, Bytes> = DoubleBuffer::new();
        buf.write(1, Bytes(1));
        assert_eq!(drain(buf.rotate()).len(), 1);
        assert_eq!(drain(buf.rotate()).len(), 0);
        assert_eq!(drain(buf.rotate()).len(), 0);
    }

    #[test]
    fn test_writes_after_rotation_land_in_new_side() {
        let buf: DoubleBuffer<u64, Bytes> = DoubleBuffer::new();
        buf.write(1, Bytes(100));
        let _ = buf.rotate();

        buf.write(1, Bytes(50));
        let entries = drain(buf.rotate());
        assert_eq!(entries, vec![(1, 50)]);
    }

    #[test]
    fn test_rotation_under_load_conserves_every_event() {
        const WRITERS: usize = 4;
        const EVENTS: u64 = 50_000;

        let buf: Arc<DoubleBuffer<u64, Bytes>> = Arc::new(DoubleBuffer::new());
        let barrier = Arc::new(Barrier::new(WRITERS + 1));
        let done = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for t in 0..WRITERS {
            let b = buf.clone();
            let bar = barrier.clone();
            handles.push(thread::spawn(move || {
                bar.wait();
                for _ in 0..EVENTS {
                    b.write(t as u64, Bytes(1));
                }
            }));
        }

        // Consumer rotates continuously while writers run; every event
        // must surface in exactly one rotation.
        let consumer = {
            let b = buf.clone();
            let bar = barrier.clone();
            let d = done.clone();
            thread::spawn(move || {
                bar.wait();
                let mut total = 0u64;
                while !d.load(Ordering::Acquire) {
                    for (_, n) in drain(b.rotate()) {
                        total += n;
                    }
                }
                // Final sweep for events recorded after the last rotation.
                for (_, n) in drain(b.rotate()) {
                    total += n;
                }
                total
            })
        };

        for h in handles {
            h.join().unwrap();
        }
        done.store(true, Ordering::Release);

        let total = consumer.join().unwrap();
        assert_eq!(total, WRITERS as u64 * EVENTS);
    }

    #[test]
    fn test_freeze_thaw_roundtrip() {
        let buf: DoubleBuffer<u64, Bytes> = DoubleBuffer::new();
        buf.write(1, Bytes(1));
        buf.freeze();
        buf.thaw();
        buf.write(1, Bytes(1));
        assert_eq!(drain(buf.rotate()), vec![(1, 2)]);
    }
}
