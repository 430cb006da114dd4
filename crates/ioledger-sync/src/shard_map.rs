//! Sharded concurrent hash map.
//!
//! A fixed array of buckets, each an independently spin-locked `Vec` of
//! entries. Contention scales with hash collisions rather than with table
//! cardinality, which is what the accounting engine needs: thousands of
//! distinct `(thread, path)` keys hammered from many threads at once.
//!
//! The map never resizes. The default bucket count is a prime so that
//! keys with structured low bits still disperse.

use std::cell::UnsafeCell;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};

use crate::rw_spinlock::RwSpinLock;

/// Prime bucket count, good dispersion for string-heavy keys.
pub const DEFAULT_BUCKET_COUNT: usize = 1031;

/// Combining operation applied by [`ShardMap::upsert_merge`] when the key
/// is already present.
pub trait Merge {
    fn merge(&mut self, other: Self);
}

struct Bucket<K, V> {
    lock: RwSpinLock,
    entries: UnsafeCell<Vec<(K, V)>>,
}

impl<K, V> Bucket<K, V> {
    fn new() -> Self {
        Self {
            lock: RwSpinLock::new(),
            entries: UnsafeCell::new(Vec::new()),
        }
    }
}

pub struct ShardMap<K, V, S = RandomState> {
    buckets: Box<[Bucket<K, V>]>,
    hasher: S,
}

// Entries are only reached through the bucket lock.
unsafe impl<K: Send, V: Send, S: Send> Send for ShardMap<K, V, S> {}
unsafe impl<K: Send + Sync, V: Send + Sync, S: Sync> Sync for ShardMap<K, V, S> {}

impl<K: Hash + Eq, V> Default for ShardMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V> ShardMap<K, V> {
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKET_COUNT)
    }

    pub fn with_buckets(bucket_count: usize) -> Self {
        Self::with_buckets_and_hasher(bucket_count, RandomState::new())
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> ShardMap<K, V, S> {
    pub fn with_buckets_and_hasher(bucket_count: usize, hasher: S) -> Self {
        assert!(bucket_count > 0, "bucket count must be positive");
        let buckets = (0..bucket_count)
            .map(|_| Bucket::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { buckets, hasher }
    }

    fn bucket(&self, key: &K) -> &Bucket<K, V> {
        let hash = self.hasher.hash_one(key);
        &self.buckets[(hash % self.buckets.len() as u64) as usize]
    }

    /// Copy out the value for `key`, if present.
    pub fn find(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let bucket = self.bucket(key);
        bucket.lock.with_read(|| {
            let entries = unsafe { &*bucket.entries.get() };
            entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
    }

    /// Insert `value` under `key`; an existing value is overwritten
    /// (latest wins).
    pub fn insert(&self, key: K, value: V) {
        let bucket = self.bucket(&key);
        bucket.lock.with_write(|| {
            let entries = unsafe { &mut *bucket.entries.get() };
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some((_, v)) => *v = value,
                None => entries.push((key, value)),
            }
        });
    }

    /// Insert `value` under `key`, or fold it into the existing value via
    /// [`Merge`].
    pub fn upsert_merge(&self, key: K, value: V)
    where
        V: Merge,
    {
        let bucket = self.bucket(&key);
        bucket.lock.with_write(|| {
            let entries = unsafe { &mut *bucket.entries.get() };
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some((_, v)) => v.merge(value),
                None => entries.push((key, value)),
            }
        });
    }

    /// Remove `key`. Absent keys are a no-op.
    pub fn remove(&self, key: &K) {
        let bucket = self.bucket(key);
        bucket.lock.with_write(|| {
            let entries = unsafe { &mut *bucket.entries.get() };
            if let Some(pos) = entries.iter().position(|(k, _)| k == key) {
                entries.swap_remove(pos);
            }
        });
    }

    /// Drop every entry, one bucket at a time.
    pub fn clear(&self) {
        for bucket in self.buckets.iter() {
            bucket.lock.with_write(|| {
                let entries = unsafe { &mut *bucket.entries.get() };
                entries.clear();
                entries.shrink_to_fit();
            });
        }
    }

    /// Visit every entry. Each bucket is read-locked for the duration of
    /// its visit, so `f` must not call back into the same map.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for bucket in self.buckets.iter() {
            bucket.lock.with_read(|| {
                let entries = unsafe { &*bucket.entries.get() };
                for (k, v) in entries.iter() {
                    f(k, v);
                }
            });
        }
    }

    /// Write-lock every bucket, in index order. Used by the fork hooks to
    /// freeze the map; pair with [`ShardMap::unlock_all`].
    pub fn lock_all(&self) {
        for bucket in self.buckets.iter() {
            bucket.lock.write_lock();
        }
    }

    /// Release every bucket locked by [`ShardMap::lock_all`], in reverse
    /// order.
    pub fn unlock_all(&self) {
        for bucket in self.buckets.iter().rev() {
            bucket.lock.write_unlock();
        }
    }

    /// Force every bucket lock back to the released state. Post-fork
    /// child only; see [`RwSpinLock::reset`].
    pub fn reset_locks(&self) {
        for bucket in self.buckets.iter() {
            bucket.lock.reset();
        }
    }
}
