//! # ioledger-sync
//!
//! Concurrency primitives shared by the io-ledger crates: a ticket-style
//! reader/writer spinlock and a sharded hash map that locks per bucket.
//!
//! Both are tuned for the event path of an IO-accounting engine: critical
//! sections of a few dozen instructions, many concurrent writer threads,
//! and a hard requirement that nothing on the path performs a syscall
//! other than a scheduler yield while spinning.

pub mod rw_spinlock;
pub mod shard_map;

pub use rw_spinlock::RwSpinLock;
pub use shard_map::{Merge, ShardMap, DEFAULT_BUCKET_COUNT};
