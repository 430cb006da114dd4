//! The accounting engine: fd→path registry, `(tid, path)` byte
//! aggregation, and the consume-and-swap snapshot.
//!
//! Every public method is callable from any thread at any time once
//! construction completes, and none of them performs file IO: calls
//! arrive from an interception layer, and a write here would loop
//! straight back in. Errors never reach the caller; they only move
//! monitor counters.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

use ioledger_sync::{Merge, ShardMap};

use crate::accumulator::DoubleBuffer;
use crate::config::LedgerConfig;
use crate::monitor::{MonitorCounters, MonitorStats};
use crate::tid::current_tid;

/// Direction of a read/write event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwKind {
    Read,
    Write,
}

/// One aggregated snapshot record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub tid: u64,
    pub path: String,
    pub read_b: u64,
    pub write_b: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AggKey {
    tid: u64,
    path: String,
}

#[derive(Debug, Clone, Copy, Default)]
struct ByteTotals {
    read_b: u64,
    write_b: u64,
}

impl Merge for ByteTotals {
    fn merge(&mut self, other: Self) {
        self.read_b += other.read_b;
        self.write_b += other.write_b;
    }
}

pub struct Engine {
    /// fd → path, as reported by the most recent successful open.
    registry: ShardMap<i32, String>,
    pool: DoubleBuffer<AggKey, ByteTotals>,
    monitor: MonitorCounters,
    max_pool_size: u64,
    /// Set by teardown or a fatal init error; every entry point then
    /// no-ops. Plain load/store semantics are all this needs.
    disabled: AtomicBool,
}

impl Engine {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            registry: ShardMap::new(),
            pool: DoubleBuffer::new(),
            monitor: MonitorCounters::new(),
            max_pool_size: config.max_pool_size,
            disabled: AtomicBool::new(false),
        }
    }

    #[inline]
    fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    /// Permanently disable the engine. Called by the atexit hook before
    /// the runtime starts closing descriptors behind our back; also the
    /// escape hatch for a fatal initialization error.
    pub fn mark_destructing(&self) {
        self.disabled.store(true, Ordering::Relaxed);
    }

    /// A successful open of `path` returned `fd`. Reopening an fd
    /// overwrites its path.
    pub fn record_open(&self, fd: i32, path: &str) {
        if self.is_disabled() {
            return;
        }
        if fd < 0 || path.is_empty() {
            self.monitor.oc_param_errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.monitor.open_calls.fetch_add(1, Ordering::Relaxed);
        self.registry.insert(fd, path.to_owned());
    }

    /// `fd` was closed. Unknown fds are fine; the close still counts.
    pub fn record_close(&self, fd: i32) {
        if self.is_disabled() {
            return;
        }
        if fd < 0 {
            self.monitor.oc_param_errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.monitor.close_calls.fetch_add(1, Ordering::Relaxed);
        self.registry.remove(&fd);
    }

    /// `bytes` were read from or written to `fd`.
    ///
    /// Shed when the accumulator is over capacity (the consumer stopped
    /// snapshotting) and dropped when the fd has no registered path;
    /// both outcomes are counted.
    pub fn record_rw(&self, fd: i32, kind: RwKind, bytes: u64) {
        if self.is_disabled() {
            return;
        }
        if self.pool.approx_len() > self.max_pool_size {
            self.monitor
                .pool_overflow_drops
                .fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(path) = self.registry.find(&fd) else {
            self.monitor.unknown_fd_drops.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let totals = match kind {
            RwKind::Read => {
                self.monitor.read_calls.fetch_add(1, Ordering::Relaxed);
                ByteTotals {
                    read_b: bytes,
                    write_b: 0,
                }
            }
            RwKind::Write => {
                self.monitor.write_calls.fetch_add(1, Ordering::Relaxed);
                ByteTotals {
                    read_b: 0,
                    write_b: bytes,
                }
            }
        };
        let tid = current_tid();
        self.pool.write(AggKey { tid, path }, totals);
    }

    /// Consume everything accumulated since the previous snapshot.
    ///
    /// Rotates the accumulator, drains the retired side into a fresh
    /// vector, and sorts it by `read_b + write_b` descending. Ingestion
    /// continues into the other side throughout. Intended for a single
    /// consumer; concurrent snapshots would race over the retired side.
    pub fn snapshot(&self) -> Vec<FileInfo> {
        if self.is_disabled() {
            return Vec::new();
        }
        let retired = self.pool.rotate();
        let mut out = Vec::new();
        retired.for_each(|key, totals| {
            out.push(FileInfo {
                tid: key.tid,
                path: key.path.clone(),
                read_b: totals.read_b,
                write_b: totals.write_b,
            });
        });
        out.sort_unstable_by(|a, b| {
            (b.read_b + b.write_b).cmp(&(a.read_b + a.write_b))
        });
        out
    }

    /// Current monitor counters, without resetting them.
    pub fn monitor_stats(&self) -> MonitorStats {
        self.monitor.load()
    }

    /// Read-and-reset the monitor counters. Kept separate from
    /// [`Engine::snapshot`] so inspection does not perturb production
    /// consumers.
    pub fn take_monitor_stats(&self) -> MonitorStats {
        self.monitor.take()
    }

    // ------------------------------------------------------------------
    // Fork coordination
    // ------------------------------------------------------------------
    // Freezing everything across fork() means the child starts with all
    // locks released and both structures self-consistent, instead of
    // inheriting a lock some parent thread held mid-update.

    /// Before `fork()`, in the parent: quiesce the accumulator, then
    /// write-lock every bucket of both sides and the registry.
    pub fn prefork(&self) {
        self.pool.freeze();
        self.registry.lock_all();
    }

    /// After `fork()`, in the parent: release in reverse order.
    pub fn postfork_parent(&self) {
        self.registry.unlock_all();
        self.pool.thaw();
    }

    /// After `fork()`, in the child: the lock state was inherited
    /// frozen. The child is single-threaded here, so instead of
    /// unlocking ticket by ticket the locks are reset outright: parent
    /// threads that were queued on a ticket at fork time do not exist in
    /// the child, and unlocking would hand the lock to one of those
    /// ghosts, wedging it forever.
    pub fn postfork_child(&self) {
        self.registry.reset_locks();
        self.pool.reset_locks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine() -> Engine {
        Engine::new(LedgerConfig::default())
    }

    #[test]
    fn test_rw_without_open_is_counted_and_dropped() {
        let engine = test_engine();
        engine.record_rw(5, RwKind::Read, 100);

        assert!(engine.snapshot().is_empty());
        let stats = engine.monitor_stats();
        assert_eq!(stats.unknown_fd_drops, 1);
        assert_eq!(stats.read_calls, 0);
    }

    #[test]
    fn test_negative_fd_open_close_is_a_param_error() {
        let engine = test_engine();
        engine.record_open(-1, "/tmp/x");
        engine.record_close(-3);

        let stats = engine.monitor_stats();
        assert_eq!(stats.oc_param_errors, 2);
        assert_eq!(stats.open_calls, 0);
        assert_eq!(stats.close_calls, 0);
    }

    #[test]
    fn test_negative_fd_rw_is_an_unknown_fd() {
        // A negative fd can never reach the registry through record_open,
        // so the lookup misses like any other untracked fd.
        let engine = test_engine();
        engine.record_rw(-2, RwKind::Write, 9);

        let stats = engine.monitor_stats();
        assert_eq!(stats.unknown_fd_drops, 1);
        assert_eq!(stats.rw_param_errors, 0);
        assert_eq!(stats.write_calls, 0);
        assert!(engine.snapshot().is_empty());
    }

    #[test]
    fn test_empty_path_is_a_param_error() {
        let engine = test_engine();
        engine.record_open(4, "");
        assert_eq!(engine.monitor_stats().oc_param_errors, 1);
        engine.record_rw(4, RwKind::Read, 1);
        assert_eq!(engine.monitor_stats().unknown_fd_drops, 1);
    }

    #[test]
    fn test_destructing_turns_everything_into_noops() {
        let engine = test_engine();
        engine.record_open(3, "/tmp/live");
        engine.record_rw(3, RwKind::Write, 10);

        engine.mark_destructing();
        engine.record_open(4, "/tmp/late");
        engine.record_rw(3, RwKind::Write, 10);
        assert!(engine.snapshot().is_empty());

        // Counters stop moving too.
        let stats = engine.monitor_stats();
        assert_eq!(stats.open_calls, 1);
        assert_eq!(stats.write_calls, 1);
    }
}
