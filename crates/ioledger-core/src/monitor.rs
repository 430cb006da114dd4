//! Monitor counters: observational statistics about the engine itself,
//! not about the host's IO. All atomic, incremented with relaxed
//! ordering on the event path.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct MonitorCounters {
    pub open_calls: AtomicU64,
    pub close_calls: AtomicU64,
    pub read_calls: AtomicU64,
    pub write_calls: AtomicU64,
    /// record_open/record_close rejected for a bad fd or empty path.
    pub oc_param_errors: AtomicU64,
    /// record_rw rejected for an invalid operation kind. Unreachable
    /// through the typed API; kept so the stats layout stays complete.
    pub rw_param_errors: AtomicU64,
    /// RW events shed because the accumulator was over capacity.
    pub pool_overflow_drops: AtomicU64,
    /// RW events for fds with no registered path.
    pub unknown_fd_drops: AtomicU64,
}

impl MonitorCounters {
    pub(crate) const fn new() -> Self {
        Self {
            open_calls: AtomicU64::new(0),
            close_calls: AtomicU64::new(0),
            read_calls: AtomicU64::new(0),
            write_calls: AtomicU64::new(0),
            oc_param_errors: AtomicU64::new(0),
            rw_param_errors: AtomicU64::new(0),
            pool_overflow_drops: AtomicU64::new(0),
            unknown_fd_drops: AtomicU64::new(0),
        }
    }

    /// Read every counter without disturbing it.
    pub(crate) fn load(&self) -> MonitorStats {
        MonitorStats {
            open_calls: self.open_calls.load(Ordering::Relaxed),
            close_calls: self.close_calls.load(Ordering::Relaxed),
            read_calls: self.read_calls.load(Ordering::Relaxed),
            write_calls: self.write_calls.load(Ordering::Relaxed),
            oc_param_errors: self.oc_param_errors.load(Ordering::Relaxed),
            rw_param_errors: self.rw_param_errors.load(Ordering::Relaxed),
            pool_overflow_drops: self.pool_overflow_drops.load(Ordering::Relaxed),
            unknown_fd_drops: self.unknown_fd_drops.load(Ordering::Relaxed),
        }
    }

    /// Read-and-reset, one counter at a time. Increments racing the swap
    /// land in the next interval.
    pub(crate) fn take(&self) -> MonitorStats {
        MonitorStats {
            open_calls: self.open_calls.swap(0, Ordering::Relaxed),
            close_calls: self.close_calls.swap(0, Ordering::Relaxed),
            read_calls: self.read_calls.swap(0, Ordering::Relaxed),
            write_calls: self.write_calls.swap(0, Ordering::Relaxed),
            oc_param_errors: self.oc_param_errors.swap(0, Ordering::Relaxed),
            rw_param_errors: self.rw_param_errors.swap(0, Ordering::Relaxed),
            pool_overflow_drops: self.pool_overflow_drops.swap(0, Ordering::Relaxed),
            unknown_fd_drops: self.unknown_fd_drops.swap(0, Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the monitor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub open_calls: u64,
    pub close_calls: u64,
    pub read_calls: u64,
    pub write_calls: u64,
    pub oc_param_errors: u64,
    pub rw_param_errors: u64,
    pub pool_overflow_drops: u64,
    pub unknown_fd_drops: u64,
}
