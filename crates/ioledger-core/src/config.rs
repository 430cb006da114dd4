//! Engine configuration, read once at construction.
//!
//! The engine may be initialized lazily from inside a preloaded library,
//! so the environment is read with `libc::getenv` rather than
//! `std::env::var`: no allocation, no lock, safe during early process
//! bring-up. Invalid values fall back to the defaults silently.

use std::ffi::CStr;

/// Cap on accumulated events between snapshots; RW events beyond it are
/// shed and counted.
pub const DEFAULT_MAX_POOL_SIZE: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Shed RW events once the accumulator's approximate size exceeds
    /// this. `IOLEDGER_MAX_POOL_SIZE`.
    pub max_pool_size: u64,
    /// Mirror diagnostics to stderr. `IOLEDGER_DEBUG`.
    pub debug: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            debug: false,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        let raw = unsafe { libc::getenv(c"IOLEDGER_MAX_POOL_SIZE".as_ptr()) };
        if !raw.is_null() {
            let bytes = unsafe { CStr::from_ptr(raw) }.to_bytes();
            if let Ok(s) = std::str::from_utf8(bytes) {
                if let Ok(n) = s.parse::<u64>() {
                    if n > 0 {
                        cfg.max_pool_size = n;
                    }
                }
            }
        }

        if !unsafe { libc::getenv(c"IOLEDGER_DEBUG".as_ptr()) }.is_null() {
            cfg.debug = true;
        }

        cfg
    }
}
