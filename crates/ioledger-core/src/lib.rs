//! # ioledger-core
//!
//! Concurrent accounting engine for file IO. An interception layer
//! (LD_PRELOAD shim, trampolines; out of scope here) reports one event
//! per successful open/close/read/write; the engine correlates fds with
//! their opening paths, aggregates byte totals per `(thread, path)`, and
//! hands accumulated batches to a consumer through a snapshot call that
//! rotates a double buffer instead of stopping ingestion.
//!
//! Built to be embedded in arbitrary host processes:
//!
//! - no file IO anywhere the interception layer can call into; a log
//!   write here would be re-intercepted and recurse
//! - no panics or errors propagated to the host; failures only move
//!   monitor counters
//! - fork-safe: `pthread_atfork` hooks freeze every lock so children
//!   inherit consistent, unlocked state
//! - teardown-safe: an `atexit` hook disables the engine before the exit
//!   sequence closes descriptors behind it
//!
//! ```no_run
//! use ioledger_core::{engine, RwKind};
//!
//! engine().record_open(7, "/var/log/app.log");
//! engine().record_rw(7, RwKind::Write, 1408);
//! for info in engine().snapshot() {
//!     println!("{} {} r={} w={}", info.tid, info.path, info.read_b, info.write_b);
//! }
//! ```

pub mod accumulator;
mod config;
mod engine;
mod fork;
mod logger;
mod monitor;
mod tid;

pub use config::{LedgerConfig, DEFAULT_MAX_POOL_SIZE};
pub use engine::{Engine, FileInfo, RwKind};
pub use monitor::MonitorStats;

use once_cell::sync::{Lazy, OnceCell};
use thiserror::Error;

use crate::logger::ledger_log;

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("pthread_atfork registration failed (rc {0})")]
    AtforkRegistration(i32),

    #[error("atexit registration failed (rc {0})")]
    AtexitRegistration(i32),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Why the singleton came up disabled, if it did.
static INIT_ERROR: OnceCell<LedgerError> = OnceCell::new();

static ENGINE: Lazy<Engine> = Lazy::new(|| {
    let config = LedgerConfig::from_env();
    logger::set_debug(config.debug);

    let engine = Engine::new(config);
    if let Err(err) = fork::register_process_hooks() {
        // Without fork hooks a child could inherit held locks; run
        // permanently disabled instead of risking the host.
        engine.mark_destructing();
        let _ = INIT_ERROR.set(err);
    } else {
        ledger_log!("engine up, max_pool_size={}", config.max_pool_size);
    }
    engine
});

/// Process-wide engine handle. The first call initializes the engine,
/// reads `IOLEDGER_*` from the environment, and registers the fork and
/// teardown hooks.
pub fn engine() -> &'static Engine {
    &ENGINE
}

/// Like [`engine`], but surfaces the initialization error if hook
/// registration failed and the engine is permanently disabled.
pub fn try_init() -> Result<&'static Engine> {
    let engine = &*ENGINE;
    match INIT_ERROR.get() {
        Some(err) => Err(err.clone()),
        None => Ok(engine),
    }
}
