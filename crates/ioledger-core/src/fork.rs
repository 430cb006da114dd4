//! Process lifecycle hooks.
//!
//! Registered once, when the singleton engine is first built:
//! `pthread_atfork` trampolines that freeze and thaw the engine's locks
//! around `fork()`, and an `atexit` hook that flips the engine into the
//! destructing state before the runtime's exit sequence starts closing
//! descriptors (which would otherwise re-enter a half-dead engine).

use crate::logger::{ledger_log, DEBUG_ENABLED, LOG};
use crate::{engine, LedgerError};
use std::sync::atomic::Ordering;

unsafe extern "C" fn prefork() {
    engine().prefork();
}

unsafe extern "C" fn postfork_parent() {
    engine().postfork_parent();
}

unsafe extern "C" fn postfork_child() {
    engine().postfork_child();
}

extern "C" fn teardown() {
    engine().mark_destructing();
    if DEBUG_ENABLED.load(Ordering::Relaxed) {
        LOG.dump_to_stderr();
    }
}

/// Register the atfork and atexit hooks. A nonzero return from either
/// registration is unrecoverable for fork safety, so the caller disables
/// the engine.
pub(crate) fn register_process_hooks() -> Result<(), LedgerError> {
    let rc = unsafe {
        libc::pthread_atfork(
            Some(prefork as unsafe extern "C" fn()),
            Some(postfork_parent as unsafe extern "C" fn()),
            Some(postfork_child as unsafe extern "C" fn()),
        )
    };
    if rc != 0 {
        ledger_log!("pthread_atfork failed rc={rc}; engine disabled");
        return Err(LedgerError::AtforkRegistration(rc));
    }

    let rc = unsafe { libc::atexit(teardown) };
    if rc != 0 {
        ledger_log!("atexit failed rc={rc}; engine disabled");
        return Err(LedgerError::AtexitRegistration(rc));
    }

    Ok(())
}
