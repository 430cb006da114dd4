//! Allocation-free diagnostics.
//!
//! The engine lives inside host processes whose file IO it accounts for,
//! so it cannot log through anything that opens or writes files on the
//! event path: the write would be re-intercepted and recurse. Instead,
//! messages land in a fixed in-memory ring; when `IOLEDGER_DEBUG` is set
//! they are additionally mirrored to stderr with a raw `libc::write`,
//! and the ring is replayed to stderr from the teardown hook.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const RING_SIZE: usize = 64 * 1024;

pub(crate) static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

pub(crate) struct RingLog {
    buffer: UnsafeCell<[u8; RING_SIZE]>,
    head: AtomicUsize,
}

// Writers reserve disjoint byte ranges via head; overlap only happens
// with messages a full ring older.
unsafe impl Sync for RingLog {}

impl RingLog {
    pub(crate) const fn new() -> Self {
        Self {
            buffer: UnsafeCell::new([0u8; RING_SIZE]),
            head: AtomicUsize::new(0),
        }
    }

    pub(crate) fn log(&self, msg: &str) {
        let len = msg.len();
        if len == 0 || len > RING_SIZE {
            return;
        }
        let start = self.head.fetch_add(len, Ordering::SeqCst);
        let buf = self.buffer.get() as *mut u8;
        for (i, byte) in msg.bytes().enumerate() {
            unsafe { *buf.add((start + i) % RING_SIZE) = byte };
        }
    }

    /// Replay the ring to stderr. Only called from the atexit hook, when
    /// the process is single-threaded again.
    pub(crate) fn dump_to_stderr(&self) {
        let head = self.head.load(Ordering::SeqCst);
        let start = head.saturating_sub(RING_SIZE);
        let buf = self.buffer.get() as *const u8;
        for i in start..head {
            unsafe {
                let byte = buf.add(i % RING_SIZE);
                libc::write(2, byte as *const libc::c_void, 1);
            }
        }
    }
}

pub(crate) static LOG: RingLog = RingLog::new();

pub(crate) fn set_debug(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
}

pub(crate) fn emit(msg: &str) {
    LOG.log(msg);
    if DEBUG_ENABLED.load(Ordering::Relaxed) {
        unsafe { libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len()) };
    }
}

/// `fmt::Write` over a stack buffer; excess output is truncated.
pub(crate) struct FixedWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> FixedWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn as_str(&self) -> &str {
        std::str::from_utf8(&self.buf[..self.pos]).unwrap_or("")
    }
}

impl std::fmt::Write for FixedWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let bytes = s.as_bytes();
        let to_copy = bytes.len().min(self.buf.len() - self.pos);
        self.buf[self.pos..self.pos + to_copy].copy_from_slice(&bytes[..to_copy]);
        self.pos += to_copy;
        Ok(())
    }
}

/// Format a diagnostic line on the stack and hand it to the ring.
macro_rules! ledger_log {
    ($($arg:tt)*) => {{
        use std::fmt::Write as _;
        let mut buf = [0u8; 256];
        let mut w = $crate::logger::FixedWriter::new(&mut buf);
        let _ = write!(w, "[ioledger] ");
        let _ = write!(w, $($arg)*);
        let _ = writeln!(w);
        $crate::logger::emit(w.as_str());
    }};
}
pub(crate) use ledger_log;
