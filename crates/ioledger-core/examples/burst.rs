//! Drive the engine the way an interception layer would: a pool of
//! writer threads spraying events over a shared set of fds while a
//! consumer snapshots once per second.
//!
//! ```sh
//! cargo run --release --example burst -- 8 200000
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use ioledger_core::{engine, RwKind};

const FD_COUNT: i32 = 1000;

fn main() {
    let mut args = std::env::args().skip(1);
    let threads: usize = args.next().and_then(|a| a.parse().ok()).unwrap_or(4);
    let cycles: u64 = args.next().and_then(|a| a.parse().ok()).unwrap_or(100_000);

    let e = engine();
    for fd in 0..FD_COUNT {
        e.record_open(fd, &format!("/tmp/test_{fd}.txt"));
    }

    let done = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(threads + 1));

    let mut workers = Vec::new();
    for t in 0..threads {
        let b = barrier.clone();
        workers.push(thread::spawn(move || {
            let e = engine();
            b.wait();
            let start = Instant::now();
            // Cheap deterministic fd selection; no rand dependency for a demo.
            let mut x = (t as u64).wrapping_mul(0x9e3779b97f4a7c15).wrapping_add(1);
            for _ in 0..cycles {
                x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let fd = (x >> 33) as i32 % FD_COUNT;
                if fd % 2 == 0 {
                    e.record_rw(fd, RwKind::Read, 1024);
                } else {
                    e.record_rw(fd, RwKind::Write, 1024);
                }
            }
            start.elapsed()
        }));
    }

    let consumer = {
        let d = done.clone();
        let b = barrier.clone();
        thread::spawn(move || {
            let e = engine();
            b.wait();
            while !d.load(Ordering::Acquire) {
                let snap = e.snapshot();
                println!("snapshot: {} records", snap.len());
                if let Some(top) = snap.first() {
                    println!(
                        "  top: tid={} path={} read={} write={}",
                        top.tid, top.path, top.read_b, top.write_b
                    );
                }
                thread::sleep(Duration::from_secs(1));
            }
        })
    };

    let mut total = Duration::ZERO;
    for w in workers {
        total += w.join().unwrap();
    }
    done.store(true, Ordering::Release);
    consumer.join().unwrap();

    // Drain whatever the last interval left behind.
    let rest = e.snapshot();
    println!("final snapshot: {} records", rest.len());
    println!("worker time summed: {total:?}");
    println!("monitor: {:?}", e.take_monitor_stats());
}
