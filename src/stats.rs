//! Process-local usage counters kept on the Rust-side handle, never in the
//! mapping — §5: "process-local atomics, not synchronized across processes."
//! Each container handle owns one and reports it at `debug` level whenever
//! the handle is flushed, the way the teacher's ambient logging choice
//! would surface cache-health numbers.

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

#[derive(Default)]
pub struct ContainerStats {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub expirations_reclaimed: AtomicU64,
}

impl ContainerStats {
    pub fn record_read(&self, hit: bool) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations_reclaimed(&self, count: usize) {
        self.expirations_reclaimed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn log_summary(&self, label: &str) {
        debug!(
            "{label} stats: reads={} writes={} hits={} misses={} expirations_reclaimed={}",
            self.reads.load(Ordering::Relaxed),
            self.writes.load(Ordering::Relaxed),
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.expirations_reclaimed.load(Ordering::Relaxed),
        );
    }
}
