//! Monotonic-preferred timestamp source.
//!
//! `CLOCK_MONOTONIC` is consistent across processes on the same host and
//! does not reset when a process restarts, only on reboot — exactly the
//! property the data model needs for `created_at_ns`/`expires_at_ns` to
//! remain comparable across the reopen scenarios in the testable
//! properties. Grounded on the teacher's `shm::current_time_nanos`.

#[cfg(target_os = "linux")]
pub fn now_nanos() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn now_nanos() -> u64 {
    use std::time::Instant;
    static BASE: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let base = BASE.get_or_init(Instant::now);
    base.elapsed().as_nanos() as u64
}

/// Sentinel `expires_at_ns` meaning "never expires".
pub const NEVER: u64 = u64::MAX;

/// Convert a caller-supplied TTL in seconds to an absolute `expires_at_ns`.
/// `ttl_secs <= 0` means never-expiring, per the TTL convention in §6.
pub fn expires_at(ttl_secs: i64, now_ns: u64) -> u64 {
    if ttl_secs <= 0 {
        NEVER
    } else {
        now_ns.saturating_add((ttl_secs as u64).saturating_mul(1_000_000_000))
    }
}
