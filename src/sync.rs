//! Cross-process mutex embedded directly in the mapping.
//!
//! The teacher (`warp_cache_rs::shm::lock`) keeps a single `pthread_rwlock_t`
//! in a second mmap file, shared by the whole cache. This crate needs many
//! independent locks living *inside* one mapping — one per List/Queue/Stack
//! header, one per hash bucket — so the same POSIX primitive is embedded as
//! a plain `pthread_mutex_t` with the `PTHREAD_PROCESS_SHARED` attribute,
//! sized and placed wherever a `RawShmMutex` field appears in a `#[repr(C)]`
//! struct, rather than carved out into a side file.

use std::io;

/// Bytes reserved for a `pthread_mutex_t` inside the mapping. 40 bytes on
/// x86_64 Linux, up to 64 on some platforms — over-allocate like the
/// teacher's `LOCK_SIZE` does for its rwlock.
pub const MUTEX_SIZE: usize = 64;

/// A `pthread_mutex_t`-sized, `repr(C)` byte buffer that can sit inline in
/// a mapped struct. Never touched directly; always accessed through
/// [`RawShmMutex::guard`] or [`ShmMutex`].
#[repr(C, align(8))]
pub struct RawShmMutex {
    storage: [u8; MUTEX_SIZE],
}

impl RawShmMutex {
    fn ptr(&self) -> *mut libc::pthread_mutex_t {
        self.storage.as_ptr() as *mut libc::pthread_mutex_t
    }

    /// Initialize a fresh mutex in zeroed memory. Must be called exactly
    /// once, by whichever process creates the segment.
    ///
    /// # Safety
    /// `self` must point at zeroed, otherwise-untouched shared memory of
    /// at least `MUTEX_SIZE` bytes.
    pub unsafe fn init(&self) -> io::Result<()> {
        let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
        let ret = libc::pthread_mutexattr_init(&mut attr);
        if ret != 0 {
            return Err(io::Error::from_raw_os_error(ret));
        }
        let ret = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
        if ret != 0 {
            libc::pthread_mutexattr_destroy(&mut attr);
            return Err(io::Error::from_raw_os_error(ret));
        }
        // Robustness against a holder crashing mid-critical-section is not
        // attempted here; see DESIGN.md for the tradeoff this records.
        let ret = libc::pthread_mutex_init(self.ptr(), &attr);
        libc::pthread_mutexattr_destroy(&mut attr);
        if ret != 0 {
            return Err(io::Error::from_raw_os_error(ret));
        }
        Ok(())
    }

    #[inline]
    fn lock(&self) {
        unsafe {
            let ret = libc::pthread_mutex_lock(self.ptr());
            debug_assert_eq!(ret, 0, "pthread_mutex_lock failed: {ret}");
        }
    }

    #[inline]
    fn unlock(&self) {
        unsafe {
            let ret = libc::pthread_mutex_unlock(self.ptr());
            debug_assert_eq!(ret, 0, "pthread_mutex_unlock failed: {ret}");
        }
    }

    /// Acquire the mutex, returning an RAII guard ([`ShmMutexGuard`]) that
    /// unlocks on drop — including when a caller-supplied callback inside
    /// the critical section panics, closing the sharp edge the teacher's
    /// manual `lock()`/`unlock()` pairs leave open.
    pub fn guard(&self) -> ShmMutexGuard<'_> {
        self.lock();
        ShmMutexGuard { owner: self }
    }

    /// # Safety
    /// Only call when no other process can still be holding or waiting on
    /// this mutex.
    pub unsafe fn destroy(&self) {
        libc::pthread_mutex_destroy(self.ptr());
    }
}

unsafe impl Send for RawShmMutex {}
unsafe impl Sync for RawShmMutex {}

/// RAII guard returned by [`RawShmMutex::guard`].
pub struct ShmMutexGuard<'a> {
    owner: &'a RawShmMutex,
}

impl Drop for ShmMutexGuard<'_> {
    fn drop(&mut self) {
        self.owner.unlock();
    }
}

const _: () = assert!(std::mem::size_of::<libc::pthread_mutex_t>() <= MUTEX_SIZE);
