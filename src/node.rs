//! The common node layout shared by every container: a doubly linked-list
//! splice point plus the TTL-bearing entry metadata, followed by the
//! opaque payload bytes. Grounded on the teacher's `shm::layout::SlotHeader`
//! and `shm::ordering`, generalized from a fixed-size cache slot to a
//! variable-size node whose payload length is read from `EntryMeta`.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use crate::clock::{self, NEVER};
use crate::segment::layout::NONE;

/// Per-node metadata: §3's `Entry`.
#[repr(C)]
pub struct EntryMeta {
    pub hash_code: u32,
    pub data_size: u32,
    pub created_at_ns: u64,
    pub expires_at_ns: u64,
    /// 0 = dead (removed or never initialized), 1 = valid. Checked
    /// together with `expires_at_ns` by `is_alive`/`is_expired`.
    pub valid: AtomicU32,
    pub _pad: u32,
}

pub const ENTRY_META_SIZE: usize = std::mem::size_of::<EntryMeta>();

impl EntryMeta {
    pub fn init(&mut self, hash_code: u32, data_size: u32, ttl_secs: i64) {
        let now = clock::now_nanos();
        self.hash_code = hash_code;
        self.data_size = data_size;
        self.created_at_ns = now;
        self.expires_at_ns = clock::expires_at(ttl_secs, now);
        self.valid.store(1, Ordering::Release);
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.valid.load(Ordering::Acquire) != 0 && clock::now_nanos() < self.expires_at_ns
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.valid.load(Ordering::Acquire) != 0 && clock::now_nanos() >= self.expires_at_ns
    }

    pub fn mark_deleted(&self) {
        self.valid.store(0, Ordering::Release);
    }

    pub fn mark_valid(&self) {
        self.valid.store(1, Ordering::Release);
    }

    /// `-1` for never-expiring entries, else the whole seconds remaining,
    /// floored at 0.
    pub fn remaining_ttl_seconds(&self) -> i64 {
        if self.expires_at_ns == NEVER {
            return -1;
        }
        let now = clock::now_nanos();
        if now >= self.expires_at_ns {
            0
        } else {
            ((self.expires_at_ns - now) / 1_000_000_000) as i64
        }
    }

    pub fn set_ttl(&mut self, ttl_secs: i64) {
        self.expires_at_ns = clock::expires_at(ttl_secs, clock::now_nanos());
    }
}

/// Header prefixing every list/queue/stack/hash-bucket node. The payload
/// (`data_size` bytes) immediately follows this struct in the arena.
#[repr(C)]
pub struct NodeHeader {
    pub prev: AtomicI64,
    pub next: AtomicI64,
    pub entry: EntryMeta,
}

pub const NODE_HEADER_SIZE: usize = std::mem::size_of::<NodeHeader>();

impl NodeHeader {
    pub fn init_links(&self) {
        self.prev.store(NONE, Ordering::Release);
        self.next.store(NONE, Ordering::Release);
    }

    #[inline]
    pub fn prev(&self) -> i64 {
        self.prev.load(Ordering::Acquire)
    }

    #[inline]
    pub fn next(&self) -> i64 {
        self.next.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_prev(&self, v: i64) {
        self.prev.store(v, Ordering::Release);
    }

    #[inline]
    pub fn set_next(&self, v: i64) {
        self.next.store(v, Ordering::Release);
    }
}

/// Total bytes (header + payload) occupied by a node whose payload is
/// `data_size` bytes — `total_size(n)` from §3.
#[inline]
pub fn total_size(data_size: usize) -> usize {
    NODE_HEADER_SIZE + data_size
}

/// Access a node header at absolute mapping offset `offset`.
///
/// # Safety
/// `base` + `offset` must point at a live `NodeHeader` with at least
/// `NODE_HEADER_SIZE` bytes of payload following it.
#[inline]
pub unsafe fn node_at<'a>(base: *const u8, offset: i64) -> &'a NodeHeader {
    &*(base.add(offset as usize) as *const NodeHeader)
}

#[inline]
pub unsafe fn node_at_mut<'a>(base: *mut u8, offset: i64) -> &'a mut NodeHeader {
    &mut *(base.add(offset as usize) as *mut NodeHeader)
}

/// Pointer to the payload bytes following a node header at `offset`.
///
/// # Safety
/// Same requirements as [`node_at`].
#[inline]
pub unsafe fn payload_at(base: *const u8, offset: i64) -> *const u8 {
    base.add(offset as usize).add(NODE_HEADER_SIZE)
}

#[inline]
pub unsafe fn payload_at_mut(base: *mut u8, offset: i64) -> *mut u8 {
    base.add(offset as usize).add(NODE_HEADER_SIZE)
}
