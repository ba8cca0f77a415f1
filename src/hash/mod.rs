//! Separately chained hash table engine shared by [`crate::set::PersistentSet`]
//! and [`crate::map::PersistentMap`].
//!
//! Grounded on the teacher's `shm::hashtable` (hash lookup/insert/remove
//! over raw shared-memory bytes) and `shm::ordering` (intrusive
//! doubly-linked list), recombined: the teacher's table used linear-probed
//! open addressing with backward-shift deletion because every slot was
//! identically sized; this crate's nodes are variable-size, so each bucket
//! instead owns a small doubly linked chain of [`crate::node::NodeHeader`]
//! nodes — the same linkage primitive the list container uses, just
//! anchored at a bucket head instead of a list head/tail pair.

pub mod set;
pub mod map;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::node::{node_at, node_at_mut, payload_at, payload_at_mut, total_size};
use crate::segment::layout::NONE;
use crate::segment::{Offset, Segment};
use crate::stats::ContainerStats;
use crate::sync::{RawShmMutex, ShmMutexGuard};

/// Fixed header for a hash-based container, living at a name-registered
/// offset. Bucket count is fixed at construction — §4.4: "no rehashing in
/// this specification".
#[repr(C)]
pub struct HashTableHeader {
    pub bucket_count: u32,
    pub _pad0: u32,
    pub size: AtomicU64,
    pub modified_at_ns: AtomicU64,
}

pub const HASH_TABLE_HEADER_SIZE: usize = std::mem::size_of::<HashTableHeader>();

/// One bucket: a chain head plus its own mutex. §4.2: "a Set/Map mutation
/// locks only the bucket containing the key's hash."
#[repr(C)]
pub struct Bucket {
    pub head: AtomicI64,
    pub size: AtomicU64,
    pub mutex: RawShmMutex,
}

pub const BUCKET_SIZE: usize = std::mem::size_of::<Bucket>();

/// Shared engine driving bucket selection, chain linkage, and node
/// allocation for both Set and Map. Each container wraps one `HashEngine`
/// and layers its own key/value payload encoding and public API on top.
pub struct HashEngine {
    segment: Segment,
    header_offset: Offset,
    buckets_offset: Offset,
    bucket_count: u32,
    stats: ContainerStats,
}

impl HashEngine {
    pub fn create_or_open(
        path: impl AsRef<std::path::Path>,
        initial_size_bytes: u64,
        create_new: bool,
        bucket_count_hint: u32,
        header_name: &str,
        buckets_name: &str,
    ) -> Result<Self> {
        let segment = Segment::create_or_open(path, initial_size_bytes, create_new)?;

        let header_offset = match segment.find_named(header_name)? {
            Some(off) => off,
            None => {
                if bucket_count_hint == 0 {
                    return Err(Error::InvalidArgument("bucket_count must be > 0".into()));
                }
                let bucket_count = bucket_count_hint.next_power_of_two();

                let buckets_offset =
                    segment.allocate(bucket_count as usize * BUCKET_SIZE)?;
                for i in 0..bucket_count {
                    let bucket = unsafe {
                        &mut *(segment
                            .base_mut_ptr()
                            .add(buckets_offset as usize + i as usize * BUCKET_SIZE)
                            as *mut Bucket)
                    };
                    bucket.head.store(NONE, Ordering::Release);
                    bucket.size.store(0, Ordering::Release);
                    unsafe { bucket.mutex.init()? };
                }
                segment.reserve_named(buckets_name, buckets_offset)?;

                let header_offset = segment.allocate(HASH_TABLE_HEADER_SIZE)?;
                let header = unsafe {
                    &mut *(segment.base_mut_ptr().add(header_offset as usize)
                        as *mut HashTableHeader)
                };
                header.bucket_count = bucket_count;
                header.size.store(0, Ordering::Release);
                header
                    .modified_at_ns
                    .store(crate::clock::now_nanos(), Ordering::Release);
                segment.reserve_named(header_name, header_offset)?;
                header_offset
            }
        };

        let header = unsafe {
            &*(segment.base_ptr().add(header_offset as usize) as *const HashTableHeader)
        };
        if !header.bucket_count.is_power_of_two() {
            return Err(Error::CorruptedState(format!(
                "bucket_count {} is not a power of two",
                header.bucket_count
            )));
        }
        let bucket_count = header.bucket_count;

        let buckets_offset = segment
            .find_named(buckets_name)?
            .ok_or_else(|| Error::CorruptedState(format!("missing named object '{buckets_name}'")))?;

        Ok(HashEngine {
            segment,
            header_offset,
            buckets_offset,
            bucket_count,
            stats: ContainerStats::default(),
        })
    }

    #[inline]
    fn base(&self) -> *const u8 {
        self.segment.base_ptr()
    }

    #[inline]
    fn base_mut(&self) -> *mut u8 {
        self.segment.base_mut_ptr()
    }

    pub fn header(&self) -> &HashTableHeader {
        unsafe { &*(self.base().add(self.header_offset as usize) as *const HashTableHeader) }
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    pub fn bucket_index(&self, hash_code: u32) -> u32 {
        hash_code & (self.bucket_count - 1)
    }

    pub fn bucket(&self, idx: u32) -> &Bucket {
        unsafe {
            &*(self
                .base()
                .add(self.buckets_offset as usize + idx as usize * BUCKET_SIZE)
                as *const Bucket)
        }
    }

    pub fn lock_bucket(&self, idx: u32) -> ShmMutexGuard<'_> {
        self.bucket(idx).mutex.guard()
    }

    fn touch_modified(&self) {
        self.header()
            .modified_at_ns
            .store(crate::clock::now_nanos(), Ordering::Release);
    }

    // ---- node access ------------------------------------------------------

    pub fn node_is_alive(&self, offset: Offset) -> bool {
        unsafe { node_at(self.base(), offset) }.entry.is_alive()
    }

    pub fn node_payload(&self, offset: Offset) -> &[u8] {
        let node = unsafe { node_at(self.base(), offset) };
        let len = node.entry.data_size as usize;
        unsafe { std::slice::from_raw_parts(payload_at(self.base(), offset), len) }
    }

    pub fn node_remaining_ttl(&self, offset: Offset) -> i64 {
        unsafe { node_at(self.base(), offset) }.entry.remaining_ttl_seconds()
    }

    pub fn node_mark_deleted(&self, offset: Offset) {
        unsafe { node_at(self.base(), offset) }.entry.mark_deleted();
    }

    /// Revive an expired slot in place during insertion — §4.4's add
    /// algorithm and §4.5's "revived" state. Caller must hold the bucket
    /// mutex; §9's open question on revival atomicity is resolved by
    /// requiring exactly that.
    pub fn node_revive_with_payload(&self, offset: Offset, hash_code: u32, payload: &[u8], ttl_secs: i64) {
        let node = unsafe { node_at_mut(self.base_mut(), offset) };
        node.entry.init(hash_code, payload.len() as u32, ttl_secs);
        unsafe {
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                payload_at_mut(self.base_mut(), offset),
                payload.len(),
            );
        }
    }

    pub fn node_set_ttl(&self, offset: Offset, ttl_secs: i64) {
        unsafe { node_at_mut(self.base_mut(), offset) }.entry.set_ttl(ttl_secs);
    }

    /// Overwrite an existing live node's payload, reallocating if the new
    /// payload is a different size than the old one. Returns the offset of
    /// the node now holding the data (unchanged unless a reallocation
    /// happened). Caller must hold the bucket mutex.
    pub fn node_overwrite(
        &self,
        bucket: &Bucket,
        offset: Offset,
        hash_code: u32,
        payload: &[u8],
        ttl_secs: i64,
    ) -> Result<Offset> {
        let node = unsafe { node_at_mut(self.base_mut(), offset) };
        if node.entry.data_size as usize == payload.len() {
            node.entry.init(hash_code, payload.len() as u32, ttl_secs);
            unsafe {
                std::ptr::copy_nonoverlapping(
                    payload.as_ptr(),
                    payload_at_mut(self.base_mut(), offset),
                    payload.len(),
                );
            }
            Ok(offset)
        } else {
            let new_offset = self.alloc_node(hash_code, payload, ttl_secs)?;
            let prev = node.prev();
            let next = node.next();
            let new_node = unsafe { node_at(self.base(), new_offset) };
            new_node.set_prev(prev);
            new_node.set_next(next);
            if prev != NONE {
                unsafe { node_at(self.base(), prev) }.set_next(new_offset);
            } else {
                bucket.head.store(new_offset, Ordering::Release);
            }
            if next != NONE {
                unsafe { node_at(self.base(), next) }.set_prev(new_offset);
            }
            self.segment.deallocate(offset);
            Ok(new_offset)
        }
    }

    pub fn alloc_node(&self, hash_code: u32, payload: &[u8], ttl_secs: i64) -> Result<Offset> {
        let offset = self.segment.allocate(total_size(payload.len()))?;
        let node = unsafe { node_at_mut(self.base_mut(), offset) };
        node.init_links();
        node.entry.init(hash_code, payload.len() as u32, ttl_secs);
        unsafe {
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                payload_at_mut(self.base_mut(), offset),
                payload.len(),
            );
        }
        Ok(offset)
    }

    /// Prepend `offset` to `bucket`'s chain. Caller must hold the bucket
    /// mutex.
    pub fn link_bucket_head(&self, bucket: &Bucket, offset: Offset) {
        let node = unsafe { node_at(self.base(), offset) };
        let old_head = bucket.head.load(Ordering::Acquire);
        node.set_prev(NONE);
        node.set_next(old_head);
        if old_head != NONE {
            unsafe { node_at(self.base(), old_head) }.set_prev(offset);
        }
        bucket.head.store(offset, Ordering::Release);
        bucket.size.fetch_add(1, Ordering::AcqRel);
        self.header().size.fetch_add(1, Ordering::AcqRel);
        self.touch_modified();
    }

    /// Unlink `offset` from `bucket`'s chain without freeing it. Caller
    /// must hold the bucket mutex.
    pub fn unlink_from_bucket(&self, bucket: &Bucket, offset: Offset) {
        let node = unsafe { node_at(self.base(), offset) };
        let prev = node.prev();
        let next = node.next();
        if prev != NONE {
            unsafe { node_at(self.base(), prev) }.set_next(next);
        } else {
            bucket.head.store(next, Ordering::Release);
        }
        if next != NONE {
            unsafe { node_at(self.base(), next) }.set_prev(prev);
        }
        bucket.size.fetch_sub(1, Ordering::AcqRel);
        self.header().size.fetch_sub(1, Ordering::AcqRel);
        self.touch_modified();
    }

    /// Scan `bucket`'s chain for a node whose hash matches and whose
    /// payload satisfies `matches`. Returns the first such node regardless
    /// of liveness — callers decide how to treat an expired match (revive
    /// vs. treat as absent), per §4.4's add algorithm. Caller must hold the
    /// bucket mutex, or accept the eventually-consistent semantics of a
    /// lock-free read per §4.4/§5.
    pub fn find_in_bucket(
        &self,
        bucket: &Bucket,
        hash_code: u32,
        mut matches: impl FnMut(&[u8]) -> bool,
    ) -> Option<Offset> {
        let mut cur = bucket.head.load(Ordering::Acquire);
        while cur != NONE {
            let node = unsafe { node_at(self.base(), cur) };
            if node.entry.hash_code == hash_code {
                let payload = self.node_payload(cur);
                if matches(payload) {
                    return Some(cur);
                }
            }
            cur = node.next();
        }
        None
    }

    /// Remove a specific node from its bucket and free it. Caller must
    /// hold the bucket mutex and must have already confirmed `offset`'s
    /// presence in `bucket`.
    pub fn remove_node(&self, bucket: &Bucket, offset: Offset) {
        self.node_mark_deleted(offset);
        self.unlink_from_bucket(bucket, offset);
        self.segment.deallocate(offset);
    }

    /// Live element count across all buckets — §4.4's invariant:
    /// `size() == Σ_b count of alive nodes in bucket b`.
    pub fn size(&self) -> usize {
        let mut total = 0usize;
        for idx in 0..self.bucket_count {
            let bucket = self.bucket(idx);
            let _guard = bucket.mutex.guard();
            let mut cur = bucket.head.load(Ordering::Acquire);
            while cur != NONE {
                let node = unsafe { node_at(self.base(), cur) };
                if node.entry.is_alive() {
                    total += 1;
                }
                cur = node.next();
            }
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn clear(&self) {
        for idx in 0..self.bucket_count {
            let bucket = self.bucket(idx);
            let _guard = bucket.mutex.guard();
            let mut cur = bucket.head.load(Ordering::Acquire);
            while cur != NONE {
                let node = unsafe { node_at(self.base(), cur) };
                let next = node.next();
                node.entry.mark_deleted();
                self.segment.deallocate(cur);
                cur = next;
            }
            bucket.head.store(NONE, Ordering::Release);
            bucket.size.store(0, Ordering::Release);
        }
        self.header().size.store(0, Ordering::Release);
        self.touch_modified();
    }

    /// Sweep every bucket, reclaiming expired nodes. Locks each bucket in
    /// turn, never two at once — §4.2's lock-ordering rule.
    pub fn remove_expired(&self) -> usize {
        let mut removed = 0usize;
        for idx in 0..self.bucket_count {
            let bucket = self.bucket(idx);
            let _guard = bucket.mutex.guard();
            let mut cur = bucket.head.load(Ordering::Acquire);
            while cur != NONE {
                let node = unsafe { node_at(self.base(), cur) };
                let next = node.next();
                if node.entry.is_expired() {
                    self.remove_node(bucket, cur);
                    removed += 1;
                }
                cur = next;
            }
        }
        if removed > 0 {
            self.stats.record_expirations_reclaimed(removed);
        }
        removed
    }

    /// Apply `predicate` to every live element's payload, removing those
    /// for which it returns `false`. §4.4: "the predicate ... is called
    /// with the bucket lock held — implementers must document that the
    /// predicate must not recursively enter the container."
    pub fn retain_if(&self, mut predicate: impl FnMut(&[u8]) -> bool) -> usize {
        let mut removed = 0usize;
        for idx in 0..self.bucket_count {
            let bucket = self.bucket(idx);
            let _guard = bucket.mutex.guard();
            let mut cur = bucket.head.load(Ordering::Acquire);
            while cur != NONE {
                let node = unsafe { node_at(self.base(), cur) };
                let next = node.next();
                if node.entry.is_alive() {
                    let payload = self.node_payload(cur).to_vec();
                    if !predicate(&payload) {
                        self.remove_node(bucket, cur);
                        removed += 1;
                    }
                }
                cur = next;
            }
        }
        removed
    }

    pub fn for_each(&self, mut cb: impl FnMut(&[u8]) -> bool) {
        'outer: for idx in 0..self.bucket_count {
            let bucket = self.bucket(idx);
            let _guard = bucket.mutex.guard();
            let mut cur = bucket.head.load(Ordering::Acquire);
            while cur != NONE {
                let node = unsafe { node_at(self.base(), cur) };
                if node.entry.is_alive() {
                    let payload = self.node_payload(cur).to_vec();
                    if !cb(&payload) {
                        break 'outer;
                    }
                }
                cur = node.next();
            }
        }
    }

    pub fn for_each_with_ttl(&self, mut cb: impl FnMut(&[u8], i64) -> bool) {
        'outer: for idx in 0..self.bucket_count {
            let bucket = self.bucket(idx);
            let _guard = bucket.mutex.guard();
            let mut cur = bucket.head.load(Ordering::Acquire);
            while cur != NONE {
                let node = unsafe { node_at(self.base(), cur) };
                if node.entry.is_alive() {
                    let ttl = node.entry.remaining_ttl_seconds();
                    let payload = self.node_payload(cur).to_vec();
                    if !cb(&payload, ttl) {
                        break 'outer;
                    }
                }
                cur = node.next();
            }
        }
    }

    /// Record a read probe (`contains`, `get`) for process-local stats —
    /// §5: "Stats counters ... are process-local atomics and not
    /// synchronized across processes."
    pub fn record_read(&self, hit: bool) {
        self.stats.record_read(hit);
    }

    pub fn record_write(&self) {
        self.stats.record_write();
    }

    pub fn flush(&self) -> Result<()> {
        self.stats.log_summary("hash");
        self.segment.flush()
    }
}

unsafe impl Send for HashEngine {}
unsafe impl Sync for HashEngine {}
