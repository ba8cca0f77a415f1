//! Doubly linked list container: `List`, and the `Queue`/`Stack` protocols
//! layered on top of it in sibling modules.
//!
//! Grounded on the teacher's `shm::ordering` (intrusive doubly-linked list
//! over slot indices) generalized from a fixed-size eviction list over
//! cache slots to the spec's general-purpose persistent list over
//! variable-size [`crate::node::NodeHeader`] nodes, plus a global
//! cross-process mutex taking the role the teacher's per-cache rwlock
//! played for its slab.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex as LocalMutex;

use crate::error::{Error, Result};
use crate::hash_util::hash32;
use crate::node::{node_at, node_at_mut, payload_at, payload_at_mut, total_size};
use crate::segment::layout::NONE;
use crate::segment::{Offset, Segment};
use crate::stats::ContainerStats;
use crate::sync::RawShmMutex;

const LIST_HEADER_NAME: &str = "list_header";

/// `#[repr(C)]` header for a List/Queue/Stack instance, living at a fixed
/// offset reserved via the segment's named-object directory.
#[repr(C)]
pub struct ListHeader {
    pub head: AtomicI64,
    pub tail: AtomicI64,
    pub size: AtomicU64,
    pub modified_at_ns: AtomicU64,
    pub mutex: RawShmMutex,
}

pub const LIST_HEADER_SIZE: usize = std::mem::size_of::<ListHeader>();

/// Single-slot sequential-access cache: `(last_index, last_offset)`,
/// accelerating `±1` traversals. Process-local; never persisted, never
/// shared across processes — each opener keeps its own.
#[derive(Clone, Copy)]
struct SeqCache {
    index: usize,
    offset: Offset,
}

/// A persistent, cross-process doubly linked list.
pub struct PersistentList {
    segment: Segment,
    header_offset: Offset,
    seq_cache: LocalMutex<Option<SeqCache>>,
    stats: ContainerStats,
}

impl PersistentList {
    pub fn create_or_open(
        path: impl AsRef<std::path::Path>,
        initial_size_bytes: u64,
        create_new: bool,
    ) -> Result<Self> {
        let segment = Segment::create_or_open(path, initial_size_bytes, create_new)?;

        let header_offset = match segment.find_named(LIST_HEADER_NAME)? {
            Some(off) => off,
            None => {
                let off = segment.allocate(LIST_HEADER_SIZE)?;
                let header = unsafe { &mut *(segment.base_mut_ptr().add(off as usize) as *mut ListHeader) };
                header.head.store(NONE, Ordering::Release);
                header.tail.store(NONE, Ordering::Release);
                header.size.store(0, Ordering::Release);
                header.modified_at_ns.store(crate::clock::now_nanos(), Ordering::Release);
                unsafe { header.mutex.init()? };
                segment.reserve_named(LIST_HEADER_NAME, off)?;
                off
            }
        };

        Ok(PersistentList {
            segment,
            header_offset,
            seq_cache: LocalMutex::new(None),
            stats: ContainerStats::default(),
        })
    }

    fn header(&self) -> &ListHeader {
        unsafe { &*(self.segment.base_ptr().add(self.header_offset as usize) as *const ListHeader) }
    }

    fn base(&self) -> *const u8 {
        self.segment.base_ptr()
    }

    fn base_mut(&self) -> *mut u8 {
        self.segment.base_mut_ptr()
    }

    fn touch_modified(&self, header: &ListHeader) {
        header
            .modified_at_ns
            .store(crate::clock::now_nanos(), Ordering::Release);
    }

    // ---- node allocation ------------------------------------------------

    fn alloc_node(&self, payload: &[u8], ttl_secs: i64) -> Result<Offset> {
        if payload.is_empty() {
            return Err(Error::InvalidArgument("payload must not be empty".into()));
        }
        let offset = self.segment.allocate(total_size(payload.len()))?;
        let node = unsafe { node_at_mut(self.base_mut(), offset) };
        node.init_links();
        node.entry.init(hash32(payload), payload.len() as u32, ttl_secs);
        unsafe {
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                payload_at_mut(self.base_mut(), offset),
                payload.len(),
            );
        }
        Ok(offset)
    }

    fn free_node(&self, offset: Offset) {
        self.seq_cache_invalidate();
        self.segment.deallocate(offset);
    }

    fn seq_cache_invalidate(&self) {
        *self.seq_cache.lock() = None;
    }

    // ---- linkage (caller must hold the list mutex) -----------------------

    fn link_tail(&self, header: &ListHeader, offset: Offset) {
        let node = unsafe { node_at(self.base(), offset) };
        let old_tail = header.tail.load(Ordering::Acquire);
        node.set_prev(old_tail);
        node.set_next(NONE);
        if old_tail != NONE {
            unsafe { node_at(self.base(), old_tail) }.set_next(offset);
        } else {
            header.head.store(offset, Ordering::Release);
        }
        header.tail.store(offset, Ordering::Release);
        header.size.fetch_add(1, Ordering::AcqRel);
    }

    fn link_head(&self, header: &ListHeader, offset: Offset) {
        let node = unsafe { node_at(self.base(), offset) };
        let old_head = header.head.load(Ordering::Acquire);
        node.set_next(old_head);
        node.set_prev(NONE);
        if old_head != NONE {
            unsafe { node_at(self.base(), old_head) }.set_prev(offset);
        } else {
            header.tail.store(offset, Ordering::Release);
        }
        header.head.store(offset, Ordering::Release);
        header.size.fetch_add(1, Ordering::AcqRel);
        // A head prepend shifts every existing live element's logical index
        // by one; unlike a tail append, the cache can't stay valid.
        self.seq_cache_invalidate();
    }

    /// Insert `offset` immediately before `before`, an existing linked
    /// node. Used by `add_at`.
    fn link_before(&self, header: &ListHeader, before: Offset, offset: Offset) {
        let before_node = unsafe { node_at(self.base(), before) };
        let prev = before_node.prev();
        let node = unsafe { node_at(self.base(), offset) };
        node.set_prev(prev);
        node.set_next(before);
        before_node.set_prev(offset);
        if prev != NONE {
            unsafe { node_at(self.base(), prev) }.set_next(offset);
        } else {
            header.head.store(offset, Ordering::Release);
        }
        header.size.fetch_add(1, Ordering::AcqRel);
    }

    /// Splice `offset` into the slot currently occupied by `old`, without
    /// touching `old`'s own prev/next (caller unlinks `old` separately).
    /// Used by `set` when the new payload does not fit the old node.
    fn replace_node(&self, header: &ListHeader, old: Offset, offset: Offset) {
        let old_node = unsafe { node_at(self.base(), old) };
        let prev = old_node.prev();
        let next = old_node.next();
        let node = unsafe { node_at(self.base(), offset) };
        node.set_prev(prev);
        node.set_next(next);
        if prev != NONE {
            unsafe { node_at(self.base(), prev) }.set_next(offset);
        } else {
            header.head.store(offset, Ordering::Release);
        }
        if next != NONE {
            unsafe { node_at(self.base(), next) }.set_prev(offset);
        } else {
            header.tail.store(offset, Ordering::Release);
        }
    }

    fn unlink(&self, header: &ListHeader, offset: Offset) {
        let node = unsafe { node_at(self.base(), offset) };
        let prev = node.prev();
        let next = node.next();
        if prev != NONE {
            unsafe { node_at(self.base(), prev) }.set_next(next);
        } else {
            header.head.store(next, Ordering::Release);
        }
        if next != NONE {
            unsafe { node_at(self.base(), next) }.set_prev(prev);
        } else {
            header.tail.store(prev, Ordering::Release);
        }
        header.size.fetch_sub(1, Ordering::AcqRel);
        self.seq_cache_invalidate();
    }

    // ---- traversal (caller must hold the list mutex) ---------------------

    fn next_live(&self, from: Offset) -> Option<Offset> {
        let mut cur = unsafe { node_at(self.base(), from) }.next();
        while cur != NONE {
            let node = unsafe { node_at(self.base(), cur) };
            if node.entry.is_alive() {
                return Some(cur);
            }
            cur = node.next();
        }
        None
    }

    fn prev_live(&self, from: Offset) -> Option<Offset> {
        let mut cur = unsafe { node_at(self.base(), from) }.prev();
        while cur != NONE {
            let node = unsafe { node_at(self.base(), cur) };
            if node.entry.is_alive() {
                return Some(cur);
            }
            cur = node.prev();
        }
        None
    }

    fn first_live(&self, header: &ListHeader) -> Option<Offset> {
        let mut cur = header.head.load(Ordering::Acquire);
        while cur != NONE {
            let node = unsafe { node_at(self.base(), cur) };
            if node.entry.is_alive() {
                return Some(cur);
            }
            cur = node.next();
        }
        None
    }

    fn last_live(&self, header: &ListHeader) -> Option<Offset> {
        let mut cur = header.tail.load(Ordering::Acquire);
        while cur != NONE {
            let node = unsafe { node_at(self.base(), cur) };
            if node.entry.is_alive() {
                return Some(cur);
            }
            cur = node.prev();
        }
        None
    }

    /// Resolve a logical index (over live elements only) to a physical
    /// offset, consulting the sequential-access cache for `±1` requests
    /// before falling back to a forward scan from the head. §9 calls the
    /// cache "a tiny optimisation, not a required invariant"; this crate
    /// does not attempt the head-vs-tail nearer-end heuristic because
    /// choosing correctly would itself require an O(n) pre-pass to learn
    /// the live count, which defeats the purpose for the common case of
    /// sequential iteration (the cache already covers that case).
    fn locate(&self, header: &ListHeader, index: usize) -> Option<Offset> {
        {
            let cache = self.seq_cache.lock();
            if let Some(c) = *cache {
                if index == c.index + 1 {
                    if let Some(off) = self.next_live(c.offset) {
                        drop(cache);
                        *self.seq_cache.lock() = Some(SeqCache { index, offset: off });
                        return Some(off);
                    }
                } else if c.index > 0 && index == c.index - 1 {
                    if let Some(off) = self.prev_live(c.offset) {
                        drop(cache);
                        *self.seq_cache.lock() = Some(SeqCache { index, offset: off });
                        return Some(off);
                    }
                } else if index == c.index {
                    // Expiry is passive: the cached node may have expired
                    // since it was recorded, with no mutation to invalidate
                    // the cache. A dead cached node is treated as a miss.
                    if unsafe { node_at(self.base(), c.offset) }.entry.is_alive() {
                        return Some(c.offset);
                    }
                }
            }
        }

        let mut cur = self.first_live(header)?;
        let mut i = 0usize;
        loop {
            if i == index {
                *self.seq_cache.lock() = Some(SeqCache { index, offset: cur });
                return Some(cur);
            }
            match self.next_live(cur) {
                Some(next) => {
                    cur = next;
                    i += 1;
                }
                None => return None,
            }
        }
    }

    fn payload_vec(&self, offset: Offset) -> Vec<u8> {
        let node = unsafe { node_at(self.base(), offset) };
        let len = node.entry.data_size as usize;
        unsafe { std::slice::from_raw_parts(payload_at(self.base(), offset), len).to_vec() }
    }

    fn payload_eq(&self, offset: Offset, other: &[u8]) -> bool {
        let node = unsafe { node_at(self.base(), offset) };
        if node.entry.data_size as usize != other.len() {
            return false;
        }
        if node.entry.hash_code != hash32(other) {
            return false;
        }
        let slice = unsafe { std::slice::from_raw_parts(payload_at(self.base(), offset), other.len()) };
        slice == other
    }

    // ---- public API -------------------------------------------------------

    pub fn add(&self, payload: &[u8], ttl_secs: i64) -> Result<()> {
        let offset = self.alloc_node(payload, ttl_secs)?;
        let header = self.header();
        let _guard = header.mutex.guard();
        self.link_tail(header, offset);
        self.touch_modified(header);
        self.stats.record_write();
        Ok(())
    }

    pub fn add_first(&self, payload: &[u8], ttl_secs: i64) -> Result<()> {
        let offset = self.alloc_node(payload, ttl_secs)?;
        let header = self.header();
        let _guard = header.mutex.guard();
        self.link_head(header, offset);
        self.touch_modified(header);
        self.stats.record_write();
        Ok(())
    }

    pub fn add_at(&self, index: usize, payload: &[u8], ttl_secs: i64) -> Result<bool> {
        let header = self.header();
        let _guard = header.mutex.guard();

        let live_size = self.live_count(header);
        if index > live_size {
            return Ok(false);
        }
        if index == live_size {
            drop(_guard);
            self.add(payload, ttl_secs)?;
            return Ok(true);
        }

        let before = self.locate(header, index).expect("index < live_size");
        let offset = self.alloc_node(payload, ttl_secs)?;
        self.link_before(header, before, offset);
        self.touch_modified(header);
        self.seq_cache_invalidate();
        Ok(true)
    }

    pub fn get(&self, index: usize) -> Option<Vec<u8>> {
        let header = self.header();
        let _guard = header.mutex.guard();
        let offset = self.locate(header, index);
        self.stats.record_read(offset.is_some());
        Some(self.payload_vec(offset?))
    }

    pub fn get_first(&self) -> Option<Vec<u8>> {
        let header = self.header();
        let _guard = header.mutex.guard();
        let offset = self.first_live(header)?;
        Some(self.payload_vec(offset))
    }

    pub fn get_last(&self) -> Option<Vec<u8>> {
        let header = self.header();
        let _guard = header.mutex.guard();
        let offset = self.last_live(header)?;
        Some(self.payload_vec(offset))
    }

    /// Update the element at `index`. Returns `false` when `index` is out
    /// of range. If `payload.len()` matches the stored size, the update
    /// happens in place; otherwise a new node is allocated, spliced into
    /// the old node's linkage, and the old node is freed.
    pub fn set(&self, index: usize, payload: &[u8], ttl_secs: i64) -> Result<bool> {
        if payload.is_empty() {
            return Err(Error::InvalidArgument("payload must not be empty".into()));
        }
        let header = self.header();
        let _guard = header.mutex.guard();
        let Some(offset) = self.locate(header, index) else {
            return Ok(false);
        };

        let node = unsafe { node_at_mut(self.base_mut(), offset) };
        if node.entry.data_size as usize == payload.len() {
            node.entry.init(hash32(payload), payload.len() as u32, ttl_secs);
            unsafe {
                std::ptr::copy_nonoverlapping(
                    payload.as_ptr(),
                    payload_at_mut(self.base_mut(), offset),
                    payload.len(),
                );
            }
        } else {
            let new_offset = self.alloc_node(payload, ttl_secs)?;
            self.replace_node(header, offset, new_offset);
            self.free_node(offset);
        }
        self.touch_modified(header);
        Ok(true)
    }

    pub fn set_ttl(&self, index: usize, ttl_secs: i64) -> bool {
        let header = self.header();
        let _guard = header.mutex.guard();
        match self.locate(header, index) {
            Some(offset) => {
                unsafe { node_at_mut(self.base_mut(), offset) }.entry.set_ttl(ttl_secs);
                self.touch_modified(header);
                true
            }
            None => false,
        }
    }

    fn remove_at_offset(&self, header: &ListHeader, offset: Offset) -> Vec<u8> {
        let payload = self.payload_vec(offset);
        unsafe { node_at(self.base(), offset) }.entry.mark_deleted();
        self.unlink(header, offset);
        self.touch_modified(header);
        self.free_node(offset);
        payload
    }

    pub fn remove(&self, index: usize) -> Option<Vec<u8>> {
        let header = self.header();
        let _guard = header.mutex.guard();
        let offset = self.locate(header, index)?;
        Some(self.remove_at_offset(header, offset))
    }

    pub fn remove_first(&self) -> Option<Vec<u8>> {
        let header = self.header();
        let _guard = header.mutex.guard();
        let offset = self.first_live(header)?;
        Some(self.remove_at_offset(header, offset))
    }

    pub fn remove_last(&self) -> Option<Vec<u8>> {
        let header = self.header();
        let _guard = header.mutex.guard();
        let offset = self.last_live(header)?;
        Some(self.remove_at_offset(header, offset))
    }

    pub fn remove_element(&self, payload: &[u8]) -> bool {
        let header = self.header();
        let _guard = header.mutex.guard();
        let Some(mut cur) = self.first_live(header) else {
            return false;
        };
        loop {
            if self.payload_eq(cur, payload) {
                self.remove_at_offset(header, cur);
                return true;
            }
            match self.next_live(cur) {
                Some(next) => cur = next,
                None => return false,
            }
        }
    }

    /// Sweep head-to-tail unlinking and freeing every expired node.
    /// Returns the count reclaimed.
    pub fn remove_expired(&self) -> usize {
        let header = self.header();
        let _guard = header.mutex.guard();
        let mut count = 0usize;
        let mut cur = header.head.load(Ordering::Acquire);
        while cur != NONE {
            let node = unsafe { node_at(self.base(), cur) };
            let next = node.next();
            if node.entry.is_expired() {
                node.entry.mark_deleted();
                self.unlink(header, cur);
                self.free_node(cur);
                count += 1;
            }
            cur = next;
        }
        if count > 0 {
            self.touch_modified(header);
            self.stats.record_expirations_reclaimed(count);
        }
        count
    }

    pub fn contains(&self, payload: &[u8]) -> bool {
        self.index_of(payload).is_some()
    }

    pub fn index_of(&self, payload: &[u8]) -> Option<usize> {
        let header = self.header();
        let _guard = header.mutex.guard();
        let mut cur = self.first_live(header)?;
        let mut i = 0usize;
        loop {
            if self.payload_eq(cur, payload) {
                return Some(i);
            }
            match self.next_live(cur) {
                Some(next) => {
                    cur = next;
                    i += 1;
                }
                None => return None,
            }
        }
    }

    pub fn last_index_of(&self, payload: &[u8]) -> Option<usize> {
        let header = self.header();
        let _guard = header.mutex.guard();
        let mut found = None;
        let mut cur = self.first_live(header)?;
        let mut i = 0usize;
        loop {
            if self.payload_eq(cur, payload) {
                found = Some(i);
            }
            match self.next_live(cur) {
                Some(next) => {
                    cur = next;
                    i += 1;
                }
                None => break,
            }
        }
        found
    }

    pub fn clear(&self) {
        let header = self.header();
        let _guard = header.mutex.guard();
        let mut cur = header.head.load(Ordering::Acquire);
        while cur != NONE {
            let node = unsafe { node_at(self.base(), cur) };
            let next = node.next();
            node.entry.mark_deleted();
            self.segment.deallocate(cur);
            cur = next;
        }
        header.head.store(NONE, Ordering::Release);
        header.tail.store(NONE, Ordering::Release);
        header.size.store(0, Ordering::Release);
        self.touch_modified(header);
        self.seq_cache_invalidate();
    }

    /// Live element count — walks the full list, per §4.3: the persistent
    /// `size` field counts *all* linked nodes including not-yet-reclaimed
    /// expired ones, so the public accessor must recount.
    pub fn size(&self) -> usize {
        let header = self.header();
        let _guard = header.mutex.guard();
        self.live_count(header)
    }

    fn live_count(&self, header: &ListHeader) -> usize {
        let mut count = 0usize;
        let mut cur = header.head.load(Ordering::Acquire);
        while cur != NONE {
            let node = unsafe { node_at(self.base(), cur) };
            if node.entry.is_alive() {
                count += 1;
            }
            cur = node.next();
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        let header = self.header();
        let _guard = header.mutex.guard();
        self.first_live(header).is_none()
    }

    /// Enumerate live nodes head-to-tail. `cb` returning `false` halts
    /// iteration early. The list mutex is held for the whole call — per
    /// §4.2's scoped-acquisition rule, a panicking callback still releases
    /// it via the guard's `Drop`.
    pub fn for_each(&self, mut cb: impl FnMut(&[u8]) -> bool) {
        let header = self.header();
        let _guard = header.mutex.guard();
        let Some(mut cur) = self.first_live(header) else {
            return;
        };
        loop {
            let payload = self.payload_vec(cur);
            if !cb(&payload) {
                return;
            }
            match self.next_live(cur) {
                Some(next) => cur = next,
                None => return,
            }
        }
    }

    pub fn for_each_with_ttl(&self, mut cb: impl FnMut(&[u8], i64) -> bool) {
        let header = self.header();
        let _guard = header.mutex.guard();
        let Some(mut cur) = self.first_live(header) else {
            return;
        };
        loop {
            let node = unsafe { node_at(self.base(), cur) };
            let ttl = node.entry.remaining_ttl_seconds();
            let payload = self.payload_vec(cur);
            if !cb(&payload, ttl) {
                return;
            }
            match self.next_live(cur) {
                Some(next) => cur = next,
                None => return,
            }
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.stats.log_summary("list");
        self.segment.flush()
    }
}

unsafe impl Send for PersistentList {}
unsafe impl Sync for PersistentList {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn list(tmp: &tempfile::TempDir, name: &str) -> PersistentList {
        PersistentList::create_or_open(tmp.path().join(name), 1 << 20, true).unwrap()
    }

    #[test]
    fn basic_order_matches_literal_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        let l = list(&tmp, "l.bin");
        l.add(b"Hello", -1).unwrap();
        l.add(b"World", -1).unwrap();
        l.add(b"FastCollection", -1).unwrap();
        l.add(b"is", -1).unwrap();
        l.add(b"awesome!", -1).unwrap();

        assert_eq!(l.size(), 5);
        assert_eq!(l.get(0).unwrap(), b"Hello");
        assert_eq!(l.get(4).unwrap(), b"awesome!");
        assert_eq!(l.index_of(b"FastCollection"), Some(2));
        assert!(!l.contains(b"Java"));

        assert_eq!(l.remove(1).unwrap(), b"World");
        assert_eq!(l.size(), 4);
        assert_eq!(l.get(1).unwrap(), b"FastCollection");
    }

    #[test]
    fn add_at_boundaries() {
        let tmp = tempfile::tempdir().unwrap();
        let l = list(&tmp, "l.bin");
        l.add(b"a", -1).unwrap();
        l.add(b"c", -1).unwrap();
        assert!(l.add_at(1, b"b", -1).unwrap());
        assert_eq!(l.get(0).unwrap(), b"a");
        assert_eq!(l.get(1).unwrap(), b"b");
        assert_eq!(l.get(2).unwrap(), b"c");
        assert!(!l.add_at(10, b"z", -1).unwrap());
        assert!(l.add_at(3, b"d", -1).unwrap());
        assert_eq!(l.get(3).unwrap(), b"d");
    }

    #[test]
    fn ttl_expiry_is_lazily_invisible() {
        let tmp = tempfile::tempdir().unwrap();
        let l = list(&tmp, "l.bin");
        l.add(b"temp", 1).unwrap();
        assert_eq!(l.size(), 1);
        sleep(Duration::from_millis(1100));
        assert_eq!(l.size(), 0);
        assert_eq!(l.get_first(), None);
    }

    #[test]
    fn remove_expired_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let l = list(&tmp, "l.bin");
        l.add(b"temp", 1).unwrap();
        l.add(b"keep", -1).unwrap();
        sleep(Duration::from_millis(1100));
        assert_eq!(l.remove_expired(), 1);
        assert_eq!(l.remove_expired(), 0);
        assert_eq!(l.size(), 1);
        assert_eq!(l.get_first().unwrap(), b"keep");
    }

    #[test]
    fn set_with_same_size_is_in_place_and_different_size_splices() {
        let tmp = tempfile::tempdir().unwrap();
        let l = list(&tmp, "l.bin");
        l.add(b"abc", -1).unwrap();
        assert!(l.set(0, b"xyz", -1).unwrap());
        assert_eq!(l.get(0).unwrap(), b"xyz");
        assert!(l.set(0, b"longer-value", -1).unwrap());
        assert_eq!(l.get(0).unwrap(), b"longer-value");
        assert_eq!(l.size(), 1);
    }

    #[test]
    fn sequential_cache_survives_forward_iteration() {
        let tmp = tempfile::tempdir().unwrap();
        let l = list(&tmp, "l.bin");
        for i in 0..10u8 {
            l.add(&[i], -1).unwrap();
        }
        for i in 0..10usize {
            assert_eq!(l.get(i).unwrap(), vec![i as u8]);
        }
    }

    #[test]
    fn add_first_invalidates_sequential_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let l = list(&tmp, "l.bin");
        l.add(b"a", -1).unwrap();
        l.add(b"b", -1).unwrap();
        l.add(b"c", -1).unwrap();
        assert_eq!(l.get(1).unwrap(), b"b");

        l.add_first(b"z", -1).unwrap();
        assert_eq!(l.get(1).unwrap(), b"a");
        assert_eq!(l.get(0).unwrap(), b"z");
        assert_eq!(l.get(3).unwrap(), b"c");
    }

    #[test]
    fn same_index_cache_hit_skips_expired_node() {
        let tmp = tempfile::tempdir().unwrap();
        let l = list(&tmp, "l.bin");
        l.add(b"a", 1).unwrap();
        l.add(b"b", -1).unwrap();
        assert_eq!(l.get(0).unwrap(), b"a");

        sleep(Duration::from_millis(1100));
        assert_eq!(l.get(0).unwrap(), b"b");
    }

    #[test]
    fn reopen_round_trips_live_payloads() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reopen.bin");
        {
            let l = PersistentList::create_or_open(&path, 1 << 20, true).unwrap();
            l.add(b"a", -1).unwrap();
            l.add(b"b", -1).unwrap();
            l.flush().unwrap();
        }
        let l2 = PersistentList::create_or_open(&path, 1 << 20, false).unwrap();
        assert_eq!(l2.size(), 2);
        assert_eq!(l2.get(0).unwrap(), b"a");
        assert_eq!(l2.get(1).unwrap(), b"b");
    }
}
