/// The Mapped Segment Manager — opens or creates the backing file, maps it,
/// and exposes a named-object directory plus a variable-size allocator
/// operating inside the mapping.
///
/// Grounded on the teacher's `shm::region::ShmRegion` (file creation,
/// zeroing, magic validation, `MmapMut`) generalized from a single fixed
/// slab of identically sized slots to a free-list allocator serving
/// variable-size node allocations, the way the pack's allocator-shaped
/// examples (`elfmalloc`, `mimalloc-rs`) size and header each block.
pub mod layout;

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use memmap2::MmapMut;

use crate::error::{Error, Result};
use layout::{
    align_up, BlockHeader, NamedObjectSlot, SegmentHeader, BLOCK_HEADER_SIZE, MAGIC,
    MIN_ALLOC_SIZE, NAMED_OBJECT_SLOTS, NAME_TAG_LEN, NONE, SEGMENT_HEADER_SIZE,
};

/// A byte offset from the mapping base. `NONE` means "no object".
pub type Offset = i64;

pub struct Segment {
    mmap: MmapMut,
    path: PathBuf,
}

impl Segment {
    /// Create or open the backing file at `path`.
    ///
    /// If `create_new` is true, any existing file is truncated and
    /// reinitialized. Otherwise an existing file is attached to; if none
    /// exists, a fresh one is created with `initial_size_bytes`.
    pub fn create_or_open(path: impl AsRef<Path>, initial_size_bytes: u64, create_new: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let exists = path.exists();

        if create_new || !exists {
            Self::create(&path, initial_size_bytes)
        } else {
            Self::open(&path)
        }
    }

    fn create(path: &Path, initial_size_bytes: u64) -> Result<Self> {
        if initial_size_bytes < SEGMENT_HEADER_SIZE as u64 + MIN_ALLOC_SIZE as u64 {
            return Err(Error::InvalidArgument(format!(
                "initial_size_bytes {initial_size_bytes} too small for a segment header"
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(initial_size_bytes)?;

        // Safety: we just created and own this file exclusively.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        mmap.fill(0);

        let arena_offset = SEGMENT_HEADER_SIZE as u64;
        let arena_size = initial_size_bytes - arena_offset;

        {
            let header = unsafe { &mut *(mmap.as_mut_ptr() as *mut SegmentHeader) };
            header.magic = MAGIC;
            header.version = 1;
            header.file_size = initial_size_bytes;
            header.arena_offset = arena_offset;
            header.arena_size = arena_size;
            header.bump_cursor = 0;
            header.free_list_head = NONE;
            for slot in header.directory.iter_mut() {
                slot.used = 0;
                slot.offset = NONE;
            }
            unsafe { header.alloc_mutex.init()? };
        }

        mmap.flush()?;

        debug!(
            "created segment at {} ({} bytes, arena {} bytes)",
            path.display(),
            initial_size_bytes,
            arena_size
        );

        Ok(Segment {
            mmap,
            path: path.to_path_buf(),
        })
    }

    fn open(path: &Path) -> Result<Self> {
        let file = fs::OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        if mmap.len() < SEGMENT_HEADER_SIZE {
            return Err(Error::CorruptedState(
                "file shorter than segment header".into(),
            ));
        }

        let header = unsafe { &*(mmap.as_ptr() as *const SegmentHeader) };
        if header.magic != MAGIC {
            warn!("refusing to open {}: bad magic", path.display());
            return Err(Error::CorruptedState("bad magic".into()));
        }
        if header.version != 1 {
            return Err(Error::CorruptedState(format!(
                "unsupported version {}",
                header.version
            )));
        }
        if header.file_size as usize != mmap.len() {
            return Err(Error::CorruptedState(
                "header file_size does not match actual file length".into(),
            ));
        }

        debug!("opened existing segment at {}", path.display());

        Ok(Segment {
            mmap,
            path: path.to_path_buf(),
        })
    }

    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn base_mut_ptr(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }

    #[inline]
    pub fn header(&self) -> &SegmentHeader {
        unsafe { &*(self.base_ptr() as *const SegmentHeader) }
    }

    #[inline]
    fn header_mut(&self) -> &mut SegmentHeader {
        unsafe { &mut *(self.base_mut_ptr() as *mut SegmentHeader) }
    }

    pub fn flush(&self) -> Result<()> {
        // `flush` takes `&self` on `MmapMut` via the inherent method, which
        // requires unique access in spirit though not in the type system;
        // every mutation path here already holds the allocator/list/bucket
        // mutex before touching bytes, so concurrent flush is safe.
        let mmap_ptr = &self.mmap as *const MmapMut as *mut MmapMut;
        unsafe { (*mmap_ptr).flush()? };
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ---- named-object directory ----------------------------------------

    fn tag_bytes(name: &str) -> Result<[u8; NAME_TAG_LEN]> {
        if name.is_empty() || name.len() > NAME_TAG_LEN {
            return Err(Error::InvalidArgument(format!(
                "named-object tag must be 1..={NAME_TAG_LEN} bytes, got {}",
                name.len()
            )));
        }
        let mut tag = [0u8; NAME_TAG_LEN];
        tag[..name.len()].copy_from_slice(name.as_bytes());
        Ok(tag)
    }

    /// Look up a previously registered named object.
    pub fn find_named(&self, name: &str) -> Result<Option<Offset>> {
        let tag = Self::tag_bytes(name)?;
        let header = self.header();
        for slot in header.directory.iter() {
            if slot.used != 0 && slot.tag == tag {
                return Ok(Some(slot.offset));
            }
        }
        Ok(None)
    }

    /// Register `name` pointing at `offset`. The first process to open a
    /// fresh file is expected to have already allocated the object and
    /// call this once; later attaches call [`Segment::find_named`] instead.
    pub fn reserve_named(&self, name: &str, offset: Offset) -> Result<()> {
        let tag = Self::tag_bytes(name)?;
        let header = self.header_mut();
        for slot in header.directory.iter_mut() {
            if slot.used != 0 && slot.tag == tag {
                return Err(Error::InvalidArgument(format!(
                    "named object '{name}' already registered"
                )));
            }
        }
        for slot in header.directory.iter_mut() {
            if slot.used == 0 {
                slot.tag = tag;
                slot.offset = offset;
                slot.used = 1;
                return Ok(());
            }
        }
        Err(Error::CorruptedState(format!(
            "named-object directory full (capacity {NAMED_OBJECT_SLOTS})"
        )))
    }

    // ---- allocator --------------------------------------------------------

    fn arena_ptr(&self) -> *mut u8 {
        unsafe { self.base_mut_ptr().add(self.header().arena_offset as usize) }
    }

    fn block_header_at(&self, rel_offset: u64) -> *mut BlockHeader {
        unsafe { self.arena_ptr().add(rel_offset as usize) as *mut BlockHeader }
    }

    /// Free-list node layout when a block is not in use: the first 8 bytes
    /// of its usable region hold the next free block's relative offset
    /// (`NONE` terminates the list).
    fn free_next_at(&self, usable_rel_offset: u64) -> *mut i64 {
        unsafe { self.arena_ptr().add(usable_rel_offset as usize) as *mut i64 }
    }

    /// Allocate `len` usable bytes from the arena. Returns an absolute
    /// offset from the mapping base to the usable region (not the block
    /// header). Fails with [`Error::OutOfMemory`] when neither the free
    /// list nor the bump cursor can serve the request — this segment
    /// manager never grows the mapping, matching §9's "no automatic
    /// resizing".
    pub fn allocate(&self, len: usize) -> Result<Offset> {
        if len == 0 {
            return Err(Error::InvalidArgument("allocate(0) is not permitted".into()));
        }
        let want = align_up(len.max(MIN_ALLOC_SIZE), 8);
        let header = self.header_mut();
        let _guard = header.alloc_mutex.guard();

        // First-fit scan of the free list.
        let mut prev_rel: Option<u64> = None;
        let mut cursor = header.free_list_head;
        while cursor != NONE {
            let rel = cursor as u64;
            let block = unsafe { &mut *self.block_header_at(rel) };
            let usable_rel = rel + BLOCK_HEADER_SIZE as u64;
            let next = unsafe { *self.free_next_at(usable_rel) };

            if block.size as usize >= want {
                // Unlink from the free list.
                match prev_rel {
                    Some(p) => unsafe {
                        *self.free_next_at(p + BLOCK_HEADER_SIZE as u64) = next;
                    },
                    None => header.free_list_head = next,
                }

                let remainder = block.size as usize - want;
                if remainder >= BLOCK_HEADER_SIZE + MIN_ALLOC_SIZE {
                    // Split: shrink this block, push the tail back onto the
                    // free list immediately so it's available to the next
                    // allocation.
                    block.size = want as u64;
                    let tail_rel = rel + BLOCK_HEADER_SIZE as u64 + want as u64;
                    let tail_size = remainder - BLOCK_HEADER_SIZE;
                    let tail_block = unsafe { &mut *self.block_header_at(tail_rel) };
                    tail_block.size = tail_size as u64;
                    unsafe {
                        *self.free_next_at(tail_rel + BLOCK_HEADER_SIZE as u64) =
                            header.free_list_head;
                    }
                    header.free_list_head = tail_rel as i64;
                }

                let abs = header.arena_offset + usable_rel;
                return Ok(abs as Offset);
            }

            prev_rel = Some(rel);
            cursor = next;
        }

        // Bump-pointer fallback.
        let needed = BLOCK_HEADER_SIZE as u64 + want as u64;
        if header.bump_cursor + needed > header.arena_size {
            let available = header.arena_size.saturating_sub(header.bump_cursor) as usize;
            warn!(
                "segment {} out of memory: requested {want}, available {available}",
                self.path.display()
            );
            return Err(Error::OutOfMemory {
                requested: want,
                available: available.saturating_sub(BLOCK_HEADER_SIZE.min(available)),
            });
        }

        let rel = header.bump_cursor;
        header.bump_cursor += needed;
        let block = unsafe { &mut *self.block_header_at(rel) };
        block.size = want as u64;

        let abs = header.arena_offset + rel + BLOCK_HEADER_SIZE as u64;
        Ok(abs as Offset)
    }

    /// Return a previously allocated region to the free list. `offset` must
    /// be a value previously returned by [`Segment::allocate`] on this
    /// segment and not already freed.
    pub fn deallocate(&self, offset: Offset) {
        let header = self.header_mut();
        let _guard = header.alloc_mutex.guard();

        let rel = offset as u64 - header.arena_offset - BLOCK_HEADER_SIZE as u64;
        let block_rel = rel;
        let usable_rel = block_rel + BLOCK_HEADER_SIZE as u64;

        // Best-effort right-neighbor coalescing: if the block immediately
        // following this one is already free and adjacent, fold it in
        // rather than pushing two separate free entries. Left-coalescing
        // would need a boundary tag this layout doesn't carry; see
        // DESIGN.md for why that asymmetry is accepted.
        let block = unsafe { &mut *self.block_header_at(block_rel) };
        let mut size = block.size;
        let next_block_rel = block_rel + BLOCK_HEADER_SIZE as u64 + size;
        if next_block_rel < header.bump_cursor {
            if let Some((prev_of_next, next_size)) =
                self.find_in_free_list(header, next_block_rel)
            {
                // Unlink the neighbor from the free list, then absorb it.
                let neighbor_next = unsafe {
                    *self.free_next_at(next_block_rel + BLOCK_HEADER_SIZE as u64)
                };
                match prev_of_next {
                    Some(p) => unsafe {
                        *self.free_next_at(p + BLOCK_HEADER_SIZE as u64) = neighbor_next;
                    },
                    None => header.free_list_head = neighbor_next,
                }
                size += BLOCK_HEADER_SIZE as u64 + next_size;
                block.size = size;
            }
        }

        unsafe {
            *self.free_next_at(usable_rel) = header.free_list_head;
        }
        header.free_list_head = block_rel as i64;
    }

    /// Search the free list for a block starting at relative offset
    /// `target_rel`, returning `(relative offset of its predecessor in the
    /// list, its size)` if found.
    fn find_in_free_list(
        &self,
        header: &SegmentHeader,
        target_rel: u64,
    ) -> Option<(Option<u64>, u64)> {
        let mut prev: Option<u64> = None;
        let mut cursor = header.free_list_head;
        while cursor != NONE {
            let rel = cursor as u64;
            if rel == target_rel {
                let block = unsafe { &*self.block_header_at(rel) };
                return Some((prev, block.size));
            }
            let usable_rel = rel + BLOCK_HEADER_SIZE as u64;
            let next = unsafe { *self.free_next_at(usable_rel) };
            prev = Some(rel);
            cursor = next;
        }
        None
    }
}

unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(tmp: &tempfile::TempDir, name: &str) -> PathBuf {
        tmp.path().join(name)
    }

    #[test]
    fn create_then_reopen_round_trips_header() {
        let _ = env_logger::try_init();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp_path(&tmp, "seg.bin");
        {
            let seg = Segment::create_or_open(&path, 64 * 1024, true).unwrap();
            assert_eq!(seg.header().magic, MAGIC);
        }
        let seg = Segment::create_or_open(&path, 64 * 1024, false).unwrap();
        assert_eq!(seg.header().magic, MAGIC);
    }

    #[test]
    fn opening_corrupted_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp_path(&tmp, "bad.bin");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();
        let err = Segment::open(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptedState(_)));
    }

    #[test]
    fn allocate_and_deallocate_reuses_space() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp_path(&tmp, "alloc.bin");
        let seg = Segment::create_or_open(&path, 4096, true).unwrap();

        let a = seg.allocate(32).unwrap();
        let b = seg.allocate(32).unwrap();
        assert_ne!(a, b);

        seg.deallocate(a);
        let c = seg.allocate(32).unwrap();
        assert_eq!(a, c, "freed block should be reused by first-fit");
    }

    #[test]
    fn allocate_fails_when_arena_exhausted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp_path(&tmp, "oom.bin");
        let seg = Segment::create_or_open(&path, 512, true).unwrap();
        let mut last = Ok(0);
        for _ in 0..64 {
            last = seg.allocate(32);
            if last.is_err() {
                break;
            }
        }
        assert!(matches!(last, Err(Error::OutOfMemory { .. })));
    }

    #[test]
    fn named_object_directory_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp_path(&tmp, "names.bin");
        let seg = Segment::create_or_open(&path, 4096, true).unwrap();
        assert_eq!(seg.find_named("list_header").unwrap(), None);
        seg.reserve_named("list_header", 128).unwrap();
        assert_eq!(seg.find_named("list_header").unwrap(), Some(128));
        assert!(seg.reserve_named("list_header", 256).is_err());
    }
}
