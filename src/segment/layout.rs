/// `#[repr(C)]` structures that live at the front of the mapped file.
///
/// All structs use fixed-width integers and explicit padding so the layout
/// is identical across compilations and processes — the same discipline the
/// teacher's `shm::layout` module uses for its cache slab, generalized here
/// from a fixed-size slot slab to a variable-size arena with a named-object
/// directory in front of it.
use crate::sync::{RawShmMutex, MUTEX_SIZE};

/// Magic bytes at the start of the segment header, validating the mapping.
pub const MAGIC: [u8; 8] = *b"PMCOL001";

/// Sentinel meaning "no offset" wherever a signed byte offset is stored.
pub const NONE: i64 = -1;

/// Number of named-object slots in the directory. Each container kind
/// registers at most a header name and (for hash containers) a bucket-array
/// name, so eight slots is generous headroom without needing a growable
/// directory.
pub const NAMED_OBJECT_SLOTS: usize = 8;
pub const NAME_TAG_LEN: usize = 24;

/// One entry in the named-object directory.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NamedObjectSlot {
    pub tag: [u8; NAME_TAG_LEN],
    pub offset: i64,
    pub used: u32,
    pub _pad: u32,
}

pub const NAMED_OBJECT_SLOT_SIZE: usize = std::mem::size_of::<NamedObjectSlot>();

/// Fixed segment header at offset 0 of the mapping.
///
/// Fields are ordered largest-alignment-first to avoid implicit padding
/// inside `#[repr(C)]`, the same convention the teacher's `Header` uses.
#[repr(C)]
pub struct SegmentHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub _reserved0: u32,

    /// Total size of the mapping in bytes, including this header.
    pub file_size: u64,
    /// Offset (from the mapping base) where the free arena begins.
    pub arena_offset: u64,
    /// Size in bytes of the free arena.
    pub arena_size: u64,
    /// Next never-allocated byte within the arena, relative to `arena_offset`.
    pub bump_cursor: u64,
    /// Head of the allocator's free list, offset relative to `arena_offset`,
    /// `NONE` when empty.
    pub free_list_head: i64,

    pub directory: [NamedObjectSlot; NAMED_OBJECT_SLOTS],

    /// Protects `bump_cursor` and `free_list_head` across processes.
    pub alloc_mutex: RawShmMutex,

    pub _pad: [u8; 32],
}

pub const SEGMENT_HEADER_SIZE: usize = std::mem::size_of::<SegmentHeader>();

/// 8-byte size prefix written immediately before every allocation's usable
/// region. `deallocate` reads it back so callers never repeat the size.
#[repr(C)]
pub struct BlockHeader {
    /// Usable size in bytes (not counting this header).
    pub size: u64,
}

pub const BLOCK_HEADER_SIZE: usize = std::mem::size_of::<BlockHeader>();

/// Minimum usable size of any allocation — large enough to host the
/// singly-linked free-list pointer when the block is free.
pub const MIN_ALLOC_SIZE: usize = 16;

pub fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

const _: () = assert!(MUTEX_SIZE <= 64, "embedded mutex grew past its budget");
