use std::fmt;

/// Size of a boundary tag (header or footer) in bytes.
pub const WSIZE: usize = 4;

/// Double word. This is the overhead every block pays for its header and footer.
pub const DSIZE: usize = 8;

/// Every payload handed to the user is aligned to this many bytes.
pub const ALIGNMENT: usize = 8;

/// Size of the successor link a free block keeps in its payload. Links are
/// arena offsets stored as `u64`, so the layout does not depend on the target's
/// pointer width.
pub const LINK_SIZE: usize = 8;

/// Smallest block we can carve: header, footer and one successor link.
pub const MIN_BLOCK_SIZE: usize = DSIZE + LINK_SIZE;

/// Largest block size that still fits in a 32 bit boundary tag.
pub const MAX_BLOCK_SIZE: usize = (u32::MAX as usize) & !(ALIGNMENT - 1);

const ALLOC_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

const _: () = assert!(MIN_BLOCK_SIZE % ALIGNMENT == 0);

/// Handle to a block. It is the offset of the block's payload inside the arena,
/// which is also the value the allocator hands out to its callers.
///
/// This is the structure of a block, seen from its [`BlockPtr`]:
///
/// ```text
///              +---------------------+ <------+
///              |  size | alloc (4B)  |        | -> Header
/// BlockPtr --> +---------------------+ <------+
///              |      Payload        |        |
///              |        or           |        |
///              |  successor (8B)     |        | -> Payload (user data or free list link)
///              |        ...          |        |
///              +---------------------+ <------+
///              |  size | alloc (4B)  |        | -> Footer
///              +---------------------+ <------+
/// ```
///
/// The size stored in both tags is the total size of the block, header and
/// footer included. Sizes are always multiples of [`ALIGNMENT`], so we can steal
/// the lowest bit of the word to tell whether the block is allocated.
///
/// Having the footer replicate the header is what lets us walk backwards: the
/// word right before our header is the footer of the previous block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockPtr(usize);

impl BlockPtr {
    #[inline]
    pub(crate) const fn new(offset: usize) -> Self {
        Self(offset)
    }

    /// Offset of the payload from the start of the arena.
    #[inline]
    pub const fn offset(self) -> usize {
        self.0
    }

    /// Offset of the header word.
    #[inline]
    pub(crate) const fn header(self) -> usize {
        self.0 - WSIZE
    }

    /// Offset of the footer word, computed from the size in the header.
    #[inline]
    pub(crate) fn footer(self, heap: &[u8]) -> usize {
        self.0 + block_size(heap, self) - DSIZE
    }

    /// The block physically after this one.
    #[inline]
    pub(crate) fn next(self, heap: &[u8]) -> BlockPtr {
        BlockPtr(self.0 + block_size(heap, self))
    }

    /// The block physically before this one, found through its footer.
    #[inline]
    pub(crate) fn prev(self, heap: &[u8]) -> BlockPtr {
        BlockPtr(self.0 - size_of(get_word(heap, self.0 - DSIZE)))
    }
}

impl fmt::Debug for BlockPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockPtr({:#x})", self.0)
    }
}

impl fmt::Display for BlockPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Packs a size and the allocated bit into a tag word. The size must already
/// be aligned and no larger than [`MAX_BLOCK_SIZE`].
#[inline]
pub(crate) const fn pack(size: usize, allocated: bool) -> u32 {
    debug_assert!(size <= MAX_BLOCK_SIZE);
    size as u32 | allocated as u32
}

#[inline]
pub(crate) const fn size_of(word: u32) -> usize {
    (word & SIZE_MASK) as usize
}

#[inline]
pub(crate) const fn is_allocated(word: u32) -> bool {
    word & ALLOC_BIT != 0
}

#[inline]
pub(crate) fn get_word(heap: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; WSIZE];
    word.copy_from_slice(&heap[offset..offset + WSIZE]);
    u32::from_ne_bytes(word)
}

#[inline]
pub(crate) fn put_word(heap: &mut [u8], offset: usize, word: u32) {
    heap[offset..offset + WSIZE].copy_from_slice(&word.to_ne_bytes());
}

/// Total size of `bp` as recorded in its header.
#[inline]
pub(crate) fn block_size(heap: &[u8], bp: BlockPtr) -> usize {
    size_of(get_word(heap, bp.header()))
}

/// Allocated bit of `bp` as recorded in its header.
#[inline]
pub(crate) fn block_allocated(heap: &[u8], bp: BlockPtr) -> bool {
    is_allocated(get_word(heap, bp.header()))
}

/// Writes identical header and footer tags for `bp`. The header goes first
/// because the footer position is derived from it.
#[inline]
pub(crate) fn write_tags(heap: &mut [u8], bp: BlockPtr, size: usize, allocated: bool) {
    let word = pack(size, allocated);
    put_word(heap, bp.header(), word);
    put_word(heap, bp.0 + size - DSIZE, word);
}

/// Successor of a free block in its size class list.
#[inline]
pub(crate) fn succ(heap: &[u8], bp: BlockPtr) -> BlockPtr {
    let mut link = [0u8; LINK_SIZE];
    link.copy_from_slice(&heap[bp.0..bp.0 + LINK_SIZE]);
    BlockPtr(u64::from_ne_bytes(link) as usize)
}

#[inline]
pub(crate) fn set_succ(heap: &mut [u8], bp: BlockPtr, next: BlockPtr) {
    heap[bp.0..bp.0 + LINK_SIZE].copy_from_slice(&(next.0 as u64).to_ne_bytes());
}

/// Walks the physical chain of blocks, from the first block after the
/// prologue up to (but not including) the epilogue.
///
/// The walk also stops as soon as a header would fall outside the arena, so
/// it terminates even over corrupted tags.
pub(crate) struct Blocks<'a> {
    heap: &'a [u8],
    current: BlockPtr,
}

impl<'a> Blocks<'a> {
    pub(crate) fn new(heap: &'a [u8], first: BlockPtr) -> Self {
        Self { heap, current: first }
    }
}

impl Iterator for Blocks<'_> {
    type Item = BlockPtr;

    fn next(&mut self) -> Option<Self::Item> {
        let bp = self.current;

        if bp.0 < WSIZE || bp.0 > self.heap.len() {
            return None;
        }

        let size = block_size(self.heap, bp);

        if size == 0 {
            // Epilogue
            return None;
        }

        self.current = BlockPtr(bp.0 + size);

        Some(bp)
    }
}
