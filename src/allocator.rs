use log::{debug, trace, warn};

use crate::{
    arena::{ArenaProvider, MemLib},
    block::{self, ALIGNMENT, BlockPtr, Blocks, DSIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, WSIZE},
    coalesce::coalesce,
    config::{HeapConfig, SENTINEL_SIZE},
    error::HeapError,
    freelist::FreeLists,
    place::place,
    utils::{align, checked_align},
};

/// Segregated free list allocator over a growable arena.
///
/// The arena starts with a padding word and the prologue, and always ends
/// with the epilogue header. Everything in between is a sequence of blocks:
///
/// ```text
/// +-----+----------+----------+--------+--------+-----+--------+----------+
/// | pad | prologue | prologue | block  | block  | ... | block  | epilogue |
/// | 0   | hdr 8/1  | ftr 8/1  |        |        |     |        |  hdr 0/1 |
/// +-----+----------+----------+--------+--------+-----+--------+----------+
///                  ^
///                  |
///   prologue BlockPtr, also the end of every free list
/// ```
///
/// Both sentinels are marked as allocated, so coalescing never has to check
/// whether it is looking at the edges of the heap. When the heap grows, the
/// old epilogue becomes the header of the new free block and a new epilogue is
/// written at the new end.
///
/// All the state of the heap lives here, so any number of independent heaps
/// can live in the same process. None of the operations are thread-safe, see
/// [`crate::LockedAlloc`] for a locked version.
pub struct SegAlloc<P: ArenaProvider> {
    /// Backing arena.
    pub(crate) provider: P,
    /// Heads of the segregated free lists.
    pub(crate) lists: FreeLists,
    /// The prologue block, first sentinel of the heap.
    pub(crate) prologue: BlockPtr,
    config: HeapConfig,
}

/// Snapshot of how the heap is being used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Size of the arena, sentinels included.
    pub heap_size: usize,
    pub allocated_blocks: usize,
    /// Total size of the allocated blocks, tags included.
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    /// Total size of the free blocks, tags included.
    pub free_bytes: usize,
    /// Size of the biggest free block.
    pub largest_free: usize,
}

impl SegAlloc<MemLib> {
    /// Creates a heap backed by a [`MemLib`] reservation of `config.max_heap`
    /// bytes.
    pub fn with_memlib(config: HeapConfig) -> Result<Self, HeapError> {
        config.validate()?;

        Self::new(MemLib::new(config.max_heap)?, config)
    }

    /// Address of the payload of `bp`.
    #[inline]
    pub fn payload_ptr(&self, bp: BlockPtr) -> *mut u8 {
        self.provider.as_ptr().wrapping_add(bp.offset())
    }

    /// Block whose payload starts at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`SegAlloc::payload_ptr`] on this heap.
    #[inline]
    pub unsafe fn block_at(&self, ptr: *mut u8) -> BlockPtr {
        let offset = unsafe { ptr.offset_from(self.provider.as_ptr()) };

        BlockPtr::new(offset as usize)
    }
}

impl<P: ArenaProvider> SegAlloc<P> {
    /// Initialises a heap on top of `provider`.
    ///
    /// We first ask for the few bytes needed for the sentinels and then grow
    /// the heap by one chunk so that the first requests don't need to.
    pub fn new(mut provider: P, config: HeapConfig) -> Result<Self, HeapError> {
        config.validate()?;

        let start = provider.sbrk(SENTINEL_SIZE).ok_or(HeapError::ArenaExhausted {
            requested: SENTINEL_SIZE,
            heap_size: provider.heap_size(),
        })?;

        if start % ALIGNMENT != 0 {
            return Err(HeapError::InvalidConfig {
                reason: "arena provider break is not 8 byte aligned",
            });
        }

        let heap = provider.bytes_mut();
        // Alignment padding
        block::put_word(heap, start, 0);
        // Prologue header and footer
        block::put_word(heap, start + WSIZE, block::pack(DSIZE, true));
        block::put_word(heap, start + 2 * WSIZE, block::pack(DSIZE, true));
        // Epilogue header
        block::put_word(heap, start + 3 * WSIZE, block::pack(0, true));

        let prologue = BlockPtr::new(start + DSIZE);

        let mut allocator = Self {
            provider,
            lists: FreeLists::new(prologue),
            prologue,
            config,
        };

        allocator.extend_heap(config.chunk_size)?;

        debug!(
            "heap initialised: prologue at {prologue}, {} bytes",
            allocator.provider.heap_size()
        );

        Ok(allocator)
    }

    /// Allocates a block with room for at least `size` bytes of payload.
    ///
    /// A `size` of 0 still gets a minimum sized block.
    pub fn allocate(&mut self, size: usize) -> Result<BlockPtr, HeapError> {
        let asize = Self::adjust_size(size)?;

        let fit = self.lists.find_fit(self.provider.bytes(), asize);

        let bp = match fit {
            Some(bp) => bp,
            None => {
                // No fit found. Get more memory and place the block
                self.extend_heap(asize.max(self.config.chunk_size))?
            }
        };

        place(self.provider.bytes_mut(), &mut self.lists, bp, asize);

        trace!("allocate {size} bytes -> {bp}");

        Ok(bp)
    }

    /// Frees `ptr`. Nothing happens on `None`.
    ///
    /// `ptr` must come from this heap and still be allocated, nothing checks it.
    pub fn release(&mut self, ptr: Option<BlockPtr>) {
        let Some(bp) = ptr else {
            return;
        };

        let heap = self.provider.bytes_mut();
        let size = block::block_size(heap, bp);
        block::write_tags(heap, bp, size, false);

        trace!("release {bp} ({size} bytes)");

        coalesce(heap, &mut self.lists, bp);
    }

    /// Resizes `ptr` to hold `size` bytes.
    ///
    /// - `size == 0` frees `ptr` and returns `Ok(None)`.
    /// - `ptr == None` is a plain [`SegAlloc::allocate`].
    /// - Otherwise a new block is allocated, the first `min(old payload, size)`
    ///   bytes are copied over and the old block is freed. This always moves the
    ///   data, even when the block could have grown in place.
    ///
    /// If the new block can't be allocated the old one is left as it was.
    pub fn reallocate(
        &mut self,
        ptr: Option<BlockPtr>,
        size: usize,
    ) -> Result<Option<BlockPtr>, HeapError> {
        if size == 0 {
            self.release(ptr);
            return Ok(None);
        }

        let Some(old) = ptr else {
            return self.allocate(size).map(Some);
        };

        let new = self.allocate(size)?;
        let len = self.payload_size(old).min(size);

        self.provider
            .bytes_mut()
            .copy_within(old.offset()..old.offset() + len, new.offset());

        self.release(Some(old));

        trace!("reallocate {old} -> {new} ({len} bytes copied)");

        Ok(Some(new))
    }

    /// Allocates room for `count` elements of `size` bytes and zeroes the
    /// whole payload.
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> Result<BlockPtr, HeapError> {
        let bytes = count.checked_mul(size).ok_or(HeapError::SizeOverflow {
            requested: usize::MAX,
        })?;

        let bp = self.allocate(bytes)?;
        self.payload_mut(bp).fill(0);

        Ok(bp)
    }

    /// Payload of an allocated block. It can be bigger than what was asked for.
    pub fn payload(&self, bp: BlockPtr) -> &[u8] {
        let size = self.payload_size(bp);

        &self.provider.bytes()[bp.offset()..bp.offset() + size]
    }

    pub fn payload_mut(&mut self, bp: BlockPtr) -> &mut [u8] {
        let size = self.payload_size(bp);

        &mut self.provider.bytes_mut()[bp.offset()..bp.offset() + size]
    }

    /// Usable bytes in `bp`: the block size minus its header and footer.
    #[inline]
    pub fn payload_size(&self, bp: BlockPtr) -> usize {
        self.block_size(bp) - DSIZE
    }

    /// Total size of `bp`, header and footer included.
    #[inline]
    pub fn block_size(&self, bp: BlockPtr) -> usize {
        block::block_size(self.provider.bytes(), bp)
    }

    #[inline]
    pub fn is_allocated(&self, bp: BlockPtr) -> bool {
        block::block_allocated(self.provider.bytes(), bp)
    }

    #[inline]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Counts blocks and bytes by walking the whole heap.
    pub fn stats(&self) -> HeapStats {
        let heap = self.provider.bytes();
        let mut stats = HeapStats {
            heap_size: self.provider.heap_size(),
            ..HeapStats::default()
        };

        for bp in self.blocks() {
            let size = block::block_size(heap, bp);

            if block::block_allocated(heap, bp) {
                stats.allocated_blocks += 1;
                stats.allocated_bytes += size;
            } else {
                stats.free_blocks += 1;
                stats.free_bytes += size;
                stats.largest_free = stats.largest_free.max(size);
            }
        }

        stats
    }

    /// First block after the prologue.
    #[inline]
    pub(crate) fn first_block(&self) -> BlockPtr {
        BlockPtr::new(self.prologue.offset() + DSIZE)
    }

    pub(crate) fn blocks(&self) -> Blocks<'_> {
        Blocks::new(self.provider.bytes(), self.first_block())
    }

    /// Block size for a request of `size` payload bytes: room for the tags,
    /// rounded up to the alignment and never below the minimum block.
    fn adjust_size(size: usize) -> Result<usize, HeapError> {
        let asize = size
            .checked_add(DSIZE)
            .and_then(|size| checked_align(size, ALIGNMENT))
            .filter(|asize| *asize <= MAX_BLOCK_SIZE)
            .ok_or(HeapError::SizeOverflow { requested: size })?;

        Ok(asize.max(MIN_BLOCK_SIZE))
    }

    /// Grows the heap by at least `bytes` and returns the new free block,
    /// already coalesced with the last block of the heap if that one was free.
    fn extend_heap(&mut self, bytes: usize) -> Result<BlockPtr, HeapError> {
        // An even number of words keeps the new block aligned
        let size = align(bytes, DSIZE);
        let heap_size = self.provider.heap_size();

        // No block, merged or not, may outgrow what a tag can hold.
        let fits_tags = heap_size
            .checked_add(size)
            .is_some_and(|total| total <= MAX_BLOCK_SIZE);

        let old_brk = if fits_tags { self.provider.sbrk(size) } else { None };

        let Some(old_brk) = old_brk else {
            warn!(
                "arena exhausted: can't grow a {} byte heap by {size} bytes",
                self.provider.heap_size()
            );

            return Err(HeapError::ArenaExhausted {
                requested: size,
                heap_size: self.provider.heap_size(),
            });
        };

        // The old epilogue header becomes the header of the new block.
        let bp = BlockPtr::new(old_brk);
        let heap = self.provider.bytes_mut();
        block::write_tags(heap, bp, size, false);

        let epilogue = bp.next(heap);
        block::put_word(heap, epilogue.header(), block::pack(0, true));

        debug!("heap extended by {size} bytes at {bp}");

        Ok(coalesce(heap, &mut self.lists, bp))
    }
}
