use log::trace;

use crate::block::{self, BlockPtr};

/// Number of segregated lists.
pub const NUM_LISTS: usize = 25;

/// Segregated lists of free blocks.
///
/// List `i` keeps the free blocks whose total size falls in `(2^(i-1), 2^i]`,
/// except the last one which keeps every block bigger than that. The lists only
/// hold heads; the rest of the chain lives inside the free blocks themselves,
/// since the payload of a free block is not used by anybody:
///
/// ```text
///  heads
/// +------+
/// |  0   | ------------------------------------------------------+
/// +------+                                                       |
/// | ...  |                                                       |
/// +------+      +------------+      +------------+               v
/// |  6   | ---> | Free (48B) | ---> | Free (40B) | ---> +-------------------+
/// +------+      +------------+      +------------+      |     Prologue      |
/// | ...  |                                              |  (always alloc)   |
/// +------+      +------------+                          +-------------------+
/// |  24  | ---> | Free (32M) | -----------------------------^  ^
/// +------+      +------------+                                 |
///                                                  every other empty list
/// ```
///
/// There is no `None` in here: a list ends when we reach a block whose header
/// says it is allocated. Empty lists point straight at the prologue.
///
/// Blocks are pushed at the head (LIFO) and the lists are singly linked, so
/// removing a block means looking for its predecessor.
pub(crate) struct FreeLists {
    heads: [BlockPtr; NUM_LISTS],
    terminator: BlockPtr,
}

/// Walks one free list until the terminating allocated block.
pub(crate) struct Iter<'a> {
    heap: &'a [u8],
    current: BlockPtr,
}

impl FreeLists {
    /// Creates the lists with every head pointing at `terminator`.
    pub const fn new(terminator: BlockPtr) -> Self {
        Self {
            heads: [terminator; NUM_LISTS],
            terminator,
        }
    }

    /// Index of the list a block of `size` bytes belongs to: the smallest `i`
    /// with `size <= 2^i`, clamped to the last list.
    #[inline]
    pub fn class_index(size: usize) -> usize {
        let index = size.max(1).next_power_of_two().trailing_zeros() as usize;
        index.min(NUM_LISTS - 1)
    }

    #[inline]
    pub fn head(&self, index: usize) -> BlockPtr {
        self.heads[index]
    }

    pub fn iter<'a>(&self, heap: &'a [u8], index: usize) -> Iter<'a> {
        Iter {
            heap,
            current: self.heads[index],
        }
    }

    /// Pushes `bp` at the head of the list matching its size.
    pub fn insert(&mut self, heap: &mut [u8], bp: BlockPtr) {
        let index = Self::class_index(block::block_size(heap, bp));

        block::set_succ(heap, bp, self.heads[index]);
        self.heads[index] = bp;

        trace!("free list {index}: pushed {bp}");
    }

    /// Unlinks `bp` from the list matching its size.
    ///
    /// `bp` must be on that list. Asking for a block that is not there is a
    /// bug in the caller: debug builds assert, release builds leave the list
    /// untouched.
    pub fn remove(&mut self, heap: &mut [u8], bp: BlockPtr) {
        let index = Self::class_index(block::block_size(heap, bp));
        let next = block::succ(heap, bp);
        let next_allocated = block::block_allocated(heap, next);

        if self.heads[index] == bp {
            self.heads[index] = if next_allocated {
                // `bp` is alone in the list
                self.terminator
            } else {
                next
            };

            trace!("free list {index}: popped head {bp}");
            return;
        }

        // `bp` is somewhere after the head, find its predecessor
        let mut prev = self.heads[index];

        while !block::block_allocated(heap, prev) {
            if block::succ(heap, prev) == bp {
                block::set_succ(heap, prev, next);

                trace!("free list {index}: unlinked {bp}");
                return;
            }

            prev = block::succ(heap, prev);
        }

        debug_assert!(false, "block {bp} is not on free list {index}");
    }

    /// First-fit search for a free block of at least `asize` bytes.
    ///
    /// Requests bigger than the bound of the next to last list can only be
    /// served from the last one. Otherwise we start at the first list whose
    /// upper bound is at least `asize` and keep going up, since smaller lists
    /// can't hold a block that big.
    pub fn find_fit(&self, heap: &[u8], asize: usize) -> Option<BlockPtr> {
        // `class_index` clamps, so oversized requests go straight to the last list.
        let first = Self::class_index(asize);

        (first..NUM_LISTS).find_map(|index| {
            self.iter(heap, index)
                .find(|bp| block::block_size(heap, *bp) >= asize)
        })
    }
}

impl Iterator for Iter<'_> {
    type Item = BlockPtr;

    fn next(&mut self) -> Option<Self::Item> {
        let bp = self.current;

        if block::block_allocated(self.heap, bp) {
            return None;
        }

        self.current = block::succ(self.heap, bp);

        Some(bp)
    }
}
