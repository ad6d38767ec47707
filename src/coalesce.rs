use log::trace;

use crate::{
    block::{self, BlockPtr},
    freelist::FreeLists,
};

/// Merges the free block `bp` with whichever of its physical neighbours is
/// free, puts the result on its free list and returns it.
///
/// `bp` must already carry free tags for its own size. The neighbours are
/// found through the footer of the previous block and the header of the next
/// one, so this is O(1) apart from the list removals.
///
/// ```text
///   prev alloc, next alloc         prev alloc, next free
/// +------+------+------+         +------+------+~~~~~~+
/// | used | bp   | used |         | used | bp   : next |
/// +------+------+------+         +------+------+~~~~~~+
///         insert bp                   bp absorbs next
///
///   prev free, next alloc          prev free, next free
/// +~~~~~~+------+------+         +~~~~~~+------+~~~~~~+
/// | prev : bp   | used |         | prev : bp   : next |
/// +~~~~~~+------+------+         +~~~~~~+------+~~~~~~+
///      prev absorbs bp              prev absorbs both
/// ```
///
/// This is the only way a block gets onto a free list, which is what keeps
/// two free blocks from ever sitting next to each other.
pub(crate) fn coalesce(heap: &mut [u8], lists: &mut FreeLists, bp: BlockPtr) -> BlockPtr {
    let prev = bp.prev(heap);
    let next = bp.next(heap);
    let prev_allocated = block::block_allocated(heap, prev);
    let next_allocated = block::block_allocated(heap, next);
    let mut size = block::block_size(heap, bp);

    let merged = match (prev_allocated, next_allocated) {
        (true, true) => bp,
        (true, false) => {
            lists.remove(heap, next);
            size += block::block_size(heap, next);
            block::write_tags(heap, bp, size, false);
            bp
        }
        (false, true) => {
            lists.remove(heap, prev);
            size += block::block_size(heap, prev);
            block::write_tags(heap, prev, size, false);
            prev
        }
        (false, false) => {
            lists.remove(heap, next);
            lists.remove(heap, prev);
            size += block::block_size(heap, prev) + block::block_size(heap, next);
            block::write_tags(heap, prev, size, false);
            prev
        }
    };

    trace!(
        "coalesce {bp}: prev {} next {} -> {merged} ({size} bytes)",
        if prev_allocated { "used" } else { "free" },
        if next_allocated { "used" } else { "free" },
    );

    lists.insert(heap, merged);

    merged
}
