use log::trace;

use crate::{
    block::{self, BlockPtr, MIN_BLOCK_SIZE},
    coalesce::coalesce,
    freelist::FreeLists,
};

/// Takes the free block `bp` off its list and marks the first `asize` bytes of
/// it as allocated.
///
/// If what is left is big enough to be a block on its own we split it off:
///
/// ```text
///  before   +------------------------------------------+
///           |              free (csize)                |
///           +------------------------------------------+
///
///  after    +------------------+-----------------------+
///           |  alloc (asize)   | free (csize - asize)  |
///           +------------------+-----------------------+
/// ```
///
/// Otherwise the whole block is handed out, we would rather waste a few bytes
/// inside the allocation than leave a free block smaller than
/// [`MIN_BLOCK_SIZE`]. The remainder goes through [`coalesce`] like any other
/// block that becomes free.
pub(crate) fn place(heap: &mut [u8], lists: &mut FreeLists, bp: BlockPtr, asize: usize) {
    let csize = block::block_size(heap, bp);
    debug_assert!(asize <= csize, "placing {asize} bytes in a {csize} byte block");

    lists.remove(heap, bp);

    if csize - asize >= MIN_BLOCK_SIZE {
        block::write_tags(heap, bp, asize, true);

        let remainder = bp.next(heap);
        block::write_tags(heap, remainder, csize - asize, false);

        trace!("place {asize} bytes at {bp}, split off {remainder} ({} bytes)", csize - asize);

        coalesce(heap, lists, remainder);
    } else {
        block::write_tags(heap, bp, csize, true);

        trace!("place {asize} bytes at {bp}, whole block of {csize} bytes");
    }
}
