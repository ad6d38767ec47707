//! Heap consistency checker.
//!
//! This is a diagnostic pass, nothing in the allocator depends on it. It walks
//! the physical chain of blocks and every free list and reports each broken
//! invariant it finds instead of stopping at the first one.

use std::{error::Error, fmt, panic::Location};

use log::error;

use crate::{
    allocator::SegAlloc,
    arena::ArenaProvider,
    block::{self, ALIGNMENT, BlockPtr, DSIZE, LINK_SIZE, MIN_BLOCK_SIZE, WSIZE},
    freelist::{FreeLists, NUM_LISTS},
};

/// One broken heap invariant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// The prologue is not an allocated 8 byte block with matching tags.
    MalformedPrologue { header: u32, footer: u32 },
    /// The chain of blocks does not end in an allocated, zero sized epilogue
    /// sitting in the last word of the arena.
    MalformedEpilogue { block: BlockPtr, header: u32 },
    /// A block, or its footer, falls outside the arena.
    BlockOutsideHeap { block: BlockPtr },
    /// Header and footer of a block disagree.
    TagMismatch {
        block: BlockPtr,
        header: u32,
        footer: u32,
    },
    /// A block is smaller than [`MIN_BLOCK_SIZE`].
    BlockTooSmall { block: BlockPtr, size: usize },
    /// A payload is not aligned to [`ALIGNMENT`].
    Misaligned { block: BlockPtr },
    /// Two free blocks sit next to each other, coalescing missed them.
    AdjacentFree { first: BlockPtr, second: BlockPtr },
    /// A free block is not on the list for its size.
    NotInFreeList { block: BlockPtr, class: usize },
    /// A free list points outside the arena.
    FreeListOutsideHeap { class: usize, block: BlockPtr },
    /// A free list holds something that is not a block of the heap.
    FreeListUnreachable { class: usize, block: BlockPtr },
    /// A free list holds a block whose size belongs to another list.
    WrongSizeClass {
        class: usize,
        block: BlockPtr,
        size: usize,
    },
    /// A free list never reaches its terminator.
    FreeListCycle { class: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedPrologue { header, footer } => {
                write!(f, "prologue is malformed: header {header:#x}, footer {footer:#x}")
            }
            Self::MalformedEpilogue { block, header } => {
                write!(f, "epilogue at {block} is malformed: header {header:#x}")
            }
            Self::BlockOutsideHeap { block } => {
                write!(f, "block {block} runs outside the heap")
            }
            Self::TagMismatch {
                block,
                header,
                footer,
            } => {
                write!(f, "block {block}: header {header:#x} and footer {footer:#x} mismatch")
            }
            Self::BlockTooSmall { block, size } => {
                write!(f, "block {block}: size {size} is below the minimum of {MIN_BLOCK_SIZE}")
            }
            Self::Misaligned { block } => {
                write!(f, "block {block} is not {ALIGNMENT} byte aligned")
            }
            Self::AdjacentFree { first, second } => {
                write!(f, "free blocks {first} and {second} were not coalesced")
            }
            Self::NotInFreeList { block, class } => {
                write!(f, "free block {block} is not in free list {class}")
            }
            Self::FreeListOutsideHeap { class, block } => {
                write!(f, "free list {class}: {block} is outside of the heap")
            }
            Self::FreeListUnreachable { class, block } => {
                write!(f, "free list {class}: {block} can't be found by walking the heap")
            }
            Self::WrongSizeClass { class, block, size } => {
                write!(f, "free list {class}: block {block} of size {size} belongs to another list")
            }
            Self::FreeListCycle { class } => {
                write!(f, "free list {class} never reaches its terminator")
            }
        }
    }
}

/// Every invariant the checker found broken, and where it was called from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapCorruption {
    pub context: String,
    pub violations: Vec<Violation>,
}

impl fmt::Display for HeapCorruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "heap check at {} found {} violation(s)",
            self.context,
            self.violations.len()
        )?;

        for violation in &self.violations {
            write!(f, "\n  - {violation}")?;
        }

        Ok(())
    }
}

impl Error for HeapCorruption {}

impl<P: ArenaProvider> SegAlloc<P> {
    /// Validates the whole heap. The caller's location goes in the report.
    #[track_caller]
    pub fn check(&self) -> Result<(), HeapCorruption> {
        self.check_with(&Location::caller().to_string())
    }

    /// Validates the whole heap, tagging the report with `context`.
    pub fn check_with(&self, context: &str) -> Result<(), HeapCorruption> {
        let violations = self.violations();

        if violations.is_empty() {
            return Ok(());
        }

        for violation in &violations {
            error!("heap check at {context}: {violation}");
        }

        Err(HeapCorruption {
            context: context.to_owned(),
            violations,
        })
    }

    /// Panics with the full report if the heap is corrupted.
    #[track_caller]
    pub fn assert_consistent(&self) {
        if let Err(corruption) = self.check() {
            panic!("{corruption}");
        }
    }

    /// Collects every broken invariant.
    pub fn violations(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        self.check_prologue(&mut violations);
        let listed = self.walk_free_lists(&mut violations);
        let chain = self.check_blocks(&listed, &mut violations);
        self.check_list_members(&chain, &listed, &mut violations);

        violations
    }

    fn check_prologue(&self, violations: &mut Vec<Violation>) {
        let heap = self.provider.bytes();
        let header = block::get_word(heap, self.prologue.header());
        let footer = block::get_word(heap, self.prologue.offset());

        if header != block::pack(DSIZE, true) || header != footer {
            violations.push(Violation::MalformedPrologue { header, footer });
        }
    }

    /// Follows every free list to its terminator without trusting a single
    /// link. Returns each `(block, class)` pair found, sorted.
    fn walk_free_lists(&self, violations: &mut Vec<Violation>) -> Vec<(BlockPtr, usize)> {
        let heap = self.provider.bytes();
        let mut listed = Vec::new();

        for class in 0..NUM_LISTS {
            let mut bp = self.lists.head(class);
            let mut steps = 0;

            loop {
                // Header and link must both be readable
                if bp.offset() < WSIZE
                    || !self.in_heap(bp.header())
                    || bp.offset() + LINK_SIZE > heap.len()
                {
                    violations.push(Violation::FreeListOutsideHeap { class, block: bp });
                    break;
                }

                if block::block_allocated(heap, bp) {
                    break;
                }

                if steps == self.max_list_len() {
                    violations.push(Violation::FreeListCycle { class });
                    break;
                }

                listed.push((bp, class));
                bp = block::succ(heap, bp);
                steps += 1;
            }
        }

        listed.sort_unstable();
        listed.dedup();
        listed
    }

    /// Walks the physical chain of blocks. Returns every block found, in
    /// address order.
    fn check_blocks(
        &self,
        listed: &[(BlockPtr, usize)],
        violations: &mut Vec<Violation>,
    ) -> Vec<BlockPtr> {
        let heap = self.provider.bytes();
        let mut chain = Vec::new();
        let mut prev_free: Option<BlockPtr> = None;
        let mut bp = self.first_block();

        loop {
            if bp.offset() > heap.len() {
                violations.push(Violation::BlockOutsideHeap { block: bp });
                break;
            }

            let header = block::get_word(heap, bp.header());
            let size = block::size_of(header);

            if size == 0 {
                if !block::is_allocated(header) || bp.offset() != heap.len() {
                    violations.push(Violation::MalformedEpilogue { block: bp, header });
                }
                break;
            }

            if bp.offset() + size - DSIZE + WSIZE > heap.len() {
                violations.push(Violation::BlockOutsideHeap { block: bp });
                break;
            }

            let footer = block::get_word(heap, bp.offset() + size - DSIZE);

            if header != footer {
                violations.push(Violation::TagMismatch {
                    block: bp,
                    header,
                    footer,
                });
            }

            if size < MIN_BLOCK_SIZE {
                violations.push(Violation::BlockTooSmall { block: bp, size });
            }

            if bp.offset() % ALIGNMENT != 0 {
                violations.push(Violation::Misaligned { block: bp });
            }

            if block::is_allocated(header) {
                prev_free = None;
            } else {
                if let Some(first) = prev_free {
                    violations.push(Violation::AdjacentFree { first, second: bp });
                }

                let class = FreeLists::class_index(size);

                if listed.binary_search(&(bp, class)).is_err() {
                    violations.push(Violation::NotInFreeList { block: bp, class });
                }

                prev_free = Some(bp);
            }

            chain.push(bp);
            bp = BlockPtr::new(bp.offset() + size);
        }

        chain
    }

    /// Checks that each listed block is a block of the heap and sits in the
    /// list for its size.
    fn check_list_members(
        &self,
        chain: &[BlockPtr],
        listed: &[(BlockPtr, usize)],
        violations: &mut Vec<Violation>,
    ) {
        let heap = self.provider.bytes();

        for &(bp, class) in listed {
            if chain.binary_search(&bp).is_err() {
                violations.push(Violation::FreeListUnreachable { class, block: bp });
                continue;
            }

            let size = block::block_size(heap, bp);

            if FreeLists::class_index(size) != class {
                violations.push(Violation::WrongSizeClass {
                    class,
                    block: bp,
                    size,
                });
            }
        }
    }

    #[inline]
    fn in_heap(&self, offset: usize) -> bool {
        offset >= self.provider.heap_lo() && offset <= self.provider.heap_hi()
    }

    /// Upper bound on the number of blocks a free list can hold.
    #[inline]
    fn max_list_len(&self) -> usize {
        self.provider.heap_size() / MIN_BLOCK_SIZE + 1
    }
}
