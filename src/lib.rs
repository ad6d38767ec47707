//! # segalloc - A segregated free list allocator
//!
//! This crate provides a `malloc`-like heap allocator built over a single
//! growable arena. Free blocks are kept in segregated lists bucketed by
//! powers of two, found with a first-fit search, split when they are too big
//! and coalesced with their neighbours as soon as they are freed.
//!
//! ## Overview
//!
//! ```text
//!   Arena:
//!
//!   ┌─────┬──────────┬───────┬──────┬───────┬───────────┬────────┬──────────┐
//!   │ pad │ prologue │ A1    │ free │ A2    │ free      │ A3     │ epilogue │
//!   └─────┴──────────┴───────┴──┬───┴───────┴─────┬─────┴────────┴──────────┘
//!                     ▲         │                 │                          ▲
//!                     │         │                 │                          │
//!                     │         ▼                 ▼                     break (grows
//!                     │   ┌──────────┐      ┌──────────┐                   with sbrk)
//!   end of every list │   │ list 5   │      │ list 8   │
//!                     │   │ (16, 32] │      │(128, 256]│
//!                     └───┴──────────┘      └──────────┘
//! ```
//!
//! Every block carries a header and a footer with its size and an allocated
//! bit. The footer is what lets us find the previous block in O(1), which is
//! all coalescing needs.
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── block      - Boundary tags, block layout and navigation
//!   ├── freelist   - Segregated free lists and first-fit search
//!   ├── coalesce   - Merging of free neighbours
//!   ├── place      - Placing and splitting allocations
//!   ├── allocator  - SegAlloc: allocate / release / reallocate / allocate_zeroed
//!   ├── check      - Heap consistency checker
//!   ├── arena      - Arena providers (MemLib over mmap / VirtualAlloc, VecArena)
//!   ├── global     - LockedAlloc, a GlobalAlloc built on SegAlloc
//!   ├── config     - HeapConfig
//!   └── error      - HeapError
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use segalloc::{HeapConfig, SegAlloc};
//!
//! fn main() -> Result<(), segalloc::HeapError> {
//!     let mut heap = SegAlloc::with_memlib(HeapConfig::default())?;
//!
//!     let bp = heap.allocate(64)?;
//!     heap.payload_mut(bp)[..5].copy_from_slice(b"hello");
//!
//!     let bp = heap.reallocate(Some(bp), 128)?;
//!     heap.release(bp);
//!
//!     heap.assert_consistent();
//!     Ok(())
//! }
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded core**: [`SegAlloc`] needs `&mut self`, use
//!   [`LockedAlloc`] to share it.
//! - **The arena only grows**: memory is never handed back to the provider.
//! - **8 byte alignment**: payloads are never aligned to more than [`ALIGNMENT`].
//! - **No misuse detection**: double frees and foreign pointers are not caught.

mod allocator;
mod arena;
mod block;
mod check;
mod coalesce;
mod config;
mod error;
mod freelist;
mod global;
mod place;
mod utils;

pub use allocator::{HeapStats, SegAlloc};
pub use arena::{ArenaProvider, MemLib, VecArena};
pub use block::{ALIGNMENT, BlockPtr, DSIZE, MIN_BLOCK_SIZE, WSIZE};
pub use check::{HeapCorruption, Violation};
pub use config::HeapConfig;
pub use error::HeapError;
pub use freelist::NUM_LISTS;
pub use global::LockedAlloc;
