//! Heap configuration parameters.

use crate::{
    block::{DSIZE, MAX_BLOCK_SIZE, WSIZE},
    error::HeapError,
};

/// Bytes used by the alignment padding, the prologue and the epilogue.
pub(crate) const SENTINEL_SIZE: usize = 4 * WSIZE;

/// Configuration for a [`crate::SegAlloc`] heap.
///
/// Validated when the heap is created; all values are immutable afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// Maximum size of the arena in bytes when it is backed by a
    /// [`crate::MemLib`]. The whole range is reserved up front and handed out
    /// as the heap grows.
    ///
    /// Default: 20MB.
    pub max_heap: usize,

    /// Minimum number of bytes the heap grows by when no free block fits a
    /// request. Bigger requests grow the heap by their own size.
    ///
    /// Default: 256. Must be a non zero multiple of 8.
    pub chunk_size: usize,
}

impl HeapConfig {
    /// Default arena reservation: 20MB.
    pub const DEFAULT_MAX_HEAP: usize = 20 * (1 << 20);

    /// Default extension size.
    pub const DEFAULT_CHUNK_SIZE: usize = 1 << 8;

    pub const fn new() -> Self {
        Self {
            max_heap: Self::DEFAULT_MAX_HEAP,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    pub const fn with_max_heap(mut self, max_heap: usize) -> Self {
        self.max_heap = max_heap;
        self
    }

    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Checks that a heap built from this configuration can be initialised.
    pub fn validate(&self) -> Result<(), HeapError> {
        if self.chunk_size == 0 || self.chunk_size % DSIZE != 0 {
            return Err(HeapError::InvalidConfig {
                reason: "chunk size must be a non zero multiple of 8",
            });
        }

        if self.chunk_size > MAX_BLOCK_SIZE {
            return Err(HeapError::InvalidConfig {
                reason: "chunk size does not fit in a boundary tag",
            });
        }

        if self.max_heap > MAX_BLOCK_SIZE {
            return Err(HeapError::InvalidConfig {
                reason: "max heap is larger than the biggest block a boundary tag can describe",
            });
        }

        if self.max_heap < SENTINEL_SIZE + self.chunk_size {
            return Err(HeapError::InvalidConfig {
                reason: "max heap can not hold the sentinels and the first chunk",
            });
        }

        Ok(())
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}
