//! Allocator error types.

use std::error::Error;
use std::fmt;

/// Errors the allocator reports to its callers.
///
/// None of these leave the heap in a different state than before the failed
/// call: blocks that were allocated stay allocated and keep their contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeapError {
    /// The arena provider refused to grow the arena.
    ArenaExhausted {
        /// Number of bytes we asked the provider for.
        requested: usize,
        /// Size of the arena when the request failed.
        heap_size: usize,
    },
    /// The request can't be represented, either because computing its size
    /// overflowed or because the block would not fit in a boundary tag.
    SizeOverflow {
        /// Number of payload bytes asked for, saturated on overflow.
        requested: usize,
    },
    /// A [`crate::HeapConfig`] value was rejected.
    InvalidConfig {
        /// What was wrong with it.
        reason: &'static str,
    },
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArenaExhausted {
                requested,
                heap_size,
            } => {
                write!(
                    f,
                    "arena exhausted: could not extend a {heap_size} byte heap by {requested} bytes"
                )
            }
            Self::SizeOverflow { requested } => {
                write!(f, "allocation of {requested} bytes is too large")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid heap configuration: {reason}")
            }
        }
    }
}

impl Error for HeapError {}
