//! Rounding helpers shared by the codec, the facade and the arena providers.

/// Rounds `to_be_aligned` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. This is used to round request sizes to
/// [`crate::block::ALIGNMENT`] and reservation sizes to the platform page size.
#[inline]
pub fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}

/// Same as [`align`] but returns `None` instead of wrapping around when
/// `to_be_aligned` is too close to `usize::MAX`.
#[inline]
pub fn checked_align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    Some(to_be_aligned.checked_add(alignment - 1)? & !(alignment - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_double_word() {
        let alignments = vec![(1..=8, 8), (9..=16, 16), (17..=24, 24), (25..=32, 32)];

        for (sizes, expected) in alignments {
            for size in sizes {
                assert_eq!(expected, align(size, 8));
            }
        }
    }

    #[test]
    fn align_page_size() {
        // For testing purposes we are assuming the page size is 4096
        let alignments = vec![(1..=4096, 4096), (4097..=8192, 8192)];

        for (sizes, expected) in alignments {
            for size in sizes {
                assert_eq!(expected, align(size, 4096))
            }
        }
    }

    #[test]
    fn checked_align_detects_overflow() {
        assert_eq!(checked_align(13, 8), Some(16));
        assert_eq!(checked_align(usize::MAX - 3, 8), None);
    }
}
