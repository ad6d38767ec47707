//! End to end behaviour of the allocator over both arena providers.

use segalloc::{
    ALIGNMENT, ArenaProvider, HeapConfig, HeapError, MIN_BLOCK_SIZE, MemLib, SegAlloc, VecArena,
};

fn vec_heap() -> SegAlloc<VecArena> {
    SegAlloc::new(VecArena::new(1 << 20), HeapConfig::default()).unwrap()
}

fn memlib_heap() -> SegAlloc<MemLib> {
    SegAlloc::with_memlib(HeapConfig::new().with_max_heap(1 << 20)).unwrap()
}

#[test]
fn freed_block_is_reused_first() {
    let mut heap = vec_heap();

    let first = heap.allocate(1).unwrap();
    let _second = heap.allocate(1).unwrap();
    heap.release(Some(first));
    let third = heap.allocate(1).unwrap();

    assert_eq!(third, first);
    heap.assert_consistent();
}

#[test]
fn smaller_request_splits_freed_block() {
    let mut heap = vec_heap();

    let big = heap.allocate(100).unwrap();
    let _guard = heap.allocate(8).unwrap();
    heap.release(Some(big));

    let small = heap.allocate(50).unwrap();

    assert_eq!(small, big);
    assert_eq!(heap.block_size(small), 64);

    // The rest of the 112 byte block is still free, next to the guard.
    let stats = heap.stats();
    assert_eq!(stats.free_blocks, 2);
    assert_eq!(stats.largest_free, 128);
    assert_eq!(stats.free_bytes, 48 + 128);
    heap.assert_consistent();
}

#[test]
fn releasing_middle_block_merges_three_ways() {
    let mut heap = vec_heap();

    let a = heap.allocate(32).unwrap();
    let b = heap.allocate(32).unwrap();
    let c = heap.allocate(32).unwrap();
    let _guard = heap.allocate(32).unwrap();
    let span = heap.block_size(a) + heap.block_size(b) + heap.block_size(c);

    heap.release(Some(a));
    heap.release(Some(c));
    heap.assert_consistent();
    assert_eq!(heap.stats().free_blocks, 3);

    heap.release(Some(b));
    heap.assert_consistent();

    assert!(!heap.is_allocated(a));
    assert_eq!(heap.block_size(a), span);
    assert_eq!(heap.stats().free_blocks, 2);
}

#[test]
fn large_request_extends_arena_once() {
    let mut heap = memlib_heap();
    let extensions = heap.provider().extensions();
    let heap_size = heap.provider().heap_size();

    let bp = heap.allocate(4096).unwrap();

    assert_eq!(heap.provider().extensions(), extensions + 1);
    assert_eq!(heap.provider().heap_size(), heap_size + 4096 + 8);
    assert!(heap.payload_size(bp) >= 4096);
    heap.assert_consistent();
}

#[test]
fn small_requests_fit_in_first_chunk() {
    let mut heap = memlib_heap();
    let extensions = heap.provider().extensions();

    for _ in 0..4 {
        heap.allocate(24).unwrap();
    }

    assert_eq!(heap.provider().extensions(), extensions);
}

#[test]
fn extension_merges_with_free_tail() {
    let mut heap = vec_heap();
    let initial = heap.stats();
    assert_eq!(initial.free_blocks, 1);

    // Too big for the first chunk, the new block absorbs the free tail.
    let bp = heap.allocate(1000).unwrap();

    assert_eq!(bp.offset(), 16);
    assert_eq!(heap.stats().free_blocks, 1);
    heap.assert_consistent();
}

#[test]
fn payloads_are_aligned_and_minimum_sized() {
    let mut heap = memlib_heap();

    for size in [0, 1, 7, 8, 9, 4096] {
        let bp = heap.allocate(size).unwrap();

        assert_eq!(bp.offset() % ALIGNMENT, 0, "size {size}");
        assert_eq!(heap.payload_ptr(bp) as usize % ALIGNMENT, 0, "size {size}");
        assert!(heap.block_size(bp) >= MIN_BLOCK_SIZE, "size {size}");
        assert!(heap.payload_size(bp) >= size, "size {size}");
    }

    heap.assert_consistent();
}

#[test]
fn reallocate_preserves_contents() {
    let mut heap = vec_heap();

    let bp = heap.allocate(40).unwrap();
    for (i, byte) in heap.payload_mut(bp)[..40].iter_mut().enumerate() {
        *byte = i as u8;
    }

    let grown = heap.reallocate(Some(bp), 400).unwrap().unwrap();
    assert_ne!(grown, bp);
    assert!(heap.payload(grown)[..40].iter().enumerate().all(|(i, byte)| *byte == i as u8));

    let shrunk = heap.reallocate(Some(grown), 10).unwrap().unwrap();
    assert!(heap.payload(shrunk)[..10].iter().enumerate().all(|(i, byte)| *byte == i as u8));

    heap.assert_consistent();
}

#[test]
fn failed_reallocate_leaves_heap_untouched() {
    let mut heap = SegAlloc::new(VecArena::new(1024), HeapConfig::default()).unwrap();

    let bp = heap.allocate(64).unwrap();
    heap.payload_mut(bp).fill(0x5A);
    let before = heap.provider().bytes().to_vec();

    let err = heap.reallocate(Some(bp), 4096).unwrap_err();

    assert!(matches!(err, HeapError::ArenaExhausted { .. }));
    assert_eq!(heap.provider().bytes(), &before[..]);
    assert!(heap.is_allocated(bp));
}

#[test]
fn reallocate_edge_cases() {
    let mut heap = vec_heap();

    // No pointer: plain allocation.
    let bp = heap.reallocate(None, 16).unwrap().unwrap();
    assert!(heap.is_allocated(bp));

    // Zero size: plain release.
    assert_eq!(heap.reallocate(Some(bp), 0).unwrap(), None);
    assert!(!heap.is_allocated(bp));

    heap.assert_consistent();
}

#[test]
fn allocate_zeroed_clears_reused_memory() {
    let mut heap = vec_heap();

    let dirty = heap.allocate(120).unwrap();
    heap.payload_mut(dirty).fill(0xFF);
    heap.release(Some(dirty));

    let clean = heap.allocate_zeroed(15, 8).unwrap();

    assert_eq!(clean, dirty);
    assert!(heap.payload(clean).iter().all(|byte| *byte == 0));
}

#[test]
fn exhausted_arena_keeps_existing_blocks() {
    let mut heap = SegAlloc::new(VecArena::new(2048), HeapConfig::default()).unwrap();
    let mut blocks = Vec::new();

    let err = loop {
        match heap.allocate(100) {
            Ok(bp) => {
                heap.payload_mut(bp).fill(blocks.len() as u8);
                blocks.push(bp);
            }
            Err(err) => break err,
        }
    };

    assert!(matches!(err, HeapError::ArenaExhausted { .. }));
    assert!(!blocks.is_empty());

    for (i, bp) in blocks.iter().enumerate() {
        assert!(heap.payload(*bp).iter().all(|byte| *byte == i as u8));
    }

    heap.assert_consistent();
}

#[test]
fn independent_heaps_do_not_interfere() {
    let mut one = vec_heap();
    let mut two = vec_heap();

    let a = one.allocate(64).unwrap();
    let b = two.allocate(64).unwrap();

    // Same layout, same offsets, different arenas.
    assert_eq!(a, b);

    one.payload_mut(a).fill(1);
    two.payload_mut(b).fill(2);

    assert!(one.payload(a).iter().all(|byte| *byte == 1));
    assert!(two.payload(b).iter().all(|byte| *byte == 2));
}

#[test]
fn invalid_config_is_rejected() {
    let config = HeapConfig::new().with_chunk_size(12);

    assert!(matches!(
        SegAlloc::new(VecArena::new(1 << 16), config),
        Err(HeapError::InvalidConfig { .. })
    ));
}
