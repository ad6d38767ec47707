//! Random sequences of heap operations, checked against the heap invariants
//! and against a model of what every live block should contain.

use proptest::prelude::*;

use segalloc::{ALIGNMENT, BlockPtr, HeapConfig, HeapError, SegAlloc, VecArena};

#[derive(Clone, Debug)]
enum Op {
    Allocate(usize),
    Release(usize),
    Reallocate(usize, usize),
    AllocateZeroed(usize, usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..2048).prop_map(Op::Allocate),
        3 => any::<usize>().prop_map(Op::Release),
        2 => (any::<usize>(), 1usize..4096).prop_map(|(i, size)| Op::Reallocate(i, size)),
        1 => (0usize..32, 0usize..64).prop_map(|(count, size)| Op::AllocateZeroed(count, size)),
    ]
}

/// A live allocation: where it is, how many bytes were asked for and the
/// byte it was filled with.
#[derive(Clone, Copy, Debug)]
struct Live {
    bp: BlockPtr,
    size: usize,
    fill: u8,
}

fn fill(heap: &mut SegAlloc<VecArena>, bp: BlockPtr, size: usize, fill: u8) {
    heap.payload_mut(bp)[..size].fill(fill);
}

fn assert_contents(heap: &SegAlloc<VecArena>, live: &[Live]) {
    for entry in live {
        assert!(
            heap.payload(entry.bp)[..entry.size]
                .iter()
                .all(|byte| *byte == entry.fill),
            "contents of {:?} were clobbered",
            entry
        );
    }
}

fn assert_disjoint(heap: &SegAlloc<VecArena>, live: &[Live]) {
    let mut ranges: Vec<_> = live
        .iter()
        .map(|entry| (entry.bp.offset(), entry.bp.offset() + heap.payload_size(entry.bp)))
        .collect();
    ranges.sort_unstable();

    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "payloads {:?} and {:?} overlap", pair[0], pair[1]);
    }
}

proptest! {
    #[test]
    fn random_operations_keep_heap_consistent(
        ops in proptest::collection::vec(arb_op(), 1..150),
    ) {
        let mut heap = SegAlloc::new(VecArena::new(1 << 18), HeapConfig::default()).unwrap();
        let mut live: Vec<Live> = Vec::new();
        let mut next_fill: u8 = 1;

        for op in ops {
            match op {
                Op::Allocate(size) => match heap.allocate(size) {
                    Ok(bp) => {
                        prop_assert_eq!(bp.offset() % ALIGNMENT, 0);
                        fill(&mut heap, bp, size, next_fill);
                        live.push(Live { bp, size, fill: next_fill });
                    }
                    Err(err) => prop_assert!(matches!(err, HeapError::ArenaExhausted { .. }), "unexpected error variant"),
                },
                Op::Release(i) => {
                    if !live.is_empty() {
                        let entry = live.swap_remove(i % live.len());
                        heap.release(Some(entry.bp));
                    }
                }
                Op::Reallocate(i, size) => {
                    if !live.is_empty() {
                        let index = i % live.len();
                        let entry = live[index];

                        match heap.reallocate(Some(entry.bp), size) {
                            Ok(Some(bp)) => {
                                let kept = entry.size.min(size);
                                prop_assert!(heap.payload(bp)[..kept].iter().all(|byte| *byte == entry.fill));

                                fill(&mut heap, bp, size, next_fill);
                                live[index] = Live { bp, size, fill: next_fill };
                            }
                            Ok(None) => prop_assert!(false, "non zero reallocate returned no block"),
                            Err(_) => {
                                prop_assert!(heap.is_allocated(entry.bp));
                            }
                        }
                    }
                }
                Op::AllocateZeroed(count, size) => match heap.allocate_zeroed(count, size) {
                    Ok(bp) => {
                        prop_assert!(heap.payload(bp).iter().all(|byte| *byte == 0));
                        fill(&mut heap, bp, count * size, next_fill);
                        live.push(Live { bp, size: count * size, fill: next_fill });
                    }
                    Err(err) => prop_assert!(matches!(err, HeapError::ArenaExhausted { .. }), "unexpected error variant"),
                },
            }

            next_fill = next_fill.wrapping_add(1).max(1);

            let violations = heap.violations();
            prop_assert!(violations.is_empty(), "{:?}", violations);
            assert_contents(&heap, &live);
            assert_disjoint(&heap, &live);
        }

        // Every live block is allocated, and freeing all of them leaves only
        // free space behind.
        for entry in &live {
            prop_assert!(heap.is_allocated(entry.bp));
        }

        for entry in live.drain(..) {
            heap.release(Some(entry.bp));
        }

        let stats = heap.stats();
        prop_assert_eq!(stats.allocated_blocks, 0);
        prop_assert_eq!(stats.free_blocks, 1);
        prop_assert!(heap.check().is_ok());
    }

    #[test]
    fn stats_account_for_every_byte(
        sizes in proptest::collection::vec(0usize..512, 1..40),
        release_mask in proptest::collection::vec(any::<bool>(), 40),
    ) {
        let mut heap = SegAlloc::new(VecArena::new(1 << 18), HeapConfig::default()).unwrap();
        let blocks: Vec<_> = sizes.iter().map(|size| heap.allocate(*size).unwrap()).collect();

        for (bp, release) in blocks.iter().zip(&release_mask) {
            if *release {
                heap.release(Some(*bp));
            }
        }

        let stats = heap.stats();
        // Padding, prologue and epilogue take 16 bytes.
        prop_assert_eq!(stats.allocated_bytes + stats.free_bytes + 16, stats.heap_size);
        prop_assert!(stats.largest_free <= stats.free_bytes);
        prop_assert!(heap.check().is_ok());
    }
}
