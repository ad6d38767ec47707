use segalloc::{BlockPtr, HeapConfig, HeapError, SegAlloc};

fn log_alloc(heap: &SegAlloc<segalloc::MemLib>, size: usize, bp: BlockPtr) {
    println!("Requested {size} bytes of memory");
    println!(
        "Received block {bp} at {:?} ({} bytes usable)",
        heap.payload_ptr(bp),
        heap.payload_size(bp)
    );
}

fn main() -> Result<(), HeapError> {
    let mut heap = SegAlloc::with_memlib(HeapConfig::default())?;

    let addr1 = heap.allocate(8)?;
    log_alloc(&heap, 8, addr1);

    let addr2 = heap.allocate(8)?;
    log_alloc(&heap, 8, addr2);

    let addr3 = heap.allocate(16)?;
    log_alloc(&heap, 16, addr3);

    heap.release(Some(addr1));
    heap.release(Some(addr2));

    // addr1 and addr2 were merged, so this one fits where they were
    let addr4 = heap.allocate(24)?;
    log_alloc(&heap, 24, addr4);
    println!("Reused the first block: {}", addr4 == addr1);

    let addr5 = heap.reallocate(Some(addr3), 4096)?;
    println!("Reallocated {addr3} to {addr5:?}");

    heap.release(Some(addr4));
    heap.release(addr5);

    println!("{:#?}", heap.stats());
    heap.assert_consistent();

    Ok(())
}
