use std::{
    alloc::{GlobalAlloc, Layout},
    ptr,
};

use spin::Mutex;

use crate::{
    allocator::SegAlloc,
    arena::MemLib,
    block::ALIGNMENT,
    config::HeapConfig,
};

/// A [`SegAlloc`] behind a single lock, usable as the global allocator.
///
/// ```rust,ignore
/// use segalloc::LockedAlloc;
///
/// #[global_allocator]
/// static ALLOCATOR: LockedAlloc = LockedAlloc::new();
/// ```
///
/// The heap itself is created on the first allocation, reserving
/// `config.max_heap` bytes from the operating system. Every entry point takes
/// the same spin lock for its whole duration, there is no finer grained
/// locking since the free lists and the arena are shared by every operation.
/// A spin lock never allocates while waiting, which a parking lock may do.
///
/// Requests that need more than [`ALIGNMENT`] bytes of alignment, and requests
/// the heap can't satisfy, get a null pointer back.
///
/// Whatever `log` implementation is installed must not allocate while the
/// lock is held, otherwise it would try to take it again.
pub struct LockedAlloc {
    heap: Mutex<Option<SegAlloc<MemLib>>>,
    config: HeapConfig,
}

impl LockedAlloc {
    pub const fn new() -> Self {
        Self::with_config(HeapConfig::new())
    }

    pub const fn with_config(config: HeapConfig) -> Self {
        Self {
            heap: Mutex::new(None),
            config,
        }
    }

    /// Runs `f` on the heap, creating it first if needed.
    fn with_heap<R>(&self, f: impl FnOnce(&mut SegAlloc<MemLib>) -> Option<R>) -> Option<R> {
        let mut heap = self.heap.lock();

        if heap.is_none() {
            *heap = SegAlloc::with_memlib(self.config).ok();
        }

        f(heap.as_mut()?)
    }
}

impl Default for LockedAlloc {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for LockedAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        self.with_heap(|heap| {
            let bp = heap.allocate(layout.size()).ok()?;
            Some(heap.payload_ptr(bp))
        })
        .unwrap_or(ptr::null_mut())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.with_heap(|heap| {
            let bp = unsafe { heap.block_at(ptr) };
            heap.release(Some(bp));
            Some(())
        });
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        self.with_heap(|heap| {
            let bp = heap.allocate_zeroed(1, layout.size()).ok()?;
            Some(heap.payload_ptr(bp))
        })
        .unwrap_or(ptr::null_mut())
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        self.with_heap(|heap| {
            let old = unsafe { heap.block_at(ptr) };
            let new = heap.reallocate(Some(old), new_size).ok()??;
            Some(heap.payload_ptr(new))
        })
        .unwrap_or(ptr::null_mut())
    }
}
