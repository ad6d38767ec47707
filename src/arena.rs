use std::{
    ptr::NonNull,
    slice,
    sync::atomic::{AtomicUsize, Ordering},
};

use log::debug;

use crate::{error::HeapError, utils::align};

/// Where the allocator gets its memory from.
///
/// The arena is a single contiguous range of bytes that only ever grows at its
/// end, like the data segment of a process grows with `sbrk`. Everything is
/// addressed by offsets from the start of the arena, so a provider is free to
/// move its storage around as long as the contents stay the same.
pub trait ArenaProvider {
    /// Grows the arena by `incr` bytes. Returns the offset of the first new
    /// byte (the old break), or `None` if the arena can't grow any more.
    fn sbrk(&mut self, incr: usize) -> Option<usize>;

    /// Current size of the arena in bytes.
    fn heap_size(&self) -> usize;

    /// Every byte handed out so far.
    fn bytes(&self) -> &[u8];

    fn bytes_mut(&mut self) -> &mut [u8];

    /// Offset of the first byte of the arena.
    fn heap_lo(&self) -> usize {
        0
    }

    /// Offset of the last byte of the arena.
    fn heap_hi(&self) -> usize {
        self.heap_size().saturating_sub(1)
    }
}

/// Virtual memory page size of the computer. This is usually 4096.
/// We can't know it at compile time, so it is computed on first use.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. As the allocator, our top level view of this has nothing
/// to do with the concrete implementations / APIs offered by each kernel.
trait PlatformMemory {
    /// Request a memory region of size `len`. It returns a Pointer to the
    /// given location or None if the underlying syscall fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: *mut u8, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

/// Arena backed by a region reserved from the operating system.
///
/// This is a simulated data segment: we reserve `max_heap` bytes once and
/// move a break through it. The reservation never moves, so payload offsets
/// translate to stable addresses through [`MemLib::as_ptr`].
///
/// ```text
///  start                     brk                         start + capacity
///    |                        |                                 |
///    v                        v                                 v
///    +------------------------+---------------------------------+
///    |      heap (in use)     |        reserved, not yet        |
///    |                        |           handed out            |
///    +------------------------+---------------------------------+
/// ```
pub struct MemLib {
    /// Start of the region returned by the kernel.
    start: NonNull<u8>,
    /// Bytes handed out to the allocator so far.
    brk: usize,
    /// Size of the reservation, a multiple of the page size.
    capacity: usize,
    /// Number of successful calls to `sbrk`.
    extensions: usize,
}

// SAFETY: `MemLib` owns its region exclusively, nothing else points into it.
unsafe impl Send for MemLib {}

impl MemLib {
    /// Reserves `max_heap` bytes (rounded up to the page size).
    pub fn new(max_heap: usize) -> Result<Self, HeapError> {
        let capacity = align(max_heap.max(1), page_size());

        let start = unsafe { MemLib::request_memory(capacity) }.ok_or(HeapError::ArenaExhausted {
            requested: capacity,
            heap_size: 0,
        })?;

        debug!("memlib: reserved {capacity} bytes at {:p}", start);

        Ok(Self {
            start,
            brk: 0,
            capacity,
            extensions: 0,
        })
    }

    /// Address of offset 0 of the arena.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.start.as_ptr()
    }

    /// Number of bytes reserved for the arena.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many times the arena has been extended.
    #[inline]
    pub fn extensions(&self) -> usize {
        self.extensions
    }
}

impl ArenaProvider for MemLib {
    fn sbrk(&mut self, incr: usize) -> Option<usize> {
        let new_brk = self.brk.checked_add(incr)?;

        if new_brk > self.capacity {
            return None;
        }

        let old_brk = self.brk;
        self.brk = new_brk;
        self.extensions += 1;

        Some(old_brk)
    }

    #[inline]
    fn heap_size(&self) -> usize {
        self.brk
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: the first `brk` bytes of the reservation are mapped
        // read-write and only reachable through `self`.
        unsafe { slice::from_raw_parts(self.start.as_ptr(), self.brk) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: see `bytes`, `&mut self` makes the access exclusive.
        unsafe { slice::from_raw_parts_mut(self.start.as_ptr(), self.brk) }
    }
}

impl Drop for MemLib {
    fn drop(&mut self) {
        unsafe { MemLib::return_memory(self.start.as_ptr(), self.capacity) }
    }
}

/// Arena backed by a `Vec<u8>` that grows up to `limit` bytes.
///
/// Useful on targets without a [`MemLib`] implementation and for tests that
/// need a tiny, exact limit. Addresses of the backing buffer change when it
/// grows, only offsets are stable.
pub struct VecArena {
    data: Vec<u8>,
    limit: usize,
}

impl VecArena {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
        }
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl ArenaProvider for VecArena {
    fn sbrk(&mut self, incr: usize) -> Option<usize> {
        let old_brk = self.data.len();
        let new_brk = old_brk.checked_add(incr)?;

        if new_brk > self.limit {
            return None;
        }

        self.data.resize(new_brk, 0);

        Some(old_brk)
    }

    #[inline]
    fn heap_size(&self) -> usize {
        self.data.len()
    }

    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Wrapper to calculate the computer's page size.
#[inline]
pub(crate) fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = unsafe { MemLib::page_size() };
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

#[cfg(unix)]
mod unix {
    use super::{MemLib, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for MemLib {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                if addr == libc::MAP_FAILED {
                    return None;
                }

                NonNull::new(addr.cast::<u8>())
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr as *mut c_void, len as size_t);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use super::{MemLib, PlatformMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for MemLib {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}
