//! Platform heap strategy.
//!
//! Every heap block carries a small header just below the payload so a free
//! can recover the layout from the pointer alone:
//!
//! ```text
//!   raw ─▶ ┌─────────┬──────────────┬─────────────────────────┐
//!          │ padding │ HeapHeader   │ payload (size bytes)    │
//!          └─────────┴──────────────┴─────────────────────────┘
//!                                   ▲ returned pointer, aligned
//! ```

use alloc::alloc::{alloc, dealloc, Layout};
use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use static_assertions::assert_eq_size;

use super::AllocatorStrategy;
use crate::align::AlignMask;
use crate::diag::{mem_debug_assert, Diagnostics, FaultKind};
use crate::id::AllocatorId;

/// Bookkeeping stored in front of each heap payload
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapHeader {
    /// Payload size; zero once freed
    pub size: usize,
    /// Alignment the block was allocated with
    pub align: usize,
}

/// Size of [`HeapHeader`]
pub const HEAP_HEADER_SIZE: usize = size_of::<HeapHeader>();

assert_eq_size!(HeapHeader, [usize; 2]);

#[inline]
fn header_offset(align: usize) -> usize {
    (HEAP_HEADER_SIZE + align - 1) & !(align - 1)
}

/// Allocate `size` bytes straight from the platform allocator
///
/// `None` when the platform allocator fails or the request cannot be
/// described by a [`Layout`].
pub fn platform_allocate(size: usize, align: AlignMask) -> Option<NonNull<u8>> {
    let align = align.align().max(align_of::<HeapHeader>());
    if !align.is_power_of_two() {
        return None;
    }
    let offset = header_offset(align);
    let layout = Layout::from_size_align(offset.checked_add(size)?, align).ok()?;

    // SAFETY: layout size is at least one header.
    let raw = NonNull::new(unsafe { alloc(layout) })?;
    // SAFETY: offset + size is inside the block; the header slot sits directly
    // below the payload and is aligned because the payload is.
    unsafe {
        let payload = raw.as_ptr().add(offset);
        payload.cast::<HeapHeader>().sub(1).write(HeapHeader { size, align });
        Some(NonNull::new_unchecked(payload))
    }
}

/// Return a block to the platform allocator
///
/// Returns the payload size, or `None` if the header was already cleared.
///
/// # Safety
///
/// `ptr` must come from [`platform_allocate`] and its block must not have
/// been released since.
pub unsafe fn platform_free(ptr: NonNull<u8>) -> Option<usize> {
    // SAFETY: caller guarantees a header sits below `ptr`.
    let header_ptr = unsafe { ptr.as_ptr().cast::<HeapHeader>().sub(1) };
    let header = unsafe { header_ptr.read() };
    if header.size == 0 {
        return None;
    }
    // SAFETY: clearing the header makes a second free detectable while the
    // block is still ours; the layout is rebuilt exactly as allocated.
    unsafe {
        header_ptr.write(HeapHeader { size: 0, align: header.align });
        let offset = header_offset(header.align);
        dealloc(
            ptr.as_ptr().sub(offset),
            Layout::from_size_align_unchecked(offset + header.size, header.align),
        );
    }
    Some(header.size)
}

// =============================================================================
// OS HEAP
// =============================================================================

/// General-purpose strategy backed by the platform allocator
#[derive(Debug)]
pub struct OsHeap {
    allocation_count: usize,
    bytes_allocated: usize,
    trace: bool,
}

impl OsHeap {
    /// Create the heap strategy; `trace` logs every allocation and free
    pub const fn new(trace: bool) -> Self {
        Self {
            allocation_count: 0,
            bytes_allocated: 0,
            trace,
        }
    }
}

impl AllocatorStrategy for OsHeap {
    fn label(&self) -> &'static str {
        AllocatorId::Heap.name()
    }

    fn allocate(
        &mut self,
        size: usize,
        align: AlignMask,
        diag: &mut Diagnostics,
    ) -> Option<NonNull<u8>> {
        let Some(ptr) = platform_allocate(size, align) else {
            diag.fatal(FaultKind::HeapExhausted, format_args!("malloc failed, {} bytes", size));
        };
        self.allocation_count += 1;
        self.bytes_allocated += size;
        if self.trace {
            log::trace!("heap: allocated {} bytes at {:p}", size, ptr);
        }
        Some(ptr)
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, diag: &mut Diagnostics) {
        mem_debug_assert!(diag, self.allocation_count > 0, FaultKind::DoubleFree, "heap free with no live allocations");
        // SAFETY: forwarded contract; every heap block comes from platform_allocate.
        match unsafe { platform_free(ptr) } {
            Some(size) => {
                self.allocation_count = self.allocation_count.saturating_sub(1);
                self.bytes_allocated = self.bytes_allocated.saturating_sub(size);
                if self.trace {
                    log::trace!("heap: freed {} bytes at {:p}", size, ptr);
                }
            }
            None => {
                mem_debug_assert!(diag, false, FaultKind::DoubleFree, "heap block {:p} freed twice", ptr);
            }
        }
    }

    fn contains(&self, _addr: usize) -> bool {
        false
    }

    fn allocation_count(&self, _id: AllocatorId) -> usize {
        self.allocation_count
    }

    fn bytes_allocated(&self, _id: AllocatorId) -> usize {
        self.bytes_allocated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_platform_roundtrip_keeps_alignment() {
        for mask in [AlignMask::BYTE, AlignMask::WORD, AlignMask::VECTOR] {
            let ptr = platform_allocate(24, mask).unwrap();
            assert!(mask.is_aligned(ptr.as_ptr() as usize));
            let size = unsafe { platform_free(ptr) };
            assert_eq!(size, Some(24));
        }
    }

    #[test]
    fn test_heap_counts_and_bytes() {
        let mut diag = Diagnostics::new(Settings::default());
        let mut heap = OsHeap::new(false);

        let a = heap.allocate(100, AlignMask::WORD, &mut diag).unwrap();
        let b = heap.allocate(200, AlignMask::WORD, &mut diag).unwrap();
        assert_eq!(heap.allocation_count(AllocatorId::Heap), 2);
        assert_eq!(heap.bytes_allocated(AllocatorId::Heap), 300);

        unsafe {
            heap.free(a, &mut diag);
            heap.free(b, &mut diag);
        }
        assert_eq!(heap.allocation_count(AllocatorId::Heap), 0);
        assert_eq!(heap.bytes_allocated(AllocatorId::Heap), 0);
        assert_eq!(diag.assertion_count(), 0);
    }

    #[test]
    fn test_heap_never_claims_addresses() {
        let mut diag = Diagnostics::new(Settings::default());
        let mut heap = OsHeap::new(false);
        let ptr = heap.allocate(8, AlignMask::WORD, &mut diag).unwrap();
        assert!(!heap.contains(ptr.as_ptr() as usize));
        unsafe { heap.free(ptr, &mut diag) };
    }
}
