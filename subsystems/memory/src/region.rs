//! Backing storage for the bounded regions.

use alloc::alloc::{alloc, dealloc, Layout};
use core::ptr::NonNull;

use crate::config::POISON_BYTE;

/// Alignment of every region buffer
pub const REGION_ALIGN: usize = 16;

/// A fixed, exclusively owned byte range `[begin, begin + len)`
///
/// Allocated once from the platform allocator when the manager is built and
/// released when it is dropped.
pub struct RegionBuffer {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the buffer is uniquely owned; nothing else holds its base pointer
// except allocations handed out by the owning strategy.
unsafe impl Send for RegionBuffer {}

impl RegionBuffer {
    /// Allocate `len` bytes; `None` if the platform allocator fails
    pub fn new(len: usize) -> Option<Self> {
        let layout = Layout::from_size_align(len.max(1), REGION_ALIGN).ok()?;
        // SAFETY: layout has non-zero size.
        let base = NonNull::new(unsafe { alloc(layout) })?;
        Some(Self { base, len })
    }

    /// First address of the region
    #[inline]
    pub fn begin(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// One past the last address of the region
    #[inline]
    pub fn end(&self) -> usize {
        self.begin() + self.len
    }

    /// Size in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region has no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `addr` lies inside the region
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.begin() && addr < self.end()
    }

    /// Pointer `offset` bytes into the region
    #[inline]
    pub fn at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.len);
        // SAFETY: offset stays within the allocation (or one past its end).
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Overwrite `[from, to)` (offsets) with the poison pattern
    pub fn poison(&mut self, from: usize, to: usize) {
        let to = to.min(self.len);
        if from >= to {
            return;
        }
        // SAFETY: the range is inside the buffer; callers only poison bytes
        // that no live allocation refers to.
        unsafe { core::ptr::write_bytes(self.base.as_ptr().add(from), POISON_BYTE, to - from) };
    }
}

impl Drop for RegionBuffer {
    fn drop(&mut self) {
        // SAFETY: same layout as `new`.
        unsafe {
            dealloc(
                self.base.as_ptr(),
                Layout::from_size_align_unchecked(self.len.max(1), REGION_ALIGN),
            );
        }
    }
}

impl core::fmt::Debug for RegionBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegionBuffer")
            .field("begin", &format_args!("{:#x}", self.begin()))
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_bounds() {
        let region = RegionBuffer::new(64).unwrap();
        assert_eq!(region.begin() % REGION_ALIGN, 0);
        assert_eq!(region.end() - region.begin(), 64);
        assert!(region.contains(region.begin()));
        assert!(region.contains(region.end() - 1));
        assert!(!region.contains(region.end()));
    }

    #[test]
    fn test_poison_fill() {
        let mut region = RegionBuffer::new(32).unwrap();
        region.poison(8, 1000);
        let byte = unsafe { *region.at(31).as_ptr() };
        assert_eq!(byte, POISON_BYTE);
    }
}
