//! Bump-pointer stack over a fixed region.
//!
//! Used directly for the never-freed Permanent and Resource regions, and
//! wrapped by [`RewindingStack`](super::RewindingStack) for the temporary
//! stack. The cursor only moves forward; memory comes back solely when a
//! rewinding scope resets it.

use core::ptr::NonNull;

use super::AllocatorStrategy;
use crate::align::AlignMask;
use crate::diag::{mem_debug_assert, mem_warn, Diagnostics, FaultKind};
use crate::id::AllocatorId;
use crate::region::RegionBuffer;

/// Linear bump allocator over `[begin, end)`
///
/// Invariant: `0 <= cursor <= len`; every handed-out pointer lies below the
/// cursor.
#[derive(Debug)]
pub struct LinearStack {
    label: &'static str,
    buffer: RegionBuffer,
    /// Offset of the next free byte
    cursor: usize,
    allocation_count: usize,
}

impl LinearStack {
    /// Create a stack of `budget` bytes; `None` if the region cannot be
    /// allocated
    pub fn new(label: &'static str, budget: usize, poison: bool) -> Option<Self> {
        let mut buffer = RegionBuffer::new(budget)?;
        if poison {
            buffer.poison(0, budget);
        }
        Some(Self {
            label,
            buffer,
            cursor: 0,
            allocation_count: 0,
        })
    }

    /// Bump the cursor; the allocation fast path
    #[inline]
    pub fn bump(&mut self, size: usize, align: AlignMask) -> Option<NonNull<u8>> {
        let begin = self.buffer.begin();
        let aligned = align.align_up(begin + self.cursor)?;
        let end = aligned.checked_add(size)?;
        if end > self.buffer.end() {
            return None;
        }
        self.cursor = end - begin;
        self.allocation_count += 1;
        Some(self.buffer.at(aligned - begin))
    }

    /// Bookkeeping shared by every free into a stack
    ///
    /// Pointers below the cursor retire one allocation; anything else is a
    /// free after the stack was reset.
    pub fn release(&mut self, addr: usize, diag: &mut Diagnostics) {
        let top = self.buffer.begin() + self.cursor;
        mem_debug_assert!(
            diag,
            self.allocation_count > 0 && addr >= self.buffer.begin() && addr < top,
            FaultKind::StrayFree,
            "{} free after stack reset",
            self.label
        );
        if addr < top {
            self.allocation_count = self.allocation_count.saturating_sub(1);
        }
    }

    /// Offset of the next free byte
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor back to a recorded offset
    pub(crate) fn reset(&mut self, cursor: usize, allocation_count: usize) {
        self.cursor = cursor;
        self.allocation_count = allocation_count;
    }

    /// Region size in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the region has no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bytes still available before the region end
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.cursor)
    }

    /// Overwrite `[from, to)` (offsets) with the poison pattern
    pub(crate) fn poison(&mut self, from: usize, to: usize) {
        self.buffer.poison(from, to);
    }
}

impl AllocatorStrategy for LinearStack {
    fn label(&self) -> &'static str {
        self.label
    }

    #[inline]
    fn allocate(
        &mut self,
        size: usize,
        align: AlignMask,
        _diag: &mut Diagnostics,
    ) -> Option<NonNull<u8>> {
        self.bump(size, align)
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, diag: &mut Diagnostics) {
        self.release(ptr.as_ptr() as usize, diag);
        if !diag.settings.shutting_down {
            mem_warn!(diag, FaultKind::IllegalFree, "{}: illegal free()", self.label);
        }
    }

    #[inline]
    fn contains(&self, addr: usize) -> bool {
        self.buffer.contains(addr)
    }

    fn allocation_count(&self, _id: AllocatorId) -> usize {
        self.allocation_count
    }

    fn bytes_allocated(&self, _id: AllocatorId) -> usize {
        self.cursor
    }

    fn capacity(&self, _id: AllocatorId) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn quiet() -> Diagnostics {
        Diagnostics::new(Settings { logging: false, ..Settings::default() })
    }

    #[test]
    fn test_bump_is_aligned_and_bounded() {
        let mut stack = LinearStack::new("perm", 64, true).unwrap();
        let a = stack.bump(3, AlignMask::BYTE).unwrap();
        let b = stack.bump(8, AlignMask::VECTOR).unwrap();
        assert!(AlignMask::VECTOR.is_aligned(b.as_ptr() as usize));
        assert!(b.as_ptr() as usize >= a.as_ptr() as usize + 3);
        assert_eq!(stack.allocation_count(AllocatorId::Permanent), 2);
        assert_eq!(stack.bytes_allocated(AllocatorId::Permanent), 24);

        assert!(stack.bump(41, AlignMask::BYTE).is_none());
        assert!(stack.bump(40, AlignMask::BYTE).is_some());
        assert_eq!(stack.remaining(), 0);
    }

    #[test]
    fn test_free_into_never_freed_region_warns() {
        let mut diag = quiet();
        let mut stack = LinearStack::new("perm", 64, false).unwrap();
        let ptr = stack.bump(8, AlignMask::WORD).unwrap();

        unsafe { stack.free(ptr, &mut diag) };
        assert_eq!(diag.warning_count(), 1);
        assert_eq!(diag.count_of(FaultKind::IllegalFree), 1);
        assert_eq!(stack.allocation_count(AllocatorId::Permanent), 0);
        // the bytes are never handed back
        assert_eq!(stack.bytes_allocated(AllocatorId::Permanent), 8);
    }

    #[test]
    fn test_free_during_shutdown_is_quiet() {
        let mut diag = quiet();
        diag.settings.shutting_down = true;
        let mut stack = LinearStack::new("res", 64, false).unwrap();
        let ptr = stack.bump(8, AlignMask::WORD).unwrap();

        unsafe { stack.free(ptr, &mut diag) };
        assert_eq!(diag.warning_count(), 0);
        assert_eq!(stack.allocation_count(AllocatorId::Resource), 0);
    }

    #[test]
    fn test_free_above_cursor_is_stray() {
        let mut diag = Diagnostics::new(Settings { logging: false, asserts_allowed: 1, ..Settings::default() });
        let mut stack = LinearStack::new("temp", 64, false).unwrap();
        let ptr = stack.bump(8, AlignMask::WORD).unwrap();
        stack.reset(0, 0);

        stack.release(ptr.as_ptr() as usize, &mut diag);
        assert_eq!(stack.allocation_count(AllocatorId::TemporaryStack), 0);
        if cfg!(debug_assertions) {
            assert_eq!(diag.settings.asserts_allowed, 0);
            assert_eq!(diag.count_of(FaultKind::StrayFree), 1);
        }
    }
}
