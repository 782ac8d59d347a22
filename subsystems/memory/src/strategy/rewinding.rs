//! Temporary stack: a linear stack that rewinds on scope exit.

use core::ptr::NonNull;

use super::{AllocatorStrategy, LinearStack};
use crate::align::AlignMask;
use crate::diag::{mem_assert, mem_debug_assert, Diagnostics, FaultKind};
use crate::id::AllocatorId;
use crate::scope::ScopeFrame;

/// Linear stack whose cursor and count are restored when a scope closes
///
/// Everything allocated inside a scope must be freed before it closes;
/// the count check at exit is the leak detector.
#[derive(Debug)]
pub struct RewindingStack {
    stack: LinearStack,
    poison: bool,
}

impl RewindingStack {
    /// Create a rewinding stack of `budget` bytes
    pub fn new(label: &'static str, budget: usize, poison: bool) -> Option<Self> {
        Some(Self {
            stack: LinearStack::new(label, budget, poison)?,
            poison,
        })
    }

    /// Allocation fast path
    #[inline]
    pub fn bump(&mut self, size: usize, align: AlignMask) -> Option<NonNull<u8>> {
        self.stack.bump(size, align)
    }

    /// Free fast path; frees are legal here
    #[inline]
    pub fn release(&mut self, addr: usize, diag: &mut Diagnostics) {
        self.stack.release(addr, diag);
    }

    /// Bytes still available
    #[inline]
    pub fn remaining(&self) -> usize {
        self.stack.remaining()
    }
}

impl AllocatorStrategy for RewindingStack {
    fn label(&self) -> &'static str {
        self.stack.label()
    }

    #[inline]
    fn allocate(
        &mut self,
        size: usize,
        align: AlignMask,
        _diag: &mut Diagnostics,
    ) -> Option<NonNull<u8>> {
        self.stack.bump(size, align)
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, diag: &mut Diagnostics) {
        self.stack.release(ptr.as_ptr() as usize, diag);
    }

    #[inline]
    fn contains(&self, addr: usize) -> bool {
        self.stack.contains(addr)
    }

    fn end_scope(&mut self, frame: &ScopeFrame, _old_id: AllocatorId, diag: &mut Diagnostics) {
        let previous = frame.previous_bytes_allocated;
        let count = self.stack.allocation_count(AllocatorId::TemporaryStack);

        if self.poison {
            self.stack.poison(previous, self.stack.cursor());
        }
        mem_debug_assert!(
            diag,
            count == frame.previous_allocation_count,
            FaultKind::Leak,
            "{} leaked {} allocations",
            self.stack.label(),
            count as isize - frame.previous_allocation_count as isize
        );

        self.stack.reset(previous, frame.previous_allocation_count);
        mem_assert!(
            diag,
            self.stack.cursor() <= self.stack.len(),
            FaultKind::Corruption,
            "error resetting {}",
            self.stack.label()
        );
    }

    fn allocation_count(&self, id: AllocatorId) -> usize {
        self.stack.allocation_count(id)
    }

    fn bytes_allocated(&self, id: AllocatorId) -> usize {
        self.stack.bytes_allocated(id)
    }

    fn capacity(&self, id: AllocatorId) -> usize {
        self.stack.capacity(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, POISON_BYTE};

    fn frame(previous_allocation_count: usize, previous_bytes_allocated: usize) -> ScopeFrame {
        ScopeFrame {
            id: AllocatorId::TemporaryStack,
            previous: Some(AllocatorId::Heap),
            previous_allocation_count,
            previous_bytes_allocated,
            previous_section: None,
            depth: 1,
        }
    }

    #[test]
    fn test_clean_scope_rewinds() {
        let mut diag = Diagnostics::new(Settings::default());
        let mut temp = RewindingStack::new("temp", 256, true).unwrap();
        let snapshot = frame(0, 0);

        let a = temp.bump(32, AlignMask::WORD).unwrap();
        let b = temp.bump(16, AlignMask::WORD).unwrap();
        unsafe {
            temp.free(b, &mut diag);
            temp.free(a, &mut diag);
        }
        temp.end_scope(&snapshot, AllocatorId::Heap, &mut diag);

        assert_eq!(temp.allocation_count(AllocatorId::TemporaryStack), 0);
        assert_eq!(temp.bytes_allocated(AllocatorId::TemporaryStack), 0);
        assert_eq!(temp.remaining(), 256);
        assert_eq!(unsafe { *a.as_ptr() }, POISON_BYTE);
        assert_eq!(diag.assertion_count(), 0);
    }

    #[test]
    fn test_leaked_allocation_consumes_credit() {
        let mut diag = Diagnostics::new(Settings { logging: false, asserts_allowed: 1, ..Settings::default() });
        let mut temp = RewindingStack::new("temp", 256, false).unwrap();
        let snapshot = frame(0, 0);

        temp.bump(100, AlignMask::WORD).unwrap();
        temp.end_scope(&snapshot, AllocatorId::Heap, &mut diag);

        // the stack is rewound regardless
        assert_eq!(temp.allocation_count(AllocatorId::TemporaryStack), 0);
        assert_eq!(temp.bytes_allocated(AllocatorId::TemporaryStack), 0);
        if cfg!(debug_assertions) {
            assert_eq!(diag.settings.asserts_allowed, 0);
            assert_eq!(diag.count_of(FaultKind::Leak), 1);
        }
    }

    #[test]
    fn test_nested_snapshot_keeps_outer_allocations() {
        let mut diag = Diagnostics::new(Settings::default());
        let mut temp = RewindingStack::new("temp", 256, false).unwrap();

        let outer = temp.bump(24, AlignMask::WORD).unwrap();
        let inner_frame = frame(1, temp.bytes_allocated(AllocatorId::TemporaryStack));
        let inner = temp.bump(40, AlignMask::WORD).unwrap();
        unsafe { temp.free(inner, &mut diag) };
        temp.end_scope(&inner_frame, AllocatorId::TemporaryStack, &mut diag);

        assert_eq!(temp.allocation_count(AllocatorId::TemporaryStack), 1);
        assert_eq!(temp.bytes_allocated(AllocatorId::TemporaryStack), 24);
        unsafe { temp.free(outer, &mut diag) };
        assert_eq!(diag.assertion_count(), 0);
    }
}
