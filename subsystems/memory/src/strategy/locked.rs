//! Allocation trip-wire.

use core::ptr::NonNull;

use super::AllocatorStrategy;
use crate::align::AlignMask;
use crate::diag::{mem_warn, Diagnostics, FaultKind};
use crate::id::AllocatorId;

/// Strategy that refuses every allocation
///
/// Made current around code that must not allocate. A refused request
/// falls through to the heap, so the program keeps running with a warning.
#[derive(Debug, Default)]
pub struct LockedAllocator;

impl LockedAllocator {
    /// Create the trip-wire
    pub const fn new() -> Self {
        Self
    }
}

impl AllocatorStrategy for LockedAllocator {
    fn label(&self) -> &'static str {
        AllocatorId::Locked.name()
    }

    fn allocate(
        &mut self,
        size: usize,
        _align: AlignMask,
        diag: &mut Diagnostics,
    ) -> Option<NonNull<u8>> {
        mem_warn!(diag, FaultKind::LockedAllocation, "allocation while locked, size {}", size);
        None
    }

    // Owns no addresses, so nothing is ever routed here.
    unsafe fn free(&mut self, _ptr: NonNull<u8>, _diag: &mut Diagnostics) {}

    fn contains(&self, _addr: usize) -> bool {
        false
    }

    fn allocation_count(&self, _id: AllocatorId) -> usize {
        0
    }

    fn bytes_allocated(&self, _id: AllocatorId) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_locked_refuses_and_warns() {
        let mut diag = Diagnostics::new(Settings { logging: false, ..Settings::default() });
        let mut locked = LockedAllocator::new();

        assert!(locked.allocate(16, AlignMask::WORD, &mut diag).is_none());
        assert_eq!(diag.warning_count(), 1);
        assert_eq!(diag.count_of(FaultKind::LockedAllocation), 1);

        unsafe { locked.free(NonNull::dangling(), &mut diag) };
        assert_eq!(diag.warning_count(), 1);
        assert_eq!(diag.assertion_count(), 0);
    }
}
