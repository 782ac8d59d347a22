//! # Allocator Scopes
//!
//! A scope makes one allocator current for its lifetime and restores the
//! previous one when dropped. [`AllocatorScope`] mutably borrows the manager
//! (or its enclosing scope), so scopes nest strictly LIFO:
//!
//! ```text
//!   let mut outer = manager.enter_scope(AllocatorId::TemporaryStack);
//!   {
//!       let mut inner = outer.enter_scope(AllocatorId::ScratchPage0);
//!       inner.allocate(64);
//!   }                // ScratchPage0 closed, TemporaryStack current again
//!   drop(outer);     // stack rewound, leak checked
//! ```

use core::ops::{Deref, DerefMut};

use crate::id::AllocatorId;
use crate::manager::MemoryManager;

/// Snapshot taken when a scope opens
///
/// The counters are read from the new allocator after its own
/// scope-entry hook has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeFrame {
    pub(crate) id: AllocatorId,
    /// Allocator to restore; `None` for an inert scope
    pub(crate) previous: Option<AllocatorId>,
    pub(crate) previous_allocation_count: usize,
    pub(crate) previous_bytes_allocated: usize,
    /// Scratchpad section selected before this scope opened
    pub(crate) previous_section: Option<usize>,
    pub(crate) depth: usize,
}

impl ScopeFrame {
    /// A frame that opens and closes nothing
    pub(crate) const fn inert(id: AllocatorId) -> Self {
        Self {
            id,
            previous: None,
            previous_allocation_count: 0,
            previous_bytes_allocated: 0,
            previous_section: None,
            depth: 0,
        }
    }

    /// Allocator made current by this scope
    #[inline]
    pub fn id(&self) -> AllocatorId {
        self.id
    }

    /// Allocator that was current before
    #[inline]
    pub fn previous_id(&self) -> Option<AllocatorId> {
        self.previous
    }

    /// Whether the scope changed nothing (manager disabled)
    #[inline]
    pub fn is_inert(&self) -> bool {
        self.previous.is_none()
    }

    /// Allocation count of the scope's allocator at entry
    #[inline]
    pub fn previous_allocation_count(&self) -> usize {
        self.previous_allocation_count
    }

    /// Bytes allocated by the scope's allocator at entry
    #[inline]
    pub fn previous_bytes_allocated(&self) -> usize {
        self.previous_bytes_allocated
    }

    /// Nesting depth, 1 for the outermost scope
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

// =============================================================================
// SCOPE GUARD
// =============================================================================

/// RAII guard for one allocator scope
///
/// Dereferences to the manager, so allocations and nested scopes go through
/// the guard while it is alive.
pub struct AllocatorScope<'m> {
    manager: &'m mut MemoryManager,
    frame: ScopeFrame,
}

impl<'m> AllocatorScope<'m> {
    pub(crate) fn new(manager: &'m mut MemoryManager, id: AllocatorId) -> Self {
        let frame = manager.begin_scope(id);
        Self { manager, frame }
    }

    /// Allocator this scope made current
    #[inline]
    pub fn id(&self) -> AllocatorId {
        self.frame.id
    }

    /// Entry snapshot
    #[inline]
    pub fn frame(&self) -> &ScopeFrame {
        &self.frame
    }

    /// Live allocations of the scope's allocator
    pub fn total_allocation_count(&self) -> usize {
        self.manager.allocation_count(self.frame.id)
    }

    /// Live bytes of the scope's allocator
    pub fn total_bytes_allocated(&self) -> usize {
        self.manager.bytes_allocated(self.frame.id)
    }

    /// Allocations made since the scope opened
    pub fn scope_allocation_count(&self) -> usize {
        self.total_allocation_count()
            .saturating_sub(self.frame.previous_allocation_count)
    }

    /// Bytes allocated since the scope opened
    pub fn scope_bytes_allocated(&self) -> usize {
        self.total_bytes_allocated()
            .saturating_sub(self.frame.previous_bytes_allocated)
    }

    /// See [`ScopeFrame::previous_allocation_count`]
    pub fn previous_allocation_count(&self) -> usize {
        self.frame.previous_allocation_count
    }

    /// See [`ScopeFrame::previous_bytes_allocated`]
    pub fn previous_bytes_allocated(&self) -> usize {
        self.frame.previous_bytes_allocated
    }
}

impl Deref for AllocatorScope<'_> {
    type Target = MemoryManager;

    fn deref(&self) -> &MemoryManager {
        self.manager
    }
}

impl DerefMut for AllocatorScope<'_> {
    fn deref_mut(&mut self) -> &mut MemoryManager {
        self.manager
    }
}

impl Drop for AllocatorScope<'_> {
    fn drop(&mut self) {
        self.manager.end_scope(&self.frame);
    }
}

impl core::fmt::Debug for AllocatorScope<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AllocatorScope").field("frame", &self.frame).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;

    #[test]
    fn test_scope_restores_previous_allocator() {
        let mut manager = MemoryManager::new(MemoryConfig::default()).unwrap();
        assert_eq!(manager.current_id(), AllocatorId::Heap);
        {
            let mut temp = manager.enter_scope(AllocatorId::TemporaryStack);
            assert_eq!(temp.current_id(), AllocatorId::TemporaryStack);
            assert_eq!(temp.frame().depth(), 1);
            {
                let inner = temp.enter_scope(AllocatorId::Permanent);
                assert_eq!(inner.current_id(), AllocatorId::Permanent);
                assert_eq!(inner.frame().previous_id(), Some(AllocatorId::TemporaryStack));
                assert_eq!(inner.frame().depth(), 2);
            }
            assert_eq!(temp.current_id(), AllocatorId::TemporaryStack);
        }
        assert_eq!(manager.current_id(), AllocatorId::Heap);
    }

    #[test]
    fn test_scope_counters() {
        let mut manager = MemoryManager::new(MemoryConfig::default()).unwrap();
        let mut temp = manager.enter_scope(AllocatorId::TemporaryStack);
        let a = temp.allocate(32);
        let b = temp.allocate(32);
        {
            let mut inner = temp.enter_scope(AllocatorId::TemporaryStack);
            assert_eq!(inner.previous_allocation_count(), 2);
            assert_eq!(inner.previous_bytes_allocated(), 64);
            let c = inner.allocate(16);
            assert_eq!(inner.scope_allocation_count(), 1);
            assert_eq!(inner.scope_bytes_allocated(), 16);
            assert_eq!(inner.total_allocation_count(), 3);
            unsafe { inner.free(c.as_ptr()) };
        }
        assert_eq!(temp.total_bytes_allocated(), 64);
        unsafe {
            temp.free(b.as_ptr());
            temp.free(a.as_ptr());
        }
        assert_eq!(temp.scope_allocation_count(), 0);
    }
}
