//! # Allocator Strategies
//!
//! Every region is served by one strategy. The set is closed, so the manager
//! holds them as [`Strategy`] variants and dispatches with a `match`; the
//! [`AllocatorStrategy`] trait is the contract each variant implements.
//!
//! ```text
//! ┌──────────────┬────────────────┬───────────────────────────────────────┐
//! │ Strategy     │ Ids            │ Reclaims                              │
//! ├──────────────┼────────────────┼───────────────────────────────────────┤
//! │ OsHeap       │ Heap           │ every free                            │
//! │ LinearStack  │ Permanent,     │ never                                 │
//! │              │ Resource       │                                       │
//! │ Rewinding    │ TemporaryStack │ scope exit (leak checked)             │
//! │ Locked       │ Locked         │ nothing to reclaim                    │
//! │ Scratchpad   │ Scratch*       │ section close                         │
//! └──────────────┴────────────────┴───────────────────────────────────────┘
//! ```

mod heap;
mod linear;
mod locked;
mod rewinding;
mod scratchpad;

use core::ptr::NonNull;

pub use heap::{platform_allocate, platform_free, HeapHeader, OsHeap, HEAP_HEADER_SIZE};
pub use linear::LinearStack;
pub use locked::LockedAllocator;
pub use rewinding::RewindingStack;
pub use scratchpad::Scratchpad;

use crate::align::AlignMask;
use crate::diag::Diagnostics;
use crate::id::AllocatorId;
use crate::scope::ScopeFrame;

// =============================================================================
// STRATEGY TRAIT
// =============================================================================

/// Contract shared by every region strategy
pub trait AllocatorStrategy {
    /// Name used in diagnostics
    fn label(&self) -> &'static str;

    /// Allocate `size` bytes (never zero) aligned to `align`;
    /// `None` when the region cannot satisfy the request.
    fn allocate(
        &mut self,
        size: usize,
        align: AlignMask,
        diag: &mut Diagnostics,
    ) -> Option<NonNull<u8>>;

    /// Release an allocation
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this strategy (or, for the heap, by
    /// a strategy that declined ownership of it) and not freed since.
    unsafe fn free(&mut self, ptr: NonNull<u8>, diag: &mut Diagnostics);

    /// Whether `addr` lies in the address range this strategy manages
    fn contains(&self, addr: usize) -> bool;

    /// Called after `id` becomes the current allocator
    fn begin_scope(&mut self, _frame: &ScopeFrame, _new_id: AllocatorId, _diag: &mut Diagnostics) {}

    /// Called before `old_id` becomes the current allocator again
    fn end_scope(&mut self, _frame: &ScopeFrame, _old_id: AllocatorId, _diag: &mut Diagnostics) {}

    /// Live allocations attributed to `id`
    fn allocation_count(&self, id: AllocatorId) -> usize;

    /// Live bytes attributed to `id`
    fn bytes_allocated(&self, id: AllocatorId) -> usize;

    /// Most bytes `id` has ever had in use
    fn high_water(&self, _id: AllocatorId) -> usize {
        0
    }

    /// Fixed capacity of `id`; zero when unbounded or unusable
    fn capacity(&self, _id: AllocatorId) -> usize {
        0
    }
}

// =============================================================================
// STRATEGY VARIANTS
// =============================================================================

/// One region strategy
#[derive(Debug)]
pub enum Strategy {
    /// Platform heap
    Heap(OsHeap),
    /// Never-freed bump region
    Linear(LinearStack),
    /// Scope-rewinding bump region
    Rewinding(RewindingStack),
    /// Allocation trip-wire
    Locked(LockedAllocator),
    /// Sectioned scratchpad
    Scratchpad(Scratchpad),
}

macro_rules! dispatch {
    ($self:expr, $strategy:ident => $body:expr) => {
        match $self {
            Strategy::Heap($strategy) => $body,
            Strategy::Linear($strategy) => $body,
            Strategy::Rewinding($strategy) => $body,
            Strategy::Locked($strategy) => $body,
            Strategy::Scratchpad($strategy) => $body,
        }
    };
}

impl Strategy {
    /// Allocate, normalizing zero-size requests to one byte so concurrently
    /// live allocations never share an address.
    #[inline]
    pub fn allocate_normalized(
        &mut self,
        size: usize,
        align: AlignMask,
        diag: &mut Diagnostics,
    ) -> Option<NonNull<u8>> {
        self.allocate(size.max(1), align, diag)
    }
}

impl AllocatorStrategy for Strategy {
    fn label(&self) -> &'static str {
        dispatch!(self, s => s.label())
    }

    #[inline]
    fn allocate(
        &mut self,
        size: usize,
        align: AlignMask,
        diag: &mut Diagnostics,
    ) -> Option<NonNull<u8>> {
        dispatch!(self, s => s.allocate(size, align, diag))
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, diag: &mut Diagnostics) {
        // SAFETY: forwarded contract.
        dispatch!(self, s => unsafe { s.free(ptr, diag) })
    }

    #[inline]
    fn contains(&self, addr: usize) -> bool {
        dispatch!(self, s => s.contains(addr))
    }

    fn begin_scope(&mut self, frame: &ScopeFrame, new_id: AllocatorId, diag: &mut Diagnostics) {
        dispatch!(self, s => s.begin_scope(frame, new_id, diag))
    }

    fn end_scope(&mut self, frame: &ScopeFrame, old_id: AllocatorId, diag: &mut Diagnostics) {
        dispatch!(self, s => s.end_scope(frame, old_id, diag))
    }

    fn allocation_count(&self, id: AllocatorId) -> usize {
        dispatch!(self, s => s.allocation_count(id))
    }

    fn bytes_allocated(&self, id: AllocatorId) -> usize {
        dispatch!(self, s => s.bytes_allocated(id))
    }

    fn high_water(&self, id: AllocatorId) -> usize {
        dispatch!(self, s => s.high_water(id))
    }

    fn capacity(&self, id: AllocatorId) -> usize {
        dispatch!(self, s => s.capacity(id))
    }
}
