//! # Memory Manager
//!
//! Owns one strategy per region and routes requests between them.
//!
//! ```text
//!   allocate ──▶ current allocator ──ok──▶ ptr
//!                     │ none
//!                     ▼
//!              warn "overflowing to heap" ──▶ OsHeap ──▶ ptr
//!
//!   free ──▶ temp stack owns it?  ──yes──▶ release
//!              │ no
//!              ▼
//!            scan ids high → low, first region containing ptr
//!              │ none
//!              ▼
//!            OsHeap
//! ```
//!
//! The manager is single-threaded: one instance per execution context, or
//! behind the lock in [`crate::global`].

use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use crate::align::AlignMask;
use crate::config::{DiagnosticFlags, MemoryConfig, Settings};
use crate::diag::{mem_assert, mem_debug_assert, Diagnostics, FaultKind};
use crate::id::AllocatorId;
use crate::scope::{AllocatorScope, ScopeFrame};
use crate::strategy::{
    platform_allocate, platform_free, AllocatorStrategy, LinearStack, LockedAllocator, OsHeap,
    RewindingStack, Scratchpad, Strategy,
};
use crate::{MemoryError, MemoryResult};

// =============================================================================
// STRATEGY SLOTS
// =============================================================================

/// Number of distinct strategies; every scratchpad id shares one
const SLOT_COUNT: usize = 6;

const HEAP_SLOT: usize = 0;
const TEMPORARY_SLOT: usize = 3;
const SCRATCHPAD_SLOT: usize = 5;

#[inline]
const fn slot(id: AllocatorId) -> usize {
    match id {
        AllocatorId::Heap => HEAP_SLOT,
        AllocatorId::Permanent => 1,
        AllocatorId::Resource => 2,
        AllocatorId::TemporaryStack => TEMPORARY_SLOT,
        AllocatorId::Locked => 4,
        _ => SCRATCHPAD_SLOT,
    }
}

// =============================================================================
// REPORT
// =============================================================================

/// Counters for one allocator id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocatorReport {
    /// Allocator described
    pub id: AllocatorId,
    /// Live allocations
    pub allocation_count: usize,
    /// Live bytes
    pub bytes_allocated: usize,
    /// Peak usage (scratchpad sections only)
    pub high_water: usize,
    /// Fixed capacity; zero for unbounded regions
    pub capacity: usize,
}

// =============================================================================
// MEMORY MANAGER
// =============================================================================

/// Region-based allocator
pub struct MemoryManager {
    strategies: [Strategy; SLOT_COUNT],
    current: AllocatorId,
    depth: usize,
    config: MemoryConfig,
    diag: Diagnostics,
}

impl MemoryManager {
    /// Build a manager with default settings
    pub fn new(config: MemoryConfig) -> MemoryResult<Self> {
        Self::with_settings(config, Settings::default())
    }

    /// Build a manager with explicit process toggles
    pub fn with_settings(config: MemoryConfig, settings: Settings) -> MemoryResult<Self> {
        config.validate()?;
        let poison = config.diagnostics.contains(DiagnosticFlags::POISON);
        let trace_heap = config.diagnostics.contains(DiagnosticFlags::LOG_HEAP);

        let permanent = LinearStack::new(AllocatorId::Permanent.name(), config.permanent_budget, poison)
            .ok_or(MemoryError::OutOfMemory)?;
        let resource = LinearStack::new(AllocatorId::Resource.name(), config.resource_budget, poison)
            .ok_or(MemoryError::OutOfMemory)?;
        let temporary = RewindingStack::new(
            AllocatorId::TemporaryStack.name(),
            config.temporary_stack_budget,
            poison,
        )
        .ok_or(MemoryError::OutOfMemory)?;
        let scratchpad =
            Scratchpad::new(config.scratch_page_budget, config.scratch_temp_budget, poison)
                .ok_or(MemoryError::OutOfMemory)?;

        log::info!(
            "MemoryManager: permanent {} B, resource {} B, temporary {} B, scratchpad {} B",
            config.permanent_budget,
            config.resource_budget,
            config.temporary_stack_budget,
            config.scratch_budget()
        );

        Ok(Self {
            strategies: [
                Strategy::Heap(OsHeap::new(trace_heap)),
                Strategy::Linear(permanent),
                Strategy::Linear(resource),
                Strategy::Rewinding(temporary),
                Strategy::Locked(LockedAllocator::new()),
                Strategy::Scratchpad(scratchpad),
            ],
            current: AllocatorId::Heap,
            depth: 0,
            config,
            diag: Diagnostics::new(settings),
        })
    }

    #[inline]
    fn is_disabled(&self) -> bool {
        self.diag.settings.disable_memory_manager
    }

    // =========================================================================
    // ALLOCATION
    // =========================================================================

    /// Allocate `size` bytes from the current allocator with the default
    /// alignment
    ///
    /// Never returns null: a request the current region cannot satisfy is
    /// served by the heap after a warning.
    pub fn allocate(&mut self, size: usize) -> NonNull<u8> {
        let align = self.config.default_align;
        if self.is_disabled() {
            return self.allocate_platform(size, align);
        }
        if self.current == AllocatorId::TemporaryStack {
            if let Strategy::Rewinding(temporary) = &mut self.strategies[TEMPORARY_SLOT] {
                if let Some(ptr) = temporary.bump(size.max(1), align) {
                    return ptr;
                }
            }
        }
        self.allocate_from(self.current, size, align)
    }

    /// Allocate with an explicit alignment from `id`, or from the current
    /// allocator when `id` is `None`
    pub fn allocate_extended(
        &mut self,
        size: usize,
        align: AlignMask,
        id: Option<AllocatorId>,
    ) -> NonNull<u8> {
        if self.is_disabled() {
            return self.allocate_platform(size, align);
        }
        self.allocate_from(id.unwrap_or(self.current), size, align)
    }

    /// Allocate from `id` (or the current allocator) without falling back
    /// to the heap; `None` when the region is full
    pub fn try_allocate_extended(
        &mut self,
        size: usize,
        align: AlignMask,
        id: Option<AllocatorId>,
    ) -> Option<NonNull<u8>> {
        if self.is_disabled() {
            return platform_allocate(size.max(1), align);
        }
        let id = id.unwrap_or(self.current);
        let ptr = self.strategies[slot(id)].allocate_normalized(size, align, &mut self.diag)?;
        self.check_alignment(ptr, align, id);
        Some(ptr)
    }

    fn allocate_from(&mut self, id: AllocatorId, size: usize, align: AlignMask) -> NonNull<u8> {
        let slot = slot(id);
        if let Some(ptr) = self.strategies[slot].allocate_normalized(size, align, &mut self.diag) {
            self.check_alignment(ptr, align, id);
            return ptr;
        }

        self.diag.warn(
            FaultKind::CapacityOverflow,
            format_args!("{} is overflowing to heap, size {}", id, size),
        );
        match self.strategies[HEAP_SLOT].allocate_normalized(size, align, &mut self.diag) {
            Some(ptr) => {
                self.check_alignment(ptr, align, AllocatorId::Heap);
                ptr
            }
            None => self.diag.fatal(
                FaultKind::HeapExhausted,
                format_args!("out of memory, {} bytes", size),
            ),
        }
    }

    fn allocate_platform(&self, size: usize, align: AlignMask) -> NonNull<u8> {
        match platform_allocate(size.max(1), align) {
            Some(ptr) => ptr,
            None => self.diag.fatal(
                FaultKind::HeapExhausted,
                format_args!("malloc failed, {} bytes", size),
            ),
        }
    }

    #[inline]
    fn check_alignment(&mut self, ptr: NonNull<u8>, align: AlignMask, id: AllocatorId) {
        let addr = ptr.as_ptr() as usize;
        mem_assert!(
            self.diag,
            align.is_aligned(addr),
            FaultKind::Misaligned,
            "alignment wrong {:#x}, allocator {}",
            addr,
            id
        );
    }

    /// Move `value` into memory from `id` (or the current allocator)
    pub fn allocate_value<T>(&mut self, value: T, id: Option<AllocatorId>) -> NonNull<T> {
        let ptr = self
            .allocate_extended(size_of::<T>(), AlignMask::of::<T>(), id)
            .cast::<T>();
        debug_assert!(ptr.as_ptr() as usize % align_of::<T>() == 0);
        // SAFETY: fresh, suitably sized and aligned memory.
        unsafe { ptr.as_ptr().write(value) };
        ptr
    }

    /// Drop a value placed by [`allocate_value`](Self::allocate_value) and
    /// free its memory
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate_value` on this manager and must not be
    /// used afterwards.
    pub unsafe fn free_value<T>(&mut self, ptr: NonNull<T>) {
        // SAFETY: caller guarantees a live, initialized T.
        unsafe {
            core::ptr::drop_in_place(ptr.as_ptr());
            self.free(ptr.as_ptr().cast());
        }
    }

    // =========================================================================
    // FREE
    // =========================================================================

    /// Release an allocation; null is a no-op
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this manager.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        if self.is_disabled() {
            // SAFETY: disabled-mode blocks all come from platform_allocate.
            if unsafe { platform_free(ptr) }.is_none() {
                mem_debug_assert!(self.diag, false, FaultKind::DoubleFree, "block {:p} freed twice", ptr);
            }
            return;
        }

        let addr = ptr.as_ptr() as usize;
        if let Strategy::Rewinding(temporary) = &mut self.strategies[TEMPORARY_SLOT] {
            if temporary.contains(addr) {
                temporary.release(addr, &mut self.diag);
                return;
            }
        }
        let slot = slot(self.owner_of(ptr.as_ptr()));
        // SAFETY: the owning strategy (or the heap, for foreign addresses)
        // handed this pointer out.
        unsafe { self.strategies[slot].free(ptr, &mut self.diag) };
    }

    /// Allocator whose address range contains `ptr`
    ///
    /// Ids are scanned from highest to lowest, so scratchpad memory reports
    /// [`AllocatorId::ScratchAll`]. Addresses no region owns belong to the heap.
    pub fn owner_of(&self, ptr: *const u8) -> AllocatorId {
        let addr = ptr as usize;
        AllocatorId::ALL
            .iter()
            .rev()
            .copied()
            .find(|id| self.strategies[slot(*id)].contains(addr))
            .unwrap_or(AllocatorId::Heap)
    }

    /// Whether `ptr` lies in the scratchpad
    pub fn is_in_scratchpad(&self, ptr: *const u8) -> bool {
        self.strategies[SCRATCHPAD_SLOT].contains(ptr as usize)
    }

    // =========================================================================
    // SCOPES
    // =========================================================================

    /// Make `id` current until the returned guard drops
    pub fn enter_scope(&mut self, id: AllocatorId) -> AllocatorScope<'_> {
        AllocatorScope::new(self, id)
    }

    pub(crate) fn begin_scope(&mut self, id: AllocatorId) -> ScopeFrame {
        if self.is_disabled() {
            return ScopeFrame::inert(id);
        }
        mem_debug_assert!(
            self.diag,
            self.current != AllocatorId::Locked,
            FaultKind::LockedScope,
            "scope {} opened while locked",
            id
        );

        let previous = self.current;
        self.current = id;
        self.depth += 1;

        let previous_section = match &self.strategies[SCRATCHPAD_SLOT] {
            Strategy::Scratchpad(scratchpad) => scratchpad.current_section(),
            _ => None,
        };
        let slot = slot(id);
        let mut frame = ScopeFrame {
            id,
            previous: Some(previous),
            previous_allocation_count: 0,
            previous_bytes_allocated: 0,
            previous_section,
            depth: self.depth,
        };
        self.strategies[slot].begin_scope(&frame, id, &mut self.diag);
        frame.previous_allocation_count = self.strategies[slot].allocation_count(id);
        frame.previous_bytes_allocated = self.strategies[slot].bytes_allocated(id);

        if self.config.diagnostics.contains(DiagnosticFlags::LOG_SCOPES) {
            log::debug!(
                " => {}, count {}, size {}",
                id,
                frame.previous_allocation_count,
                frame.previous_bytes_allocated
            );
        }
        frame
    }

    pub(crate) fn end_scope(&mut self, frame: &ScopeFrame) {
        let Some(previous) = frame.previous else {
            return;
        };
        mem_assert!(
            self.diag,
            frame.depth == self.depth && frame.id == self.current,
            FaultKind::ScopeOrder,
            "scope {} at depth {} closed at depth {}",
            frame.id,
            frame.depth,
            self.depth
        );

        let slot = slot(frame.id);
        if self.config.diagnostics.contains(DiagnosticFlags::LOG_SCOPES) {
            log::debug!(
                " <= {}, count {}/{}, size {}/{}",
                frame.id,
                self.strategies[slot].allocation_count(frame.id),
                frame.previous_allocation_count,
                self.strategies[slot].bytes_allocated(frame.id),
                frame.previous_bytes_allocated
            );
        }
        self.strategies[slot].end_scope(frame, previous, &mut self.diag);
        self.current = previous;
        self.depth = frame.depth.saturating_sub(1);
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Allocator used when no id is given
    #[inline]
    pub fn current_id(&self) -> AllocatorId {
        self.current
    }

    /// Number of open scopes
    #[inline]
    pub fn scope_depth(&self) -> usize {
        self.depth
    }

    /// Live allocations of `id`
    pub fn allocation_count(&self, id: AllocatorId) -> usize {
        self.strategies[slot(id)].allocation_count(id)
    }

    /// Live bytes of `id`
    pub fn bytes_allocated(&self, id: AllocatorId) -> usize {
        self.strategies[slot(id)].bytes_allocated(id)
    }

    /// Peak usage of a scratchpad section; zero for other ids
    pub fn high_water(&self, id: AllocatorId) -> usize {
        self.strategies[slot(id)].high_water(id)
    }

    /// Fixed capacity of `id`; zero for the heap and the locked allocator
    pub fn capacity(&self, id: AllocatorId) -> usize {
        self.strategies[slot(id)].capacity(id)
    }

    /// Bytes still available in `id` before it overflows to the heap
    pub fn bytes_remaining(&self, id: AllocatorId) -> usize {
        match &self.strategies[slot(id)] {
            Strategy::Scratchpad(scratchpad) => scratchpad.bytes_remaining(id),
            Strategy::Rewinding(temporary) => temporary.remaining(),
            Strategy::Linear(stack) => stack.remaining(),
            Strategy::Heap(_) | Strategy::Locked(_) => 0,
        }
    }

    /// Counters for every allocator id
    pub fn report(&self) -> [AllocatorReport; AllocatorId::COUNT] {
        AllocatorId::ALL.map(|id| AllocatorReport {
            id,
            allocation_count: self.allocation_count(id),
            bytes_allocated: self.bytes_allocated(id),
            high_water: self.high_water(id),
            capacity: self.capacity(id),
        })
    }

    /// Log the counters of every allocator id
    pub fn log_allocations(&self) {
        if self.is_disabled() {
            return;
        }
        log::info!("MemoryManager listing:");
        for entry in self.report() {
            log::info!(
                " == {}, count {}, size {}, high water {}",
                entry.id,
                entry.allocation_count,
                entry.bytes_allocated,
                entry.high_water
            );
        }
    }

    /// Construction parameters
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Fault counters and history
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    /// Process toggles
    pub fn settings(&self) -> &Settings {
        &self.diag.settings
    }

    /// Mutable process toggles
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.diag.settings
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    /// Tear down, checking the bounded regions were emptied
    ///
    /// Heap blocks still outstanding stay valid; pointers into any region
    /// dangle once this returns.
    pub fn shutdown(mut self) {
        if self.is_disabled() {
            return;
        }
        self.diag.settings.shutting_down = true;
        for id in [AllocatorId::Permanent, AllocatorId::Resource, AllocatorId::TemporaryStack] {
            let count = self.allocation_count(id);
            mem_debug_assert!(
                self.diag,
                count == 0,
                FaultKind::ShutdownLeak,
                "{} still holds {} allocations at shutdown",
                id,
                count
            );
        }
        log::info!("MemoryManager: shut down");
    }
}

impl core::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("current", &self.current)
            .field("depth", &self.depth)
            .field("config", &self.config)
            .field("diag", &self.diag)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
