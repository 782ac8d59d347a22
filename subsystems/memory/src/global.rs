//! # Process-wide Manager
//!
//! One [`MemoryManager`] behind a spinlock, for code that cannot thread a
//! manager reference through. The lock is held for the duration of each
//! call; closures passed to [`with`] must not call back into this module.

use core::marker::PhantomData;
use core::ptr::NonNull;

use spin::Mutex;

use crate::align::AlignMask;
use crate::config::{MemoryConfig, Settings};
use crate::diag::{Diagnostics, FaultKind};
use crate::id::AllocatorId;
use crate::manager::MemoryManager;
use crate::scope::ScopeFrame;
use crate::{MemoryError, MemoryResult};

// =============================================================================
// GLOBAL STATE
// =============================================================================

/// The process-wide manager
static MANAGER: Mutex<Option<MemoryManager>> = Mutex::new(None);

/// Build and install the process-wide manager
pub fn init(config: MemoryConfig) -> MemoryResult<()> {
    init_with_settings(config, Settings::default())
}

/// Build and install the process-wide manager with explicit toggles
pub fn init_with_settings(config: MemoryConfig, settings: Settings) -> MemoryResult<()> {
    let mut slot = MANAGER.lock();
    if slot.is_some() {
        return Err(MemoryError::AlreadyInitialized);
    }
    *slot = Some(MemoryManager::with_settings(config, settings)?);
    Ok(())
}

/// Whether [`init`] has run
pub fn is_initialized() -> bool {
    MANAGER.lock().is_some()
}

/// Tear down the process-wide manager
pub fn shutdown() -> MemoryResult<()> {
    let manager = MANAGER.lock().take().ok_or(MemoryError::NotInitialized)?;
    manager.shutdown();
    Ok(())
}

/// Run `f` against the process-wide manager
///
/// Using the manager before [`init`] is fatal.
pub fn with<R>(f: impl FnOnce(&mut MemoryManager) -> R) -> R {
    let mut slot = MANAGER.lock();
    match slot.as_mut() {
        Some(manager) => f(manager),
        None => Diagnostics::new(Settings::new()).fatal(
            FaultKind::UseBeforeInit,
            format_args!("memory manager used before init"),
        ),
    }
}

// =============================================================================
// FORWARDERS
// =============================================================================

/// See [`MemoryManager::allocate`]
pub fn allocate(size: usize) -> NonNull<u8> {
    with(|manager| manager.allocate(size))
}

/// See [`MemoryManager::allocate_extended`]
pub fn allocate_extended(size: usize, align: AlignMask, id: Option<AllocatorId>) -> NonNull<u8> {
    with(|manager| manager.allocate_extended(size, align, id))
}

/// See [`MemoryManager::free`]
///
/// # Safety
///
/// `ptr` must be null or a live pointer returned by the process-wide manager.
pub unsafe fn free(ptr: *mut u8) {
    // SAFETY: forwarded contract.
    with(|manager| unsafe { manager.free(ptr) })
}

/// See [`MemoryManager::is_in_scratchpad`]
pub fn is_in_scratchpad(ptr: *const u8) -> bool {
    with(|manager| manager.is_in_scratchpad(ptr))
}

/// See [`MemoryManager::log_allocations`]
pub fn log_allocations() {
    with(|manager| manager.log_allocations());
}

/// Make `id` current on the process-wide manager until the guard drops
pub fn enter_scope(id: AllocatorId) -> GlobalScope {
    GlobalScope {
        frame: with(|manager| manager.begin_scope(id)),
        _not_send: PhantomData,
    }
}

// =============================================================================
// GLOBAL SCOPE
// =============================================================================

/// RAII guard for a scope on the process-wide manager
///
/// Scopes belong to the thread that opened them.
#[derive(Debug)]
pub struct GlobalScope {
    frame: ScopeFrame,
    _not_send: PhantomData<*mut ()>,
}

impl GlobalScope {
    /// Allocator this scope made current
    pub fn id(&self) -> AllocatorId {
        self.frame.id()
    }

    /// Entry snapshot
    pub fn frame(&self) -> &ScopeFrame {
        &self.frame
    }

    /// Allocations made since the scope opened
    pub fn scope_allocation_count(&self) -> usize {
        let id = self.frame.id();
        with(|manager| manager.allocation_count(id))
            .saturating_sub(self.frame.previous_allocation_count())
    }

    /// Bytes allocated since the scope opened
    pub fn scope_bytes_allocated(&self) -> usize {
        let id = self.frame.id();
        with(|manager| manager.bytes_allocated(id))
            .saturating_sub(self.frame.previous_bytes_allocated())
    }
}

impl Drop for GlobalScope {
    fn drop(&mut self) {
        if let Some(manager) = MANAGER.lock().as_mut() {
            manager.end_scope(&self.frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The only test touching the process-wide manager.
    #[test]
    fn test_global_lifecycle() {
        assert_eq!(shutdown(), Err(MemoryError::NotInitialized));
        init(MemoryConfig::default()).unwrap();
        assert!(is_initialized());
        assert_eq!(init(MemoryConfig::default()), Err(MemoryError::AlreadyInitialized));

        {
            let scope = enter_scope(AllocatorId::ScratchPage0);
            let ptr = allocate(48);
            assert!(is_in_scratchpad(ptr.as_ptr()));
            assert_eq!(scope.scope_allocation_count(), 1);
            assert_eq!(scope.scope_bytes_allocated(), 48);
        }
        assert_eq!(with(|manager| manager.current_id()), AllocatorId::Heap);

        let heap = allocate_extended(16, AlignMask::VECTOR, None);
        assert!(!is_in_scratchpad(heap.as_ptr()));
        unsafe { free(heap.as_ptr()) };
        log_allocations();

        shutdown().unwrap();
        assert!(!is_initialized());
    }
}
