//! # Region Memory Manager
//!
//! A region-based allocator for a single execution context. Every request is
//! routed to the *current* allocator, selected by nesting scopes; each
//! region has its own lifetime discipline and diagnostics.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                          MEMORY MANAGER                               │
//! │                                                                       │
//! │   enter_scope(id) ──▶ current allocator ──▶ allocate / free           │
//! │                                                                       │
//! │  ┌────────┐ ┌───────────┐ ┌──────────┐ ┌──────────────┐ ┌──────────┐  │
//! │  │  Heap  │ │ Permanent │ │ Resource │ │TemporaryStack│ │  Locked  │  │
//! │  │ OsHeap │ │  Linear   │ │  Linear  │ │  Rewinding   │ │ refuses  │  │
//! │  └───▲────┘ └───────────┘ └──────────┘ └──────────────┘ └──────────┘  │
//! │      │                                                                │
//! │      │ overflow  ┌──────────────────────────────────────────────────┐   │
//! │      └───────────│ Scratchpad: page0 │ page1 │ page2 │ temp │ all   │   │
//! │                  └──────────────────────────────────────────────────┘   │
//! │                                                                       │
//! │   faults ──▶ Diagnostics ──▶ warn / tolerated assert / fatal          │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Regions
//!
//! | Id             | Lifetime                        | Free                 |
//! |----------------|---------------------------------|----------------------|
//! | Heap           | until freed                     | reclaims             |
//! | Permanent      | process                         | illegal, warned      |
//! | Resource       | process                         | illegal, warned      |
//! | TemporaryStack | enclosing scope                 | required before exit |
//! | Locked         | never allocates                 | no-op                |
//! | Scratch*       | enclosing scope of that section | no-op                |
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use region_memory::{AllocatorId, MemoryConfig, MemoryManager};
//!
//! let mut manager = MemoryManager::new(MemoryConfig::default())?;
//! let mut temp = manager.enter_scope(AllocatorId::TemporaryStack);
//! let buffer = temp.allocate(256);
//! unsafe { temp.free(buffer.as_ptr()) };
//! ```

#![cfg_attr(not(test), no_std)]

// =============================================================================
// EXTERNAL DEPENDENCIES
// =============================================================================

extern crate alloc;

use core::fmt;

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Fault reporting and assertion macros
pub mod diag;

/// Alignment masks
pub mod align;

/// Budgets, diagnostic flags and process toggles
pub mod config;

/// Allocator identifiers
pub mod id;

/// Region backing storage
pub mod region;

/// Allocator strategies
pub mod strategy;

/// Scope frames and guards
pub mod scope;

/// The memory manager
pub mod manager;

/// Process-wide manager
pub mod global;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use align::AlignMask;
pub use config::{DiagnosticFlags, MemoryConfig, Settings};
pub use diag::{Diagnostics, FaultKind, FaultRecord, Severity};
pub use id::AllocatorId;
pub use manager::{AllocatorReport, MemoryManager};
pub use scope::{AllocatorScope, ScopeFrame};
pub use strategy::{AllocatorStrategy, Strategy};

// =============================================================================
// ERRORS
// =============================================================================

/// Errors surfaced at the API boundary
///
/// Faults during normal operation go through [`Diagnostics`]; only
/// construction and decoding report errors by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// Raw allocator id outside the ABI range
    InvalidAllocatorId(i32),
    /// Alignment mask or alignment not a power of two
    InvalidAlignment(usize),
    /// Named budget is zero or overflows
    InvalidBudget(&'static str),
    /// A region buffer could not be allocated
    OutOfMemory,
    /// The process-wide manager already exists
    AlreadyInitialized,
    /// The process-wide manager does not exist
    NotInitialized,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAllocatorId(raw) => write!(f, "invalid allocator id {}", raw),
            Self::InvalidAlignment(value) => write!(f, "invalid alignment {:#x}", value),
            Self::InvalidBudget(name) => write!(f, "invalid {} budget", name),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::AlreadyInitialized => write!(f, "memory manager already initialized"),
            Self::NotInitialized => write!(f, "memory manager not initialized"),
        }
    }
}

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
