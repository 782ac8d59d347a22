//! # Fault Reporting
//!
//! All error signalling inside the allocator is local: a strategy either
//! returns `None`, or reports a fault through [`Diagnostics`], which logs it,
//! counts it, and decides whether the process survives.
//!
//! ```text
//!   Warning    ──▶ log::warn!  ──▶ continue
//!   Assertion  ──▶ log::error! ──▶ asserts_allowed > 0 ? swallow : panic
//!   Fatal      ──▶ log::error! ──▶ panic (abort on target)
//! ```
//!
//! The `asserts_allowed` countdown lets a test pre-arm exactly N expected
//! assertion failures.

use core::fmt;

use heapless::HistoryBuffer;

use crate::config::Settings;

/// Number of faults kept in the history
pub const FAULT_HISTORY: usize = 16;

// =============================================================================
// FAULT KIND
// =============================================================================

/// Classification of allocator faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// A bounded region could not satisfy a request; served from the heap
    CapacityOverflow,
    /// The platform allocator returned null
    HeapExhausted,
    /// A rewinding scope closed with live allocations
    Leak,
    /// A scratchpad section was opened while already open
    IllegalReopen,
    /// "all" and a real scratchpad section were open at the same time
    ExclusiveScratchpad,
    /// Free of a pointer at or above a stack's reset cursor
    StrayFree,
    /// Free into a region that never reclaims
    IllegalFree,
    /// Allocation attempted while the locked allocator was current
    LockedAllocation,
    /// Scope opened while the locked allocator was current
    LockedScope,
    /// Scratchpad allocation without an open section
    NoOpenSection,
    /// A returned address violated the requested alignment
    Misaligned,
    /// Scopes closed out of LIFO order
    ScopeOrder,
    /// A stack cursor ended up outside its region
    Corruption,
    /// Heap header already cleared
    DoubleFree,
    /// Never-freed region still holding allocations at shutdown
    ShutdownLeak,
    /// Manager used before `init`
    UseBeforeInit,
}

impl FaultKind {
    /// Short description
    pub const fn as_str(self) -> &'static str {
        match self {
            FaultKind::CapacityOverflow => "capacity overflow",
            FaultKind::HeapExhausted => "heap exhausted",
            FaultKind::Leak => "leak",
            FaultKind::IllegalReopen => "illegal reopen",
            FaultKind::ExclusiveScratchpad => "scratchpad exclusivity",
            FaultKind::StrayFree => "stray free",
            FaultKind::IllegalFree => "illegal free",
            FaultKind::LockedAllocation => "allocation while locked",
            FaultKind::LockedScope => "scope while locked",
            FaultKind::NoOpenSection => "no open section",
            FaultKind::Misaligned => "misaligned",
            FaultKind::ScopeOrder => "scope order",
            FaultKind::Corruption => "corruption",
            FaultKind::DoubleFree => "double free",
            FaultKind::ShutdownLeak => "shutdown leak",
            FaultKind::UseBeforeInit => "use before init",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a fault was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged, execution continued
    Warning,
    /// Assertion swallowed by the tolerance countdown
    Tolerated,
}

/// One entry of the fault history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultRecord {
    /// What went wrong
    pub kind: FaultKind,
    /// How it was handled
    pub severity: Severity,
}

// =============================================================================
// DIAGNOSTICS
// =============================================================================

/// Fault sink shared by every strategy of one manager
pub struct Diagnostics {
    /// Process toggles
    pub settings: Settings,
    warnings: u32,
    assertions: u32,
    history: HistoryBuffer<FaultRecord, FAULT_HISTORY>,
}

impl Diagnostics {
    /// Create a sink with the given toggles
    pub const fn new(settings: Settings) -> Self {
        Self {
            settings,
            warnings: 0,
            assertions: 0,
            history: HistoryBuffer::new(),
        }
    }

    /// Report a recoverable fault
    pub fn warn(&mut self, kind: FaultKind, args: fmt::Arguments<'_>) {
        self.warnings += 1;
        self.history.write(FaultRecord { kind, severity: Severity::Warning });
        if self.settings.logging {
            log::warn!("WARNING: {}: {}", kind, args);
        }
    }

    /// Report a failed assertion
    ///
    /// Returns normally only if a tolerance credit was available.
    pub fn assertion_failed(&mut self, kind: FaultKind, args: fmt::Arguments<'_>) {
        self.assertions += 1;
        if self.settings.logging {
            log::error!("ASSERT_FAIL: {}: {}", kind, args);
        }
        if self.settings.asserts_allowed > 0 {
            self.settings.asserts_allowed -= 1;
            self.history.write(FaultRecord { kind, severity: Severity::Tolerated });
            return;
        }
        panic!("memory assertion failed ({}): {}", kind, args);
    }

    /// Report an unrecoverable fault
    pub fn fatal(&self, kind: FaultKind, args: fmt::Arguments<'_>) -> ! {
        log::error!("STOPPING: {}: {}", kind, args);
        panic!("memory fault ({}): {}", kind, args);
    }

    /// Warnings reported so far
    pub fn warning_count(&self) -> u32 {
        self.warnings
    }

    /// Assertion failures reported so far, tolerated or not
    pub fn assertion_count(&self) -> u32 {
        self.assertions
    }

    /// Most recent fault
    pub fn last_fault(&self) -> Option<FaultRecord> {
        self.history.recent().copied()
    }

    /// Recent faults, oldest first
    pub fn faults(&self) -> impl Iterator<Item = &FaultRecord> + '_ {
        self.history.oldest_ordered()
    }

    /// Count recent faults of one kind
    pub fn count_of(&self, kind: FaultKind) -> usize {
        self.faults().filter(|record| record.kind == kind).count()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("settings", &self.settings)
            .field("warnings", &self.warnings)
            .field("assertions", &self.assertions)
            .field("last_fault", &self.last_fault())
            .finish()
    }
}

// =============================================================================
// MACROS
// =============================================================================

/// Release assertion: checked in every build
macro_rules! mem_assert {
    ($diag:expr, $cond:expr, $kind:expr, $($arg:tt)+) => {
        if !$cond {
            $diag.assertion_failed($kind, format_args!($($arg)+));
        }
    };
}

/// Debug assertion: compiled out of release builds
macro_rules! mem_debug_assert {
    ($diag:expr, $cond:expr, $kind:expr, $($arg:tt)+) => {
        if cfg!(debug_assertions) && !$cond {
            $diag.assertion_failed($kind, format_args!($($arg)+));
        }
    };
}

/// Recoverable fault
macro_rules! mem_warn {
    ($diag:expr, $kind:expr, $($arg:tt)+) => {
        $diag.warn($kind, format_args!($($arg)+))
    };
}

pub(crate) use mem_assert;
pub(crate) use mem_debug_assert;
pub(crate) use mem_warn;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_is_counted() {
        let mut diag = Diagnostics::new(Settings::default());
        mem_warn!(diag, FaultKind::CapacityOverflow, "perm overflowing to heap, size {}", 12);
        assert_eq!(diag.warning_count(), 1);
        assert_eq!(diag.assertion_count(), 0);
        assert_eq!(
            diag.last_fault(),
            Some(FaultRecord { kind: FaultKind::CapacityOverflow, severity: Severity::Warning })
        );
    }

    #[test]
    fn test_tolerated_assertion_consumes_credit() {
        let mut diag = Diagnostics::new(Settings { asserts_allowed: 2, ..Settings::default() });
        let live = 1;
        mem_assert!(diag, live == 0, FaultKind::Leak, "temp leaked {} allocations", 1);
        assert_eq!(diag.settings.asserts_allowed, 1);
        assert_eq!(diag.assertion_count(), 1);
        assert_eq!(diag.count_of(FaultKind::Leak), 1);
    }

    #[test]
    fn test_passing_assertion_is_silent() {
        let mut diag = Diagnostics::new(Settings::default());
        mem_assert!(diag, true, FaultKind::Leak, "never formatted");
        mem_debug_assert!(diag, true, FaultKind::IllegalReopen, "never formatted");
        assert_eq!(diag.assertion_count(), 0);
        assert!(diag.last_fault().is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut diag = Diagnostics::new(Settings { logging: false, ..Settings::default() });
        for _ in 0..(FAULT_HISTORY + 4) {
            mem_warn!(diag, FaultKind::IllegalFree, "perm: illegal free()");
        }
        assert_eq!(diag.warning_count() as usize, FAULT_HISTORY + 4);
        assert_eq!(diag.faults().count(), FAULT_HISTORY);
    }
}
