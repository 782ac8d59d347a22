//! # Memory Configuration
//!
//! Region budgets, diagnostic switches and the process toggles read by the
//! memory manager.
//!
//! | Region          | Default budget | Reclaimed                |
//! |-----------------|----------------|--------------------------|
//! | Permanent       | 5 KiB          | never                    |
//! | Resource        | 5 KiB          | never                    |
//! | TemporaryStack  | 60 KiB         | on scope exit            |
//! | Scratch page ×3 | 10 KiB each    | on section close         |
//! | Scratch temp    | 60 KiB         | on section close         |

use bitflags::bitflags;

use crate::align::AlignMask;
use crate::{MemoryError, MemoryResult};

// =============================================================================
// BUDGETS
// =============================================================================

/// One kibibyte
pub const KIB: usize = 1024;

/// Default Permanent budget
pub const DEFAULT_PERMANENT_BUDGET: usize = 5 * KIB;

/// Default Resource budget
pub const DEFAULT_RESOURCE_BUDGET: usize = 5 * KIB;

/// Default TemporaryStack budget
pub const DEFAULT_TEMPORARY_STACK_BUDGET: usize = 60 * KIB;

/// Default size of each scratchpad page
pub const DEFAULT_SCRATCH_PAGE_BUDGET: usize = 10 * KIB;

/// Default size of the scratchpad temp section
pub const DEFAULT_SCRATCH_TEMP_BUDGET: usize = 60 * KIB;

/// Default total scratchpad size
pub const DEFAULT_SCRATCH_BUDGET: usize =
    DEFAULT_SCRATCH_PAGE_BUDGET * SCRATCH_PAGE_COUNT + DEFAULT_SCRATCH_TEMP_BUDGET;

/// Number of fixed-size scratchpad pages
pub const SCRATCH_PAGE_COUNT: usize = 3;

/// Byte pattern written over released or freshly opened memory
pub const POISON_BYTE: u8 = 0xFE;

static_assertions::const_assert_eq!(DEFAULT_SCRATCH_BUDGET, 90 * KIB);
static_assertions::const_assert!(DEFAULT_SCRATCH_PAGE_BUDGET % core::mem::size_of::<usize>() == 0);
static_assertions::const_assert!(DEFAULT_SCRATCH_TEMP_BUDGET % core::mem::size_of::<usize>() == 0);

// =============================================================================
// DIAGNOSTIC FLAGS
// =============================================================================

bitflags! {
    /// Optional diagnostics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DiagnosticFlags: u32 {
        /// Fill opened/rewound memory with [`POISON_BYTE`]
        const POISON     = 1 << 0;
        /// Log every scope entry and exit
        const LOG_SCOPES = 1 << 1;
        /// Log every heap allocation and free
        const LOG_HEAP   = 1 << 2;
    }
}

impl Default for DiagnosticFlags {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            DiagnosticFlags::POISON
        } else {
            DiagnosticFlags::empty()
        }
    }
}

// =============================================================================
// MEMORY CONFIG
// =============================================================================

/// Construction parameters for a [`MemoryManager`](crate::MemoryManager)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Permanent region size in bytes
    pub permanent_budget: usize,
    /// Resource region size in bytes
    pub resource_budget: usize,
    /// TemporaryStack region size in bytes
    pub temporary_stack_budget: usize,
    /// Size of each of the three scratchpad pages
    pub scratch_page_budget: usize,
    /// Size of the scratchpad temp section
    pub scratch_temp_budget: usize,
    /// Alignment used by `allocate`
    pub default_align: AlignMask,
    /// Diagnostic switches
    pub diagnostics: DiagnosticFlags,
}

impl MemoryConfig {
    /// Total scratchpad size; the "all" section spans exactly this
    pub const fn scratch_budget(&self) -> usize {
        self.scratch_page_budget * SCRATCH_PAGE_COUNT + self.scratch_temp_budget
    }

    /// Set all three bounded stack budgets
    pub fn with_stacks(mut self, permanent: usize, resource: usize, temporary: usize) -> Self {
        self.permanent_budget = permanent;
        self.resource_budget = resource;
        self.temporary_stack_budget = temporary;
        self
    }

    /// Set the scratchpad layout
    pub fn with_scratchpad(mut self, page: usize, temp: usize) -> Self {
        self.scratch_page_budget = page;
        self.scratch_temp_budget = temp;
        self
    }

    /// Set the default alignment
    pub fn with_default_align(mut self, align: AlignMask) -> Self {
        self.default_align = align;
        self
    }

    /// Set the diagnostic switches
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticFlags) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Check the budgets describe a usable layout
    pub fn validate(&self) -> MemoryResult<()> {
        let budgets = [
            ("permanent", self.permanent_budget),
            ("resource", self.resource_budget),
            ("temporary stack", self.temporary_stack_budget),
            ("scratch page", self.scratch_page_budget),
            ("scratch temp", self.scratch_temp_budget),
        ];
        for (name, budget) in budgets {
            if budget == 0 {
                return Err(MemoryError::InvalidBudget(name));
            }
        }
        self.scratch_page_budget
            .checked_mul(SCRATCH_PAGE_COUNT)
            .and_then(|pages| pages.checked_add(self.scratch_temp_budget))
            .ok_or(MemoryError::InvalidBudget("scratchpad"))?;
        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            permanent_budget: DEFAULT_PERMANENT_BUDGET,
            resource_budget: DEFAULT_RESOURCE_BUDGET,
            temporary_stack_budget: DEFAULT_TEMPORARY_STACK_BUDGET,
            scratch_page_budget: DEFAULT_SCRATCH_PAGE_BUDGET,
            scratch_temp_budget: DEFAULT_SCRATCH_TEMP_BUDGET,
            default_align: AlignMask::default(),
            diagnostics: DiagnosticFlags::default(),
        }
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Process toggles consulted by the manager at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Route everything straight to the platform allocator (host test runs)
    pub disable_memory_manager: bool,
    /// Teardown in progress; frees into never-freed regions stay quiet
    pub shutting_down: bool,
    /// Emit fault log lines
    pub logging: bool,
    /// Expected assertion failures still to be swallowed
    pub asserts_allowed: i32,
}

impl Settings {
    /// Normal operation
    pub const fn new() -> Self {
        Self {
            disable_memory_manager: false,
            shutting_down: false,
            logging: true,
            asserts_allowed: 0,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MemoryConfig::default();
        assert_eq!(config.scratch_budget(), DEFAULT_SCRATCH_BUDGET);
        assert!(config.validate().is_ok());
        assert_eq!(config.diagnostics.contains(DiagnosticFlags::POISON), cfg!(debug_assertions));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = MemoryConfig::default().with_stacks(0, 16, 16);
        assert_eq!(config.validate(), Err(MemoryError::InvalidBudget("permanent")));

        let config = MemoryConfig::default().with_scratchpad(usize::MAX, 1);
        assert_eq!(config.validate(), Err(MemoryError::InvalidBudget("scratchpad")));
    }

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert!(!settings.disable_memory_manager);
        assert!(!settings.shutting_down);
        assert!(settings.logging);
        assert_eq!(settings.asserts_allowed, 0);
    }
}
