//! # Allocator Identifiers
//!
//! Every memory region is named by an [`AllocatorId`]. The discriminants are
//! part of the external ABI: tooling and record layouts shared with other
//! execution contexts are compiled against the same numbering, so values
//! must never be reordered.
//!
//! ```text
//!   0 Heap            ─┐
//!   1 Permanent        │ one strategy each
//!   2 Resource         │
//!   3 TemporaryStack   │
//!   4 Locked          ─┘
//!   5 ScratchPage0    ─┐
//!   6 ScratchPage1     │ all alias the single
//!   7 ScratchPage2     │ sectioned scratchpad
//!   8 ScratchTemp      │
//!   9 ScratchAll      ─┘
//!  -1 (unspecified)   → "use the current allocator"
//! ```

use core::fmt;

use crate::{MemoryError, MemoryResult};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Raw ABI value meaning "use the current allocator"
pub const UNSPECIFIED_RAW: i32 = -1;

/// Number of scratchpad sections (three pages, temp, and the virtual "all")
pub const SCRATCH_SECTION_COUNT: usize = 5;

/// Index of the virtual section spanning the whole scratchpad
pub const SCRATCH_ALL_SECTION: usize = SCRATCH_SECTION_COUNT - 1;

// =============================================================================
// ALLOCATOR ID
// =============================================================================

/// Name of a memory region
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum AllocatorId {
    /// General purpose platform heap; the fallback for every other region
    #[default]
    Heap = 0,
    /// Never freed; lives for the rest of the process
    Permanent = 1,
    /// Never freed; loaded assets and tables
    Resource = 2,
    /// Rewinds to its previous depth when a scope closes
    TemporaryStack = 3,
    /// Rejects every allocation
    Locked = 4,
    /// Scratchpad page 0
    ScratchPage0 = 5,
    /// Scratchpad page 1
    ScratchPage1 = 6,
    /// Scratchpad page 2
    ScratchPage2 = 7,
    /// Scratchpad temp section
    ScratchTemp = 8,
    /// The whole scratchpad, exclusive with every other section
    ScratchAll = 9,
}

static_assertions::const_assert_eq!(AllocatorId::Heap as u8, 0);
static_assertions::const_assert_eq!(AllocatorId::ScratchAll as usize + 1, AllocatorId::COUNT);
static_assertions::const_assert_eq!(
    AllocatorId::COUNT - AllocatorId::ScratchPage0 as usize,
    SCRATCH_SECTION_COUNT
);

impl AllocatorId {
    /// Number of allocator ids
    pub const COUNT: usize = 10;

    /// All ids in ABI order
    pub const ALL: [AllocatorId; Self::COUNT] = [
        AllocatorId::Heap,
        AllocatorId::Permanent,
        AllocatorId::Resource,
        AllocatorId::TemporaryStack,
        AllocatorId::Locked,
        AllocatorId::ScratchPage0,
        AllocatorId::ScratchPage1,
        AllocatorId::ScratchPage2,
        AllocatorId::ScratchTemp,
        AllocatorId::ScratchAll,
    ];

    /// Table index of this id
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Raw ABI value
    #[inline]
    pub const fn raw(self) -> i32 {
        self as i32
    }

    /// Decode a raw ABI value; `-1` decodes to `None` (unspecified)
    pub fn from_raw(raw: i32) -> MemoryResult<Option<AllocatorId>> {
        if raw == UNSPECIFIED_RAW {
            return Ok(None);
        }
        usize::try_from(raw)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .map(Some)
            .ok_or(MemoryError::InvalidAllocatorId(raw))
    }

    /// Whether this id is one of the scratchpad sections
    #[inline]
    pub const fn is_scratch(self) -> bool {
        self as u8 >= AllocatorId::ScratchPage0 as u8
    }

    /// Scratchpad section index, if this is a scratchpad id
    #[inline]
    pub const fn scratch_section(self) -> Option<usize> {
        if self.is_scratch() {
            Some(self as usize - AllocatorId::ScratchPage0 as usize)
        } else {
            None
        }
    }

    /// Short human readable name
    pub const fn name(self) -> &'static str {
        match self {
            AllocatorId::Heap => "Heap",
            AllocatorId::Permanent => "Permanent",
            AllocatorId::Resource => "Resource",
            AllocatorId::TemporaryStack => "TemporaryStack",
            AllocatorId::Locked => "Locked",
            AllocatorId::ScratchPage0 => "ScratchPage0",
            AllocatorId::ScratchPage1 => "ScratchPage1",
            AllocatorId::ScratchPage2 => "ScratchPage2",
            AllocatorId::ScratchTemp => "ScratchTemp",
            AllocatorId::ScratchAll => "ScratchAll",
        }
    }
}

impl fmt::Display for AllocatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for AllocatorId {
    type Error = MemoryError;

    fn try_from(value: u8) -> MemoryResult<Self> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(MemoryError::InvalidAllocatorId(value as i32))
    }
}

impl From<AllocatorId> for u8 {
    fn from(id: AllocatorId) -> u8 {
        id as u8
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abi_values_are_stable() {
        let raw: [i32; AllocatorId::COUNT] = AllocatorId::ALL.map(AllocatorId::raw);
        assert_eq!(raw, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(AllocatorId::default(), AllocatorId::Heap);
    }

    #[test]
    fn test_from_raw() {
        assert_eq!(AllocatorId::from_raw(-1), Ok(None));
        assert_eq!(AllocatorId::from_raw(3), Ok(Some(AllocatorId::TemporaryStack)));
        assert_eq!(AllocatorId::from_raw(10), Err(MemoryError::InvalidAllocatorId(10)));
        assert_eq!(AllocatorId::from_raw(-2), Err(MemoryError::InvalidAllocatorId(-2)));
        assert!(AllocatorId::try_from(42u8).is_err());
    }

    #[test]
    fn test_scratch_sections() {
        assert_eq!(AllocatorId::Locked.scratch_section(), None);
        assert_eq!(AllocatorId::ScratchPage0.scratch_section(), Some(0));
        assert_eq!(AllocatorId::ScratchTemp.scratch_section(), Some(3));
        assert_eq!(AllocatorId::ScratchAll.scratch_section(), Some(SCRATCH_ALL_SECTION));
    }
}
