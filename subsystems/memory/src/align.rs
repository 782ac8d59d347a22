//! Alignment masks.
//!
//! Alignments travel through the allocator as masks (`align - 1`), the form
//! the bump strategies use directly: `(addr + mask) & !mask`.

use crate::{MemoryError, MemoryResult};

/// A validated alignment mask (`align - 1`, `align` a power of two)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct AlignMask(usize);

impl AlignMask {
    /// Byte alignment, no constraint
    pub const BYTE: AlignMask = AlignMask(0);

    /// Machine word alignment
    pub const WORD: AlignMask = AlignMask(core::mem::align_of::<usize>() - 1);

    /// 16-byte alignment, enough for any SIMD lane on the target
    pub const VECTOR: AlignMask = AlignMask(0xF);

    /// Validate a raw mask
    pub const fn new(mask: usize) -> MemoryResult<Self> {
        if mask.wrapping_add(1) & mask != 0 {
            return Err(MemoryError::InvalidAlignment(mask));
        }
        Ok(Self(mask))
    }

    /// Mask for a power-of-two alignment
    pub const fn from_align(align: usize) -> MemoryResult<Self> {
        if !align.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(align));
        }
        Ok(Self(align - 1))
    }

    /// Natural alignment of `T`
    #[inline]
    pub const fn of<T>() -> Self {
        Self(core::mem::align_of::<T>() - 1)
    }

    /// Raw mask value
    #[inline]
    pub const fn mask(self) -> usize {
        self.0
    }

    /// Alignment in bytes (zero for the all-ones mask)
    #[inline]
    pub const fn align(self) -> usize {
        self.0.wrapping_add(1)
    }

    /// Round `addr` up; `None` on address space overflow
    #[inline]
    pub const fn align_up(self, addr: usize) -> Option<usize> {
        match addr.checked_add(self.0) {
            Some(bumped) => Some(bumped & !self.0),
            None => None,
        }
    }

    /// Whether `addr` satisfies this mask
    #[inline]
    pub const fn is_aligned(self, addr: usize) -> bool {
        addr & self.0 == 0
    }

    /// The stricter of two masks
    #[inline]
    pub const fn max(self, other: AlignMask) -> AlignMask {
        if self.0 >= other.0 { self } else { other }
    }
}

impl Default for AlignMask {
    fn default() -> Self {
        Self::WORD
    }
}

impl TryFrom<usize> for AlignMask {
    type Error = MemoryError;

    fn try_from(mask: usize) -> MemoryResult<Self> {
        Self::new(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_validation() {
        assert!(AlignMask::new(0).is_ok());
        assert!(AlignMask::new(0xF).is_ok());
        assert!(AlignMask::new(usize::MAX).is_ok());
        assert_eq!(AlignMask::new(0x5), Err(MemoryError::InvalidAlignment(0x5)));
        assert_eq!(AlignMask::from_align(8).map(AlignMask::mask), Ok(7));
        assert!(AlignMask::from_align(12).is_err());
    }

    #[test]
    fn test_align_up() {
        let mask = AlignMask::VECTOR;
        assert_eq!(mask.align_up(0), Some(0));
        assert_eq!(mask.align_up(1), Some(16));
        assert_eq!(mask.align_up(16), Some(16));
        assert_eq!(mask.align_up(usize::MAX), None);
        assert!(mask.is_aligned(32));
        assert!(!mask.is_aligned(33));
    }

    #[test]
    fn test_natural_alignment() {
        assert_eq!(AlignMask::of::<u8>(), AlignMask::BYTE);
        assert_eq!(AlignMask::of::<usize>(), AlignMask::WORD);
        assert_eq!(AlignMask::of::<u128>().align(), core::mem::align_of::<u128>());
    }
}
