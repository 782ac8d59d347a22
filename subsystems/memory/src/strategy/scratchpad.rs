//! # Scratchpad
//!
//! One contiguous buffer carved into sections that open and close with
//! scopes:
//!
//! ```text
//!   ┌──────────┬──────────┬──────────┬──────────────────────────┐
//!   │  page 0  │  page 1  │  page 2  │           temp           │
//!   └──────────┴──────────┴──────────┴──────────────────────────┘
//!   └──────────────────────────── all ───────────────────────────┘
//! ```
//!
//! The real sections may be open at the same time. "all" overlaps every one
//! of them, so it is exclusive with all of them. Opening a section poisons
//! it and resets its cursor; closing records the high water mark. Individual
//! frees reclaim nothing.

use core::ptr::NonNull;

use super::AllocatorStrategy;
use crate::align::AlignMask;
use crate::config::SCRATCH_PAGE_COUNT;
use crate::diag::{mem_assert, mem_debug_assert, Diagnostics, FaultKind};
use crate::id::{AllocatorId, SCRATCH_ALL_SECTION, SCRATCH_SECTION_COUNT};
use crate::region::RegionBuffer;
use crate::scope::ScopeFrame;

/// One sub-range of the scratchpad, as offsets into the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Section {
    begin: usize,
    end: usize,
    /// `Some` while open
    cursor: Option<usize>,
    allocation_count: usize,
    /// Most bytes ever in use, updated on close
    high_water: usize,
}

impl Section {
    const fn new(begin: usize, end: usize) -> Self {
        Self {
            begin,
            end,
            cursor: None,
            allocation_count: 0,
            high_water: 0,
        }
    }

    #[inline]
    fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    #[inline]
    fn used(&self) -> usize {
        self.cursor.map_or(0, |cursor| cursor - self.begin)
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.end - self.begin
    }
}

/// Sectioned scratch memory
#[derive(Debug)]
pub struct Scratchpad {
    buffer: RegionBuffer,
    sections: [Section; SCRATCH_SECTION_COUNT],
    current_section: Option<usize>,
    poison: bool,
}

impl Scratchpad {
    /// Lay out three `page` sized pages followed by a `temp` sized section
    pub fn new(page: usize, temp: usize, poison: bool) -> Option<Self> {
        let total = page.checked_mul(SCRATCH_PAGE_COUNT)?.checked_add(temp)?;
        let buffer = RegionBuffer::new(total)?;

        let mut sections = [Section::new(0, total); SCRATCH_SECTION_COUNT];
        for (index, section) in sections.iter_mut().take(SCRATCH_PAGE_COUNT).enumerate() {
            *section = Section::new(index * page, (index + 1) * page);
        }
        sections[SCRATCH_PAGE_COUNT] = Section::new(SCRATCH_PAGE_COUNT * page, total);

        Some(Self {
            buffer,
            sections,
            current_section: None,
            poison,
        })
    }

    /// Section an allocator id addresses
    #[inline]
    fn section(&self, id: AllocatorId) -> Option<&Section> {
        id.scratch_section().map(|index| &self.sections[index])
    }

    /// Whether the section behind `id` is open
    pub fn is_open(&self, id: AllocatorId) -> bool {
        self.section(id).is_some_and(Section::is_open)
    }

    /// Bytes left in the section behind `id`; its full size while closed
    pub fn bytes_remaining(&self, id: AllocatorId) -> usize {
        self.section(id).map_or(0, |section| match section.cursor {
            Some(cursor) => section.end - cursor,
            None => section.capacity(),
        })
    }

    /// Section allocations are currently served from
    #[inline]
    pub fn current_section(&self) -> Option<usize> {
        self.current_section
    }

    fn any_real_section_open(&self) -> bool {
        self.sections[..SCRATCH_ALL_SECTION].iter().any(Section::is_open)
    }
}

impl AllocatorStrategy for Scratchpad {
    fn label(&self) -> &'static str {
        "Scratchpad"
    }

    fn allocate(
        &mut self,
        size: usize,
        align: AlignMask,
        diag: &mut Diagnostics,
    ) -> Option<NonNull<u8>> {
        let cursor = self.current_section.and_then(|index| self.sections[index].cursor);
        let (Some(index), Some(cursor)) = (self.current_section, cursor) else {
            diag.assertion_failed(
                FaultKind::NoOpenSection,
                format_args!("scratchpad allocation of {} bytes with no open section", size),
            );
            return None;
        };

        let base = self.buffer.begin();
        let section = &mut self.sections[index];
        let aligned = align.align_up(base + cursor)?;
        let end = aligned.checked_add(size)?;
        if end > base + section.end {
            return None;
        }
        section.cursor = Some(end - base);
        section.allocation_count += 1;
        Some(self.buffer.at(aligned - base))
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, diag: &mut Diagnostics) {
        mem_debug_assert!(
            diag,
            self.contains(ptr.as_ptr() as usize),
            FaultKind::StrayFree,
            "scratchpad free of foreign pointer {:p}",
            ptr
        );
    }

    #[inline]
    fn contains(&self, addr: usize) -> bool {
        self.buffer.contains(addr)
    }

    fn begin_scope(&mut self, _frame: &ScopeFrame, new_id: AllocatorId, diag: &mut Diagnostics) {
        let Some(index) = new_id.scratch_section() else {
            diag.assertion_failed(
                FaultKind::NoOpenSection,
                format_args!("{} is not a scratchpad section", new_id),
            );
            return;
        };
        self.current_section = Some(index);

        mem_debug_assert!(
            diag,
            !self.sections[index].is_open(),
            FaultKind::IllegalReopen,
            "reopening scratchpad section {}",
            new_id
        );
        if index == SCRATCH_ALL_SECTION {
            mem_debug_assert!(
                diag,
                !self.any_real_section_open(),
                FaultKind::ExclusiveScratchpad,
                "scratchpad all is exclusive"
            );
        } else {
            mem_debug_assert!(
                diag,
                !self.sections[SCRATCH_ALL_SECTION].is_open(),
                FaultKind::ExclusiveScratchpad,
                "scratchpad all is exclusive, opening {}",
                new_id
            );
        }

        let section = &mut self.sections[index];
        if self.poison {
            self.buffer.poison(section.begin, section.end);
        }
        section.cursor = Some(section.begin);
        section.allocation_count = 0;
    }

    fn end_scope(&mut self, frame: &ScopeFrame, _old_id: AllocatorId, diag: &mut Diagnostics) {
        let Some(index) = frame.id.scratch_section() else {
            return;
        };
        let section = &mut self.sections[index];
        mem_assert!(
            diag,
            section.is_open(),
            FaultKind::NoOpenSection,
            "closing scratchpad section {} that is not open",
            frame.id
        );
        section.high_water = section.high_water.max(section.used());
        section.cursor = None;
        section.allocation_count = 0;
        self.current_section = frame.previous_section;
    }

    fn allocation_count(&self, id: AllocatorId) -> usize {
        self.section(id).map_or(0, |section| section.allocation_count)
    }

    fn bytes_allocated(&self, id: AllocatorId) -> usize {
        self.section(id).map_or(0, Section::used)
    }

    fn high_water(&self, id: AllocatorId) -> usize {
        self.section(id).map_or(0, |section| section.high_water)
    }

    fn capacity(&self, id: AllocatorId) -> usize {
        self.section(id).map_or(0, Section::capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, POISON_BYTE};

    fn open(pad: &mut Scratchpad, id: AllocatorId, diag: &mut Diagnostics) -> ScopeFrame {
        let frame = ScopeFrame {
            id,
            previous: Some(AllocatorId::Heap),
            previous_allocation_count: 0,
            previous_bytes_allocated: 0,
            previous_section: pad.current_section(),
            depth: 1,
        };
        pad.begin_scope(&frame, id, diag);
        frame
    }

    #[test]
    fn test_section_layout() {
        let pad = Scratchpad::new(64, 256, false).unwrap();
        assert_eq!(pad.capacity(AllocatorId::ScratchPage0), 64);
        assert_eq!(pad.capacity(AllocatorId::ScratchPage2), 64);
        assert_eq!(pad.capacity(AllocatorId::ScratchTemp), 256);
        assert_eq!(pad.capacity(AllocatorId::ScratchAll), 3 * 64 + 256);
        assert_eq!(pad.bytes_remaining(AllocatorId::ScratchTemp), 256);
        assert_eq!(pad.capacity(AllocatorId::Heap), 0);
    }

    #[test]
    fn test_open_allocate_close() {
        let mut diag = Diagnostics::new(Settings::default());
        let mut pad = Scratchpad::new(64, 256, true).unwrap();

        let scope = open(&mut pad, AllocatorId::ScratchPage1, &mut diag);
        let ptr = pad.allocate(10, AlignMask::BYTE, &mut diag).unwrap();
        assert_eq!(unsafe { *ptr.as_ptr() }, POISON_BYTE);
        assert_eq!(pad.allocation_count(AllocatorId::ScratchPage1), 1);
        assert_eq!(pad.bytes_remaining(AllocatorId::ScratchPage1), 54);

        // page 1 starts one page into the buffer
        assert!(pad.contains(ptr.as_ptr() as usize));
        assert!(pad.allocate(55, AlignMask::BYTE, &mut diag).is_none());

        unsafe { pad.free(ptr, &mut diag) };
        assert_eq!(pad.allocation_count(AllocatorId::ScratchPage1), 1);

        pad.end_scope(&scope, AllocatorId::Heap, &mut diag);
        assert!(!pad.is_open(AllocatorId::ScratchPage1));
        assert_eq!(pad.high_water(AllocatorId::ScratchPage1), 10);
        assert_eq!(pad.allocation_count(AllocatorId::ScratchPage1), 0);
        assert_eq!(diag.assertion_count(), 0);
    }

    #[test]
    fn test_real_sections_nest() {
        let mut diag = Diagnostics::new(Settings::default());
        let mut pad = Scratchpad::new(64, 256, false).unwrap();

        let outer = open(&mut pad, AllocatorId::ScratchPage0, &mut diag);
        let inner = open(&mut pad, AllocatorId::ScratchPage1, &mut diag);
        assert!(pad.allocate(8, AlignMask::WORD, &mut diag).is_some());
        pad.end_scope(&inner, AllocatorId::ScratchPage0, &mut diag);

        // back in page 0
        assert!(pad.allocate(8, AlignMask::WORD, &mut diag).is_some());
        assert_eq!(pad.allocation_count(AllocatorId::ScratchPage0), 1);
        pad.end_scope(&outer, AllocatorId::Heap, &mut diag);
        assert_eq!(diag.assertion_count(), 0);
    }

    #[test]
    fn test_all_is_exclusive() {
        let mut diag = Diagnostics::new(Settings { logging: false, asserts_allowed: 1, ..Settings::default() });
        let mut pad = Scratchpad::new(64, 256, false).unwrap();

        let all = open(&mut pad, AllocatorId::ScratchAll, &mut diag);
        let page = open(&mut pad, AllocatorId::ScratchPage0, &mut diag);
        if cfg!(debug_assertions) {
            assert_eq!(diag.settings.asserts_allowed, 0);
            assert_eq!(diag.count_of(FaultKind::ExclusiveScratchpad), 1);
        }
        pad.end_scope(&page, AllocatorId::ScratchAll, &mut diag);
        pad.end_scope(&all, AllocatorId::Heap, &mut diag);
    }

    #[test]
    fn test_allocation_without_open_section() {
        let mut diag = Diagnostics::new(Settings { logging: false, asserts_allowed: 1, ..Settings::default() });
        let mut pad = Scratchpad::new(64, 256, false).unwrap();

        assert!(pad.allocate(8, AlignMask::WORD, &mut diag).is_none());
        assert_eq!(diag.settings.asserts_allowed, 0);
        assert_eq!(diag.count_of(FaultKind::NoOpenSection), 1);
    }
}
