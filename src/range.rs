use crate::arith::{large_page_align_down, large_page_align_up};
use crate::consts::LARGE_PAGE_SIZE;
use crate::error::MapError;
use std::fmt;

/// A half-open span `[from, to)` of this process's address space.
///
/// Describes memory that already exists; it owns nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryRange {
    pub from: usize,
    pub to: usize,
}

impl MemoryRange {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, addr: usize) -> bool {
        self.from <= addr && addr < self.to
    }

    /// Shrinks the range inward to large-page boundaries. A `from` too close
    /// to the top of the address space to round up becomes null.
    pub fn align_to_large_pages(&self) -> Self {
        Self {
            from: large_page_align_up(self.from).unwrap_or(0),
            to: large_page_align_down(self.to),
        }
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}-0x{:x}", self.from, self.to)
    }
}

/// Aligns `range` to large pages and checks that the result is safe to hand
/// to the mover at address `mover`.
pub fn align_and_validate(range: MemoryRange, mover: usize) -> Result<MemoryRange, MapError> {
    let aligned = range.align_to_large_pages();
    let MemoryRange { from, to } = aligned;

    if from == 0 || to == 0 || from > to {
        return Err(MapError::InvalidRegionAddress { from, to });
    }
    if to - from < LARGE_PAGE_SIZE {
        return Err(MapError::RegionTooSmall { from, to });
    }
    if aligned.contains(mover) {
        return Err(MapError::MoverOverlaps { from, to, mover });
    }
    Ok(aligned)
}
