//! Segment allocator: rotating first-fit selection of the next free,
//! non-bad segment.
//!
//! Single-writer assumption: `acquire` is never called concurrently with
//! itself. A candidate is free iff its commit page is still entirely at the
//! erased value.

use crate::error::{Error, Result};
use crate::flash::FlashDevice;
use crate::segment;

/// Rotating first-fit segment allocator.
pub struct Allocator {
    sector_bytes: usize,
    sector_count: usize,
    next_index: usize,
}

impl Allocator {
    /// Builds an allocator over `flash`'s sectors, starting the rotation at
    /// index 0.
    pub fn new(flash: &FlashDevice) -> Result<Self> {
        let sector_bytes = flash.sector_bytes();
        if sector_bytes == 0 {
            return Err(Error::InvalidArg);
        }
        Ok(Allocator {
            sector_bytes,
            sector_count: flash.sector_count(),
            next_index: 0,
        })
    }

    /// Scans up to `sector_count` candidates starting at `next_index`,
    /// skipping bad sectors and sectors whose commit page is not erased.
    /// On a hit, advances `next_index` past it and returns its base
    /// address. Returns [`Error::NoSpace`] (with `next_index` unchanged) if
    /// no candidate is free.
    pub fn acquire(&mut self, flash: &FlashDevice) -> Result<usize> {
        if self.sector_count == 0 {
            return Err(Error::InvalidArg);
        }
        for step in 0..self.sector_count {
            let idx = (self.next_index + step) % self.sector_count;
            if flash.is_bad(idx) {
                continue;
            }
            let base = idx * self.sector_bytes;
            if segment::is_header_erased(flash, base)? {
                self.next_index = (idx + 1) % self.sector_count;
                return Ok(base);
            }
        }
        log::warn!("alloc: no free segment among {} sectors", self.sector_count);
        Err(Error::NoSpace)
    }

    /// Current rotation cursor, exposed for diagnostics/tests.
    pub fn next_index(&self) -> usize {
        self.next_index
    }
}
