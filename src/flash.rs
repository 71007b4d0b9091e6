//! Flash device contract: a byte-addressable medium with NOR erase/program
//! semantics.
//!
//! Mechanical faithfulness to NOR physics here is the source of most of the
//! rest of the crate's safety guarantees: erase resets a whole sector to the
//! erased value and bumps a saturating wear counter; program only ever
//! flips 1-bits to 0-bits (modeled as a precondition check followed by a
//! bitwise AND, never relaxed for performance); addresses and lengths for
//! program calls must be aligned to the program unit.

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use crate::error::{Error, Result};

/// Aggregate wear-count statistics across all sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WearStats {
    pub min: u32,
    pub max: u32,
    pub avg: u32,
}

fn is_pow2(x: u32) -> bool {
    x != 0 && (x & (x - 1)) == 0
}

fn aligned(x: usize, a: usize) -> bool {
    if a == 0 {
        x == 0
    } else {
        x % a == 0
    }
}

/// An in-memory simulation of a NOR flash device.
///
/// Owns its backing byte buffer, per-sector wear counters, and per-sector
/// bad flags, all with the device's own lifetime — there is no sharing.
pub struct FlashDevice {
    mem: Vec<u8>,
    wear: Vec<u32>,
    bad: Vec<bool>,
    total: usize,
    sector: usize,
    program: usize,
    erased_value: u8,
}

impl FlashDevice {
    /// Allocates a new simulated device.
    ///
    /// Fails with [`Error::InvalidArg`] if `total`, `sector`, or `program`
    /// is zero, if `sector`/`program` are not both powers of two, if
    /// `total % sector != 0`, or if `sector % program != 0`.
    pub fn init(total: usize, sector: usize, program: usize, erased_value: u8) -> Result<Self> {
        if total == 0 || sector == 0 || program == 0 {
            return Err(Error::InvalidArg);
        }
        if !is_pow2(sector as u32) || !is_pow2(program as u32) {
            return Err(Error::InvalidArg);
        }
        if total % sector != 0 || sector % program != 0 {
            return Err(Error::InvalidArg);
        }

        let sector_count = total / sector;
        Ok(FlashDevice {
            mem: vec![erased_value; total],
            wear: vec![0u32; sector_count],
            bad: vec![false; sector_count],
            total,
            sector,
            program,
            erased_value,
        })
    }

    /// Total device size in bytes.
    pub fn total_bytes(&self) -> usize {
        self.total
    }

    /// Erase (sector) unit in bytes.
    pub fn sector_bytes(&self) -> usize {
        self.sector
    }

    /// Program (page) unit in bytes.
    pub fn prog_bytes(&self) -> usize {
        self.program
    }

    /// Number of sectors.
    pub fn sector_count(&self) -> usize {
        self.wear.len()
    }

    /// Byte value a sector reads as after erase.
    pub fn erased_value(&self) -> u8 {
        self.erased_value
    }

    fn addr_to_sector(&self, addr: usize) -> usize {
        addr / self.sector
    }

    fn range_in_bounds(&self, addr: usize, len: usize) -> bool {
        len <= self.total && addr <= self.total - len
    }

    /// True if every sector touched by `[addr, addr+len)` is marked bad.
    /// False (no hit) for an out-of-range request — callers must bounds
    /// check first.
    fn range_hits_bad(&self, addr: usize, len: usize) -> bool {
        if len == 0 {
            return false;
        }
        let first = self.addr_to_sector(addr);
        let last = self.addr_to_sector(addr + len - 1);
        (first..=last).any(|s| self.bad[s])
    }

    /// Copies `out.len()` bytes starting at `addr` into `out`.
    pub fn read(&self, addr: usize, out: &mut [u8]) -> Result<()> {
        let len = out.len();
        if !self.range_in_bounds(addr, len) {
            return Err(Error::InvalidArg);
        }
        if self.range_hits_bad(addr, len) {
            return Err(Error::FlashIo);
        }
        out.copy_from_slice(&self.mem[addr..addr + len]);
        Ok(())
    }

    /// Programs `bytes` at `addr` as a bitwise AND against the current
    /// contents.
    ///
    /// Fails [`Error::InvalidArg`] if `addr`/`bytes.len()` are not multiples
    /// of the program unit, if the range is out of bounds, or if any
    /// requested bit would transition 0→1. Fails [`Error::FlashIo`] if any
    /// covered sector is bad.
    pub fn program(&mut self, addr: usize, bytes: &[u8]) -> Result<()> {
        let len = bytes.len();
        if !aligned(addr, self.program) || !aligned(len, self.program) {
            return Err(Error::InvalidArg);
        }
        if !self.range_in_bounds(addr, len) {
            return Err(Error::InvalidArg);
        }
        if self.range_hits_bad(addr, len) {
            return Err(Error::FlashIo);
        }

        // Precondition: no byte may request a 0->1 transition.
        for (old, new) in self.mem[addr..addr + len].iter().zip(bytes.iter()) {
            if (!old) & new != 0 {
                return Err(Error::InvalidArg);
            }
        }

        for (old, new) in self.mem[addr..addr + len].iter_mut().zip(bytes.iter()) {
            *old &= *new;
        }
        Ok(())
    }

    /// Resets sector `index` to the erased value and bumps its wear counter
    /// (saturating).
    pub fn erase_sector(&mut self, index: usize) -> Result<()> {
        if index >= self.sector_count() {
            return Err(Error::InvalidArg);
        }
        if self.bad[index] {
            return Err(Error::FlashIo);
        }
        let start = index * self.sector;
        let end = start + self.sector;
        for b in &mut self.mem[start..end] {
            *b = self.erased_value;
        }
        self.wear[index] = self.wear[index].saturating_add(1);
        Ok(())
    }

    /// Marks (or clears) sector `index` as bad.
    pub fn mark_bad(&mut self, index: usize, flag: bool) -> Result<()> {
        if index >= self.sector_count() {
            return Err(Error::InvalidArg);
        }
        self.bad[index] = flag;
        Ok(())
    }

    /// Whether sector `index` is marked bad.
    pub fn is_bad(&self, index: usize) -> bool {
        self.bad.get(index).copied().unwrap_or(true)
    }

    /// Aggregate wear-count statistics across all sectors.
    pub fn wear_stats(&self) -> WearStats {
        if self.wear.is_empty() {
            return WearStats { min: 0, max: 0, avg: 0 };
        }
        let min = *self.wear.iter().min().unwrap();
        let max = *self.wear.iter().max().unwrap();
        let sum: u64 = self.wear.iter().map(|&w| w as u64).sum();
        let avg = (sum / self.wear.len() as u64) as u32;
        WearStats { min, max, avg }
    }
}

// `embedded_storage::nor_flash::{ReadNorFlash, NorFlash}` require their
// READ_SIZE/WRITE_SIZE/ERASE_SIZE as associated consts, but this device's
// geometry is validated at runtime in `init` rather than fixed at compile
// time (tests and callers build devices with many different geometries), so
// those traits aren't implementable here without baking in one geometry.
// Only the error-kind mapping in `crate::error` is provided.

#[cfg(test)]
mod tests {
    use super::*;

    fn dev() -> FlashDevice {
        FlashDevice::init(4096, 1024, 256, 0xFF).unwrap()
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(FlashDevice::init(0, 1024, 256, 0xFF).is_err());
        assert!(FlashDevice::init(4096, 1000, 256, 0xFF).is_err()); // not pow2
        assert!(FlashDevice::init(4096, 1024, 300, 0xFF).is_err()); // not pow2
        assert!(FlashDevice::init(4097, 1024, 256, 0xFF).is_err()); // not multiple
        assert!(FlashDevice::init(4096, 1024, 300, 0xFF).is_err());
    }

    #[test]
    fn erase_resets_to_erased_value() {
        let mut d = dev();
        d.program(0, &[0x00; 256]).unwrap();
        d.erase_sector(0).unwrap();
        let mut out = [0u8; 256];
        d.read(0, &mut out).unwrap();
        assert_eq!(out, [0xFFu8; 256]);
    }

    #[test]
    fn program_is_bitwise_and() {
        let mut d = dev();
        d.program(0, &[0b1010_1010; 256]).unwrap();
        let mut out = [0u8; 256];
        d.read(0, &mut out).unwrap();
        assert_eq!(out[0], 0b1010_1010);
    }

    #[test]
    fn rejects_0_to_1_transition() {
        let mut d = dev();
        d.program(0, &[0x00; 256]).unwrap();
        assert_eq!(d.program(0, &[0xFF; 256]), Err(Error::InvalidArg));
    }

    #[test]
    fn bad_sector_blocks_io() {
        let mut d = dev();
        d.mark_bad(0, true).unwrap();
        assert_eq!(d.program(0, &[0x00; 256]), Err(Error::FlashIo));
        let mut out = [0u8; 256];
        assert_eq!(d.read(0, &mut out), Err(Error::FlashIo));
        assert_eq!(d.erase_sector(0), Err(Error::FlashIo));
    }

    #[test]
    fn wear_counter_saturates() {
        let mut d = FlashDevice::init(1024, 1024, 256, 0xFF).unwrap();
        d.wear[0] = u32::MAX;
        d.erase_sector(0).unwrap();
        assert_eq!(d.wear_stats().max, u32::MAX);
    }
}
