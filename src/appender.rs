//! Multi-block appender: page-buffered streaming of N blocks into one open
//! segment, committed once at the end.
//!
//! The staging buffer is only ever flushed at page boundaries, so every
//! program call this module issues is page-aligned — a direct consequence
//! of the pre-header length always being a multiple of the program unit.
//! `seg_off` never exceeds the pre-header length `H`; a single
//! `append_block` call is all-or-nothing with respect to `seg_off` because
//! the space check happens before anything is written.

use crate::error::{Error, Result};
use crate::flash::FlashDevice;
use crate::segment::{self, SegmentType};

const BLOCK_HEADER_LEN: usize = 12;
const POINT_LEN: usize = 8;
const PAGE_BUF_LEN: usize = 512;

fn is_pow2(x: usize) -> bool {
    x != 0 && (x & (x - 1)) == 0
}

/// A segment opened for streaming append.
pub struct Appender {
    base: usize,
    prog: usize,
    pre_h: usize,
    page: [u8; PAGE_BUF_LEN],
    page_off: usize,
    seg_off: usize,
    ts_min: u32,
    ts_max: u32,
    record_count: u32,
    seqno: u32,
    erased: u8,
    open: bool,
}

impl Appender {
    /// An appender with no segment open yet. Call [`Appender::open`] before
    /// using it.
    pub fn closed() -> Self {
        Appender {
            base: 0,
            prog: 0,
            pre_h: 0,
            page: [0u8; PAGE_BUF_LEN],
            page_off: 0,
            seg_off: 0,
            ts_min: u32::MAX,
            ts_max: 0,
            record_count: 0,
            seqno: 0,
            erased: 0xFF,
            open: false,
        }
    }

    /// Whether a segment is currently open for append.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Erases the segment at `base` and resets append state.
    pub fn open(&mut self, flash: &mut FlashDevice, base: usize, seqno: u32) -> Result<()> {
        let seg = flash.sector_bytes();
        let prog = flash.prog_bytes();
        if seg == 0 || prog == 0 || !is_pow2(seg) || !is_pow2(prog) {
            return Err(Error::InvalidArg);
        }
        if base % seg != 0 {
            return Err(Error::InvalidArg);
        }
        if prog > PAGE_BUF_LEN {
            return Err(Error::InvalidArg);
        }

        segment::erase(flash, base)?;

        self.base = base;
        self.prog = prog;
        self.pre_h = seg - prog;
        self.erased = flash.erased_value();
        for b in self.page.iter_mut() {
            *b = self.erased;
        }
        self.page_off = 0;
        self.seg_off = 0;
        self.ts_min = u32::MAX;
        self.ts_max = 0;
        self.record_count = 0;
        self.seqno = seqno;
        self.open = true;
        Ok(())
    }

    fn flush_page(&mut self, flash: &mut FlashDevice) -> Result<()> {
        if self.page_off == 0 {
            return Ok(());
        }
        let offset = self.seg_off - self.page_off;
        segment::program_data(flash, self.base, offset, &self.page[..self.prog])?;
        for b in self.page[..self.prog].iter_mut() {
            *b = self.erased;
        }
        self.page_off = 0;
        Ok(())
    }

    fn emit(&mut self, flash: &mut FlashDevice, mut src: &[u8]) -> Result<()> {
        while !src.is_empty() {
            let space = self.prog - self.page_off;
            let chunk = space.min(src.len());
            self.page[self.page_off..self.page_off + chunk].copy_from_slice(&src[..chunk]);
            self.page_off += chunk;
            self.seg_off += chunk;
            src = &src[chunk..];

            if self.seg_off > self.pre_h {
                return Err(Error::NoSpace);
            }
            if self.page_off == self.prog {
                self.flush_page(flash)?;
            }
        }
        Ok(())
    }

    /// Appends one block of `n` points sharing one (metric, series) pair.
    ///
    /// Fails [`Error::InvalidArg`] when not open, `ts.len() != val.len()`, or
    /// `ts.is_empty()`. Fails [`Error::NoSpace`] (leaving `seg_off`
    /// unchanged) if the block would not fit in the remaining pre-header
    /// space; nothing is written in that case.
    pub fn append_block(
        &mut self,
        flash: &mut FlashDevice,
        metric_id: u16,
        series_id: u16,
        ts: &[u32],
        val: &[f32],
    ) -> Result<()> {
        if !self.open {
            return Err(Error::InvalidArg);
        }
        if ts.is_empty() || ts.len() != val.len() {
            return Err(Error::InvalidArg);
        }
        let n = ts.len();
        let need = BLOCK_HEADER_LEN + n * POINT_LEN;
        if self.seg_off + need > self.pre_h {
            return Err(Error::NoSpace);
        }

        let mut hdr = [0u8; BLOCK_HEADER_LEN];
        hdr[0..2].copy_from_slice(&metric_id.to_le_bytes());
        hdr[2..4].copy_from_slice(&series_id.to_le_bytes());
        hdr[4..8].copy_from_slice(&ts[0].to_le_bytes());
        hdr[8..12].copy_from_slice(&(n as u32).to_le_bytes());
        self.emit(flash, &hdr)?;

        for i in 0..n {
            let mut pt = [0u8; POINT_LEN];
            pt[0..4].copy_from_slice(&ts[i].to_le_bytes());
            pt[4..8].copy_from_slice(&val[i].to_le_bytes());
            self.emit(flash, &pt)?;
            self.ts_min = self.ts_min.min(ts[i]);
            self.ts_max = self.ts_max.max(ts[i]);
        }

        self.record_count += n as u32;
        Ok(())
    }

    /// Flushes any partially staged page, then publishes the commit header.
    /// Marks the appender closed on success.
    pub fn commit(&mut self, flash: &mut FlashDevice, seg_type: SegmentType) -> Result<()> {
        if !self.open {
            return Err(Error::InvalidArg);
        }
        if self.page_off != 0 {
            self.flush_page(flash)?;
        }
        let ts_min = if self.ts_min == u32::MAX { 0 } else { self.ts_min };
        segment::commit(
            flash,
            self.base,
            seg_type,
            self.seqno,
            ts_min,
            self.ts_max,
            self.record_count,
        )?;
        self.open = false;
        Ok(())
    }

    /// Remaining pre-header bytes available for append.
    pub fn bytes_remaining(&self) -> usize {
        if self.seg_off > self.pre_h {
            0
        } else {
            self.pre_h - self.seg_off
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment;

    fn dev() -> FlashDevice {
        FlashDevice::init(4096, 1024, 256, 0xFF).unwrap()
    }

    #[test]
    fn appends_multiple_blocks_and_commits() {
        let mut f = dev();
        let mut a = Appender::closed();
        a.open(&mut f, 0, 1).unwrap();
        a.append_block(&mut f, 1, 1, &[10, 11], &[1.0, 2.0]).unwrap();
        a.append_block(&mut f, 2, 1, &[20], &[3.0]).unwrap();
        a.commit(&mut f, SegmentType::Data).unwrap();

        let hdr = segment::verify(&f, 0).unwrap();
        assert_eq!(hdr.record_count, 3);
        assert_eq!(hdr.ts_min, 10);
        assert_eq!(hdr.ts_max, 20);
    }

    #[test]
    fn no_space_leaves_seg_off_unchanged() {
        let mut f = FlashDevice::init(1024, 1024, 256, 0xFF).unwrap();
        let mut a = Appender::closed();
        a.open(&mut f, 0, 1).unwrap();
        let ts: Vec<u32> = (0..200).collect();
        let val: Vec<f32> = (0..200).map(|i| i as f32).collect();
        let before = a.seg_off;
        assert_eq!(
            a.append_block(&mut f, 1, 1, &ts, &val),
            Err(Error::NoSpace)
        );
        assert_eq!(a.seg_off, before);
    }

    #[test]
    fn empty_commit_is_allowed() {
        let mut f = dev();
        let mut a = Appender::closed();
        a.open(&mut f, 0, 9).unwrap();
        a.commit(&mut f, SegmentType::Data).unwrap();
        let hdr = segment::verify(&f, 0).unwrap();
        assert_eq!(hdr.record_count, 0);
        assert_eq!(hdr.ts_min, 0);
        assert_eq!(hdr.ts_max, 0);
    }

    #[test]
    fn rejects_append_when_not_open() {
        let mut f = dev();
        let mut a = Appender::closed();
        assert_eq!(
            a.append_block(&mut f, 1, 1, &[1], &[1.0]),
            Err(Error::InvalidArg)
        );
    }
}
