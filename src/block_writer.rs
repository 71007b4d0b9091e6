//! One-shot block writer: erase a segment, pack a single block, commit.
//!
//! Unlike [`crate::appender`], this writes exactly one block into a freshly
//! erased segment in a single call — the simplest possible path through the
//! format, useful for segments that only ever hold one block (an index or
//! epoch marker, or tests that don't need the streaming appender).

use crate::error::{Error, Result};
use crate::flash::FlashDevice;
use crate::segment::{self, SegmentType};

const BLOCK_HEADER_LEN: usize = 12;
const POINT_LEN: usize = 8;
const PAGE_BUF_LEN: usize = 512;

fn is_pow2(x: usize) -> bool {
    x != 0 && (x & (x - 1)) == 0
}

struct Staging {
    page: [u8; PAGE_BUF_LEN],
    page_off: usize,
    seg_off: usize,
    prog: usize,
    pre_h: usize,
    base: usize,
    erased: u8,
}

impl Staging {
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
}

/// Writes `timestamps`/`values` (same length, one (metric, series) pair) as
/// a single block into the segment at `base`, then commits it.
///
/// Erases the segment first. Fails [`Error::NoSpace`] (before erasing) if
/// the block does not fit in the pre-header region.
pub fn write_segment(
    flash: &mut FlashDevice,
    base: usize,
    metric_id: u16,
    series_id: u16,
    timestamps: &[u32],
    values: &[f32],
    seqno: u32,
) -> Result<()> {
    if timestamps.is_empty() || timestamps.len() != values.len() {
        return Err(Error::InvalidArg);
    }
    let n = timestamps.len();

    let seg = flash.sector_bytes();
    let prog = flash.prog_bytes();
    if !is_pow2(seg) || !is_pow2(prog) || base % seg != 0 || prog > PAGE_BUF_LEN {
        return Err(Error::InvalidArg);
    }
    let pre_h = seg - prog;

    let needed_raw = BLOCK_HEADER_LEN + n * POINT_LEN;
    let needed = (needed_raw + prog - 1) / prog * prog;
    if needed > pre_h {
        return Err(Error::NoSpace);
    }

    segment::erase(flash, base)?;

    let erased = flash.erased_value();
    let mut st = Staging {
        page: [erased; PAGE_BUF_LEN],
        page_off: 0,
        seg_off: 0,
        prog,
        pre_h,
        base,
        erased,
    };

    let mut hdr = [0u8; BLOCK_HEADER_LEN];
    hdr[0..2].copy_from_slice(&metric_id.to_le_bytes());
    hdr[2..4].copy_from_slice(&series_id.to_le_bytes());
    hdr[4..8].copy_from_slice(&timestamps[0].to_le_bytes());
    hdr[8..12].copy_from_slice(&(n as u32).to_le_bytes());
    st.emit(flash, &hdr)?;

    let mut ts_min = u32::MAX;
    let mut ts_max = 0u32;
    for i in 0..n {
        let mut pt = [0u8; POINT_LEN];
        pt[0..4].copy_from_slice(&timestamps[i].to_le_bytes());
        pt[4..8].copy_from_slice(&values[i].to_le_bytes());
        st.emit(flash, &pt)?;
        ts_min = ts_min.min(timestamps[i]);
        ts_max = ts_max.max(timestamps[i]);
    }

    st.flush_page(flash)?;

    segment::commit(flash, base, SegmentType::Data, seqno, ts_min, ts_max, n as u32)?;
    log::info!("block_writer: committed segment at {base} with {n} records");
    Ok(())
}
