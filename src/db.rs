//! DB facade: `write` enqueues into the ring; `flush_once`/
//! `flush_until_empty` drain it through the appender; `query_latest` scans
//! committed segments and decodes blocks to find the freshest sample.

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use crate::alloc_seg::Allocator;
use crate::appender::Appender;
use crate::error::{Error, Result};
use crate::flash::FlashDevice;
use crate::recover::{self, SegSummary};
use crate::ring::Ring;
use crate::segment::{self, SegmentType};

/// Maximum points packed into a single block per `flush_once` call.
const BLOCK_MAX_POINTS: usize = 128;

const POINT_RAM_LEN: usize = 12; // ts(4) + metric_id(2) + series_id(2) + value(4)

fn next_pow2(x: u32) -> u32 {
    if x <= 1 {
        return 1;
    }
    1u32 << (32 - (x - 1).leading_zeros())
}

fn encode_point(ts: u32, metric_id: u16, series_id: u16, value: f32) -> [u8; POINT_RAM_LEN] {
    let mut buf = [0u8; POINT_RAM_LEN];
    buf[0..4].copy_from_slice(&ts.to_le_bytes());
    buf[4..6].copy_from_slice(&metric_id.to_le_bytes());
    buf[6..8].copy_from_slice(&series_id.to_le_bytes());
    buf[8..12].copy_from_slice(&value.to_le_bytes());
    buf
}

fn decode_point(buf: &[u8]) -> (u32, u16, u16, f32) {
    let ts = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let metric_id = u16::from_le_bytes(buf[4..6].try_into().unwrap());
    let series_id = u16::from_le_bytes(buf[6..8].try_into().unwrap());
    let value = f32::from_le_bytes(buf[8..12].try_into().unwrap());
    (ts, metric_id, series_id, value)
}

/// The append-only time-series log.
pub struct Db {
    flash: FlashDevice,
    ring: Ring,
    alloc: Allocator,
    appender: Appender,
    app_open: bool,
    next_seq: u32,
}

impl Db {
    /// Initializes a fresh database over `flash`.
    ///
    /// `ring_capacity_elems` is rounded up to the next power of two if it
    /// isn't one already (logged at `debug` level when that happens), since
    /// a caller asking for "about 500 slots" almost certainly doesn't mean
    /// to hard-fail on exactly 500.
    pub fn init(flash: FlashDevice, ring_capacity_elems: u32, seq_start: u32) -> Result<Self> {
        if ring_capacity_elems == 0 {
            return Err(Error::InvalidArg);
        }
        let rounded = next_pow2(ring_capacity_elems);
        if rounded != ring_capacity_elems {
            log::debug!(
                "db: rounding ring_capacity_elems {ring_capacity_elems} up to {rounded}"
            );
        }

        let alloc = Allocator::new(&flash)?;
        let ring = Ring::new(rounded, POINT_RAM_LEN)?;

        Ok(Db {
            flash,
            ring,
            alloc,
            appender: Appender::closed(),
            app_open: false,
            next_seq: seq_start,
        })
    }

    /// Enqueues one point. Returns [`Error::Busy`] if the ring is full.
    pub fn write(&mut self, metric_id: u16, series_id: u16, ts: u32, value: f32) -> Result<()> {
        let encoded = encode_point(ts, metric_id, series_id, value);
        let pushed = self.ring.push(&encoded, 1);
        if pushed == 1 {
            Ok(())
        } else {
            log::debug!("db: write rejected, ring full");
            Err(Error::Busy)
        }
    }

    fn pop_same_series(&self, cap: usize) -> Vec<(u32, u16, u16, f32)> {
        let mut out = Vec::with_capacity(cap);
        let first = match self.ring.peek() {
            Some(bytes) => decode_point(bytes),
            None => return out,
        };
        let (_, m, s, _) = first;

        let mut buf = [0u8; POINT_RAM_LEN];
        if self.ring.pop(&mut buf, 1) != 1 {
            return out;
        }
        out.push(decode_point(&buf));

        while out.len() < cap {
            match self.ring.peek() {
                Some(bytes) => {
                    let (_, nm, ns, _) = decode_point(bytes);
                    if nm != m || ns != s {
                        break;
                    }
                }
                None => break,
            }
            if self.ring.pop(&mut buf, 1) != 1 {
                break;
            }
            out.push(decode_point(&buf));
        }
        out
    }

    fn open_appender_on_free_segment(&mut self) -> Result<()> {
        let base = self.alloc.acquire(&self.flash)?;
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.appender.open(&mut self.flash, base, seq)?;
        self.app_open = true;
        Ok(())
    }

    /// Peels one run of up to 128 same-(metric, series) points off the
    /// ring and appends them as a single block, lazily opening an
    /// appender via the allocator (never a hardcoded base) and rolling
    /// over to a freshly allocated segment on [`Error::NoSpace`].
    pub fn flush_once(&mut self) -> Result<()> {
        if self.ring.is_empty() {
            return Ok(());
        }

        if !self.app_open {
            self.open_appender_on_free_segment()?;
        }

        let run = self.pop_same_series(BLOCK_MAX_POINTS);
        if run.is_empty() {
            return Ok(());
        }
        let metric = run[0].1;
        let series = run[0].2;
        let ts: Vec<u32> = run.iter().map(|p| p.0).collect();
        let val: Vec<f32> = run.iter().map(|p| p.3).collect();

        match self.appender.append_block(&mut self.flash, metric, series, &ts, &val) {
            Ok(()) => Ok(()),
            Err(Error::NoSpace) => {
                self.appender.commit(&mut self.flash, SegmentType::Data)?;
                log::info!("db: segment full, committed and rolling to a new one");
                self.app_open = false;
                self.open_appender_on_free_segment()?;
                self.appender.append_block(&mut self.flash, metric, series, &ts, &val)
            }
            Err(e) => Err(e),
        }
    }

    /// Drains the ring completely, then commits any segment left open.
    pub fn flush_until_empty(&mut self) -> Result<()> {
        while !self.ring.is_empty() {
            match self.flush_once() {
                Ok(()) => {}
                Err(Error::NoSpace) => {}
                Err(e) => return Err(e),
            }
        }
        if self.app_open {
            self.appender.commit(&mut self.flash, SegmentType::Data)?;
            log::info!("db: committed open segment on flush_until_empty");
            self.app_open = false;
        }
        Ok(())
    }

    fn scan_segment_latest(&self, base: usize, record_count: u32, metric_id: u16) -> Result<Option<(u32, f32)>> {
        let pre_h = segment::pre_header_len(&self.flash);

        let mut off = 0usize;
        let mut seen = 0u32;
        let mut best: Option<(u32, f32)> = None;

        while seen < record_count && off < pre_h {
            if off + 12 > pre_h {
                break;
            }
            let mut bh = [0u8; 12];
            self.flash.read(base + off, &mut bh)?;
            off += 12;
            let bh_metric = u16::from_le_bytes(bh[0..2].try_into().unwrap());
            let point_count = u32::from_le_bytes(bh[8..12].try_into().unwrap());

            for _ in 0..point_count {
                if seen >= record_count {
                    break;
                }
                if off + 8 > pre_h {
                    return Err(Error::Corrupt);
                }
                let mut pt = [0u8; 8];
                self.flash.read(base + off, &mut pt)?;
                off += 8;
                let ts = u32::from_le_bytes(pt[0..4].try_into().unwrap());
                let value = f32::from_le_bytes(pt[4..8].try_into().unwrap());

                if bh_metric == metric_id {
                    best = match best {
                        Some((bts, _)) if bts > ts => best,
                        _ => Some((ts, value)),
                    };
                }
                seen += 1;
            }
        }

        Ok(best)
    }

    /// Returns the `(value, ts)` pair with the greatest timestamp among all
    /// committed points for `metric_id`, or [`Error::MetricUnknown`].
    pub fn query_latest(&self, metric_id: u16) -> Result<(f32, u32)> {
        let sector_count = self.flash.sector_count();
        let mut summaries = vec![
            SegSummary { base: 0, type_raw: 0, seqno: 0, ts_min: 0, ts_max: 0, record_count: 0 };
            sector_count
        ];
        let n = recover::scan_all(&self.flash, &mut summaries);
        let n = n.min(summaries.len());

        let mut best: Option<(u32, f32)> = None;
        for s in &summaries[..n] {
            match self.scan_segment_latest(s.base, s.record_count, metric_id) {
                Ok(Some((ts, val))) => {
                    best = match best {
                        Some((bts, _)) if bts > ts => best,
                        _ => Some((ts, val)),
                    };
                }
                Ok(None) => {}
                Err(_) => continue,
            }
        }

        match best {
            Some((ts, val)) => Ok((val, ts)),
            None => Err(Error::MetricUnknown),
        }
    }

    /// Borrows the underlying flash device, e.g. for maintenance calls like
    /// `mark_bad`.
    pub fn flash(&mut self) -> &mut FlashDevice {
        &mut self.flash
    }

    /// Ring occupancy as a fraction of capacity.
    pub fn ring_load_factor(&self) -> f32 {
        self.ring.load_factor()
    }
}
