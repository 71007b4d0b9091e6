//! Single-producer/single-consumer lock-free ring buffer.
//!
//! Fixed power-of-two capacity, no allocation after construction, generic
//! over element *size* rather than element type — callers pass and receive
//! raw byte slices sized in multiples of the configured element width.
//!
//! Memory ordering mirrors the classic SPSC discipline: the producer loads
//! `tail` with `Acquire`, writes slots, then publishes by storing `head`
//! with `Release`; the consumer loads `head` with `Acquire`, reads slots,
//! then publishes by storing `tail` with `Release`. Each side only ever
//! reads its own index with `Relaxed` since it's the sole writer of that
//! index.

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};

fn is_pow2(x: u32) -> bool {
    x != 0 && (x & (x - 1)) == 0
}

/// Fixed-capacity SPSC ring of `elem_size`-byte elements.
pub struct Ring {
    buf: UnsafeCell<Vec<u8>>,
    elem_size: usize,
    capacity: u32,
    mask: u32,
    head: AtomicU32,
    tail: AtomicU32,
}

// SAFETY: `buf` is only ever written through `push` (by the single producer)
// in the region `[head, tail+capacity)` and only ever read through `pop`/
// `peek` (by the single consumer) in the region `[tail, head)`; those
// regions never overlap by construction, and the head/tail atomics provide
// the happens-before edges that make each side's writes visible to the
// other. Callers are responsible for upholding the single-producer/
// single-consumer discipline documented on `push`/`pop`.
unsafe impl Sync for Ring {}

impl Ring {
    /// Builds a ring holding up to `capacity_elems` elements of
    /// `elem_size` bytes each. `capacity_elems` must be a nonzero power of
    /// two and `elem_size` must be nonzero.
    pub fn new(capacity_elems: u32, elem_size: usize) -> Result<Self> {
        if elem_size == 0 || !is_pow2(capacity_elems) {
            return Err(Error::InvalidArg);
        }
        let bytes = capacity_elems as usize * elem_size;
        Ok(Ring {
            buf: UnsafeCell::new(vec![0u8; bytes]),
            elem_size,
            capacity: capacity_elems,
            mask: capacity_elems - 1,
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
        })
    }

    /// Element capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of elements currently queued.
    pub fn len(&self) -> u32 {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Queue occupancy as a fraction of capacity, in `[0.0, 1.0]`.
    pub fn load_factor(&self) -> f32 {
        self.len() as f32 / self.capacity as f32
    }

    fn slot_ptr(&self, index: u32) -> *mut u8 {
        let pos = (index & self.mask) as usize * self.elem_size;
        // SAFETY: `pos + elem_size <= buf.len()` by construction of `mask`.
        unsafe { (*self.buf.get()).as_mut_ptr().add(pos) }
    }

    /// Copies up to `count` elements from `elems` into the ring, clamped to
    /// available space. Returns the number actually pushed. Single-producer:
    /// must not be called concurrently with another `push`.
    pub fn push(&self, elems: &[u8], count: u32) -> u32 {
        if count == 0 || elems.len() < count as usize * self.elem_size {
            return 0;
        }
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let used = head.wrapping_sub(tail);
        let space = self.capacity - used;
        if space == 0 {
            return 0;
        }
        let count = count.min(space);

        let head_idx = head & self.mask;
        let first_space = self.capacity - head_idx;
        let first = count.min(first_space);

        unsafe {
            if first > 0 {
                core::ptr::copy_nonoverlapping(
                    elems.as_ptr(),
                    self.slot_ptr(head),
                    first as usize * self.elem_size,
                );
            }
            let second = count - first;
            if second > 0 {
                core::ptr::copy_nonoverlapping(
                    elems.as_ptr().add(first as usize * self.elem_size),
                    self.slot_ptr(head.wrapping_add(first)),
                    second as usize * self.elem_size,
                );
            }
        }

        self.head.store(head.wrapping_add(count), Ordering::Release);
        count
    }

    /// Copies up to `max_count` elements out of the ring into `out`,
    /// clamped to what's available. Returns the number actually popped.
    /// Single-consumer: must not be called concurrently with another `pop`
    /// or `peek`/`clear`.
    pub fn pop(&self, out: &mut [u8], max_count: u32) -> u32 {
        if max_count == 0 || out.len() < max_count as usize * self.elem_size {
            return 0;
        }
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        let avail = head.wrapping_sub(tail);
        if avail == 0 {
            return 0;
        }
        let count = max_count.min(avail);

        let tail_idx = tail & self.mask;
        let first_avail = self.capacity - tail_idx;
        let first = count.min(first_avail);

        unsafe {
            if first > 0 {
                core::ptr::copy_nonoverlapping(
                    self.slot_ptr(tail),
                    out.as_mut_ptr(),
                    first as usize * self.elem_size,
                );
            }
            let second = count - first;
            if second > 0 {
                core::ptr::copy_nonoverlapping(
                    self.slot_ptr(tail.wrapping_add(first)),
                    out.as_mut_ptr().add(first as usize * self.elem_size),
                    second as usize * self.elem_size,
                );
            }
        }

        self.tail.store(tail.wrapping_add(count), Ordering::Release);
        count
    }

    /// Advisory peek at the front element's bytes. Valid only until the next
    /// `pop` by the consumer (the slot may be overwritten by a subsequent
    /// `push` as soon as `pop` releases it).
    pub fn peek(&self) -> Option<&[u8]> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        if head == tail {
            return None;
        }
        let ptr = self.slot_ptr(tail);
        // SAFETY: the consumer is the only reader of this slot and it has
        // not yet been popped, so it's not concurrently written by the
        // producer (which only writes slots in `[head, tail+capacity)`).
        Some(unsafe { core::slice::from_raw_parts(ptr, self.elem_size) })
    }

    /// Resets the ring to empty. Only valid when both producer and consumer
    /// are quiesced (no concurrent `push`/`pop` in flight).
    pub fn clear(&mut self) {
        self.head.store(0, Ordering::Relaxed);
        self.tail.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_roundtrip() {
        let r = Ring::new(4, 4).unwrap();
        let data = [1u32.to_le_bytes(), 2u32.to_le_bytes(), 3u32.to_le_bytes()].concat();
        assert_eq!(r.push(&data, 3), 3);
        assert_eq!(r.len(), 3);

        let mut out = [0u8; 16];
        assert_eq!(r.pop(&mut out, 2), 2);
        assert_eq!(&out[0..8], &data[0..8]);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn push_clamps_to_free_space() {
        let r = Ring::new(2, 1).unwrap();
        assert_eq!(r.push(&[1, 2, 3], 3), 2);
        assert!(r.is_full());
        assert_eq!(r.push(&[9], 1), 0);
    }

    #[test]
    fn wraps_around_correctly() {
        let r = Ring::new(4, 1).unwrap();
        assert_eq!(r.push(&[1, 2, 3], 3), 3);
        let mut out = [0u8; 2];
        assert_eq!(r.pop(&mut out, 2), 2);
        assert_eq!(out, [1, 2]);
        // head=3, tail=2; push 3 more -> wraps past capacity boundary
        assert_eq!(r.push(&[4, 5, 6], 3), 3);
        let mut out2 = [0u8; 4];
        assert_eq!(r.pop(&mut out2, 4), 4);
        assert_eq!(out2, [3, 4, 5, 6]);
    }

    #[test]
    fn peek_then_pop_matches() {
        let r = Ring::new(2, 2).unwrap();
        r.push(&[7, 8], 1);
        assert_eq!(r.peek(), Some(&[7u8, 8u8][..]));
        let mut out = [0u8; 2];
        r.pop(&mut out, 1);
        assert_eq!(r.peek(), None);
    }

    #[test]
    fn rejects_non_pow2_capacity() {
        assert!(Ring::new(3, 4).is_err());
    }

    #[test]
    fn load_factor_tracks_occupancy() {
        let r = Ring::new(4, 1).unwrap();
        assert_eq!(r.load_factor(), 0.0);
        r.push(&[1, 2], 2);
        assert_eq!(r.load_factor(), 0.5);
    }
}
