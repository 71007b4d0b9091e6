//! Property tests for the universal invariants in the design notes.

use proptest::prelude::*;

use pcdb::crc32c;
use pcdb::db::Db;
use pcdb::error::Error;
use pcdb::flash::FlashDevice;
use pcdb::ring::Ring;
use pcdb::segment::{self, SegmentType};

fn castagnoli_reference(data: &[u8]) -> u32 {
    // Bit-at-a-time reference, independent of the table-driven fast path.
    const POLY: u32 = 0x82F6_3B78;
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

proptest! {
    /// Property 5: CRC32C matches the bit-at-a-time Castagnoli reference.
    #[test]
    fn crc32c_matches_reference(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(crc32c::crc32c(&data), castagnoli_reference(&data));
    }

    /// Property 6: the ring yields exactly the concatenation of pushes, in
    /// order, with no duplicates or losses, for any interleaving that never
    /// overflows capacity.
    #[test]
    fn ring_preserves_fifo_order(
        batches in proptest::collection::vec(1u8..=8, 1..30),
    ) {
        let capacity = 64u32;
        let ring = Ring::new(capacity, 1).unwrap();
        let mut expected = Vec::new();
        let mut received = Vec::new();
        let mut next_val: u8 = 0;

        for &push_count in &batches {
            let mut chunk = Vec::new();
            for _ in 0..push_count {
                chunk.push(next_val);
                next_val = next_val.wrapping_add(1);
            }
            let pushed = ring.push(&chunk, chunk.len() as u32);
            expected.extend_from_slice(&chunk[..pushed as usize]);

            let mut out = vec![0u8; capacity as usize];
            let popped = ring.pop(&mut out, (pushed / 2).max(1));
            received.extend_from_slice(&out[..popped as usize]);
        }

        let mut out = vec![0u8; capacity as usize];
        loop {
            let popped = ring.pop(&mut out, capacity);
            if popped == 0 {
                break;
            }
            received.extend_from_slice(&out[..popped as usize]);
        }

        prop_assert_eq!(received, expected);
    }

    /// Property 3: any single 1->0 bit change in the pre-header region after
    /// commit is detected by `verify`.
    #[test]
    fn single_bit_flip_is_detected(byte_index in 0usize..256, bit in 0u8..8) {
        let mut flash = FlashDevice::init(4096, 4096, 256, 0xFF).unwrap();
        segment::erase(&mut flash, 0).unwrap();
        // Pre-header left at its erased value (0xFF); committing over an
        // all-erased region is legal (an empty/placeholder block).
        segment::commit(&mut flash, 0, SegmentType::Data, 1, 1, 1, 1).unwrap();
        prop_assert!(segment::verify(&flash, 0).is_ok());

        // Every old byte is 0xFF, so clearing any single bit is always a
        // legal 1->0 transition.
        let mut patch = [0xFFu8; 256];
        patch[byte_index] &= !(1 << bit);
        segment::program_data(&mut flash, 0, 0, &patch).unwrap();

        prop_assert_eq!(segment::verify(&flash, 0), Err(Error::Corrupt));
    }

    /// Property 1: flush_until_empty + query_latest returns the
    /// maximum-timestamp point for any metric, for writes that fit.
    #[test]
    fn query_latest_returns_max_timestamp(
        points in proptest::collection::vec((0u32..5000, 0f32..1000.0), 1..60),
    ) {
        let flash = FlashDevice::init(64 * 1024, 4096, 256, 0xFF).unwrap();
        let mut db = Db::init(flash, 256, 0).unwrap();

        let mut max_ts = 0u32;
        let mut max_val = 0f32;
        let mut found = false;
        for (ts, val) in &points {
            db.write(1, 1, *ts, *val).unwrap();
            if !found || *ts >= max_ts {
                max_ts = *ts;
                max_val = *val;
                found = true;
            }
        }
        db.flush_until_empty().unwrap();

        let (val, ts) = db.query_latest(1).unwrap();
        prop_assert_eq!(ts, max_ts);
        prop_assert_eq!(val, max_val);
    }
}
