//! CRC32C (Castagnoli), streaming and one-shot.
//!
//! Polynomial `0x1EDC6F41`, reflected form `0x82F63B78`. Seed
//! `0xFFFFFFFF`, finalization is bitwise NOT. This is not the CRC-32
//! (`0xEDB88320` reflected) most crates.io crc crates compute, so it is
//! hand-rolled here rather than pulled in as a dependency.

/// Seed used by every streaming computation.
pub const SEED: u32 = 0xFFFF_FFFF;

const POLY: u32 = 0x82F6_3B78;

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { POLY ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

static TABLE: [u32; 256] = build_table();

/// Folds `data` into a running (unfinalized) CRC state.
///
/// Start a computation with [`SEED`], call this as many times as needed
/// over the input in any chunking, then pass the final state through
/// [`finalize`].
pub fn update(state: u32, data: &[u8]) -> u32 {
    let mut crc = state;
    for &byte in data {
        let idx = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = TABLE[idx] ^ (crc >> 8);
    }
    crc
}

/// Finalizes a running state into the emitted CRC value.
pub const fn finalize(state: u32) -> u32 {
    !state
}

/// One-shot CRC32C over a single buffer.
pub fn crc32c(data: &[u8]) -> u32 {
    finalize(update(SEED, data))
}
