//! Chunk schedule.
//!
//! Transfers are cut into a deterministic sequence of byte ranges shared by
//! both directions: the first eight chunks grow from 128 KiB to 1 MiB in
//! 128 KiB steps, every later chunk is 1 MiB, and the final chunk takes
//! whatever remains. The MAC fold depends on this order, so both sides must
//! agree on it exactly.

/// Size step of the opening chunks, 128 KiB.
const CHUNK_STEP: u64 = 131_072;

/// Steady-state chunk size, 1 MiB.
const CHUNK_MAX: u64 = 1_048_576;

/// Byte ranges `(start, length)` of a transfer, in ascending start order.
///
/// An empty file has no ranges.
pub fn chunk_ranges(size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut index = 1;
    while start < size {
        let full = if index <= 8 { index * CHUNK_STEP } else { CHUNK_MAX };
        let len = full.min(size - start);
        ranges.push((start, len));
        start += len;
        index += 1;
    }
    ranges
}
