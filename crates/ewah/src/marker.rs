//! Field accessors for the packed 64-bit marker word.
//!
//! Every block in an EWAH buffer opens with a marker. Least significant
//! bit first:
//!
//! | bits   | field         | meaning                                  |
//! |--------|---------------|------------------------------------------|
//! | 0      | run value     | 0 = run of zero words, 1 = run of ones   |
//! | 1..33  | run length    | uniform words in the run                 |
//! | 33..64 | literal count | literal words following the marker       |
//!
//! The accessors are free functions over `u64`; a marker is addressed as
//! a (buffer, index) pair and resolved through the owning bitmap, never
//! held as a standalone object.

/// Largest run length a single marker can carry, in words.
pub const RUN_LEN_MAX: u64 = u32::MAX as u64;

/// Largest literal count a single marker can carry, in words.
pub const LITERAL_COUNT_MAX: u64 = (1 << 31) - 1;

const RUN_LEN_SHIFT: u32 = 1;
const RUN_LEN_MASK: u64 = RUN_LEN_MAX << RUN_LEN_SHIFT;
const LITERAL_SHIFT: u32 = 33;

/// Run value of the marker: `false` for zero words, `true` for ones.
#[inline]
pub fn run_bit(marker: u64) -> bool {
    marker & 1 != 0
}

/// Number of uniform words in the marker's run.
#[inline]
pub fn run_len(marker: u64) -> u64 {
    (marker >> RUN_LEN_SHIFT) & RUN_LEN_MAX
}

/// Number of literal words following the marker.
#[inline]
pub fn literal_count(marker: u64) -> u64 {
    marker >> LITERAL_SHIFT
}

/// Total uncompressed words the block describes.
#[inline]
pub fn block_size(marker: u64) -> u64 {
    run_len(marker) + literal_count(marker)
}

/// Set the run value, preserving the other two fields.
#[inline]
pub fn set_run_bit(marker: &mut u64, value: bool) {
    if value {
        *marker |= 1;
    } else {
        *marker &= !1;
    }
}

/// Set the run length, preserving the other two fields.
#[inline]
pub fn set_run_len(marker: &mut u64, len: u64) {
    debug_assert!(len <= RUN_LEN_MAX);
    *marker = (*marker & !RUN_LEN_MASK) | ((len & RUN_LEN_MAX) << RUN_LEN_SHIFT);
}

/// Set the literal count, preserving the other two fields.
#[inline]
pub fn set_literal_count(marker: &mut u64, count: u64) {
    debug_assert!(count <= LITERAL_COUNT_MAX);
    *marker = (*marker & ((1 << LITERAL_SHIFT) - 1)) | ((count & LITERAL_COUNT_MAX) << LITERAL_SHIFT);
}

/// Assemble a marker from its three fields.
#[inline]
pub fn pack(run_value: bool, len: u64, count: u64) -> u64 {
    let mut marker = if run_value { 1 } else { 0 };
    set_run_len(&mut marker, len);
    set_literal_count(&mut marker, count);
    marker
}
