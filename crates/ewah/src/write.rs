//! Compact serialization: fixed header plus raw buffer words.
//!
//! Layout, all fields little-endian regardless of host byte order:
//!
//! ```text
//! offset 0:  length in bits        (i32)
//! offset 4:  word count            (i32)
//! offset 8:  active marker index   (i32)
//! offset 12: buffer words          (word count x u64)
//! ```
//!
//! There is no magic number, version tag, or checksum; the format is the
//! in-memory layout made portable.

use std::io::Write;

use crate::bitmap::Bitmap;
use crate::{EwahError, HEADER_SIZE};

/// Serialize `bitmap` into `out` in the compact format.
///
/// Fails with [`EwahError::TooLarge`] when a field exceeds what the
/// format's 32-bit header can represent.
pub fn write_bitmap<W: Write>(bitmap: &Bitmap, out: &mut W) -> Result<(), EwahError> {
    let len_bits = header_field("length in bits", bitmap.len_bits())?;
    let word_count = header_field("word count", bitmap.word_count() as u64)?;
    let active = header_field("active marker", bitmap.active_marker_index() as u64)?;

    out.write_all(&len_bits.to_le_bytes())?;
    out.write_all(&word_count.to_le_bytes())?;
    out.write_all(&active.to_le_bytes())?;
    for &word in bitmap.words() {
        out.write_all(&word.to_le_bytes())?;
    }
    Ok(())
}

/// Serialize `bitmap` into a fresh byte vector.
pub fn bitmap_to_bytes(bitmap: &Bitmap) -> Result<Vec<u8>, EwahError> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE + bitmap.size_in_bytes());
    write_bitmap(bitmap, &mut bytes)?;
    Ok(bytes)
}

fn header_field(field: &'static str, value: u64) -> Result<i32, EwahError> {
    if value > i32::MAX as u64 {
        return Err(EwahError::TooLarge { field, value });
    }
    Ok(value as i32)
}
