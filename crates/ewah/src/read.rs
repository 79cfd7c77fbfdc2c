//! Compact deserialization; inverse of [`write`](crate::write).

use std::io::Read;

use crate::bitmap::Bitmap;
use crate::{marker, EwahError, HEADER_SIZE};

/// Deserialize a bitmap from `input`.
///
/// The stream carries no magic number or checksum, so the only defenses
/// are the header checks: non-negative fields, at least one buffer word,
/// an active marker inside the buffer whose block ends exactly at the
/// buffer's end, and a buffer that partitions cleanly into marker
/// blocks.
pub fn read_bitmap<R: Read>(input: &mut R) -> Result<Bitmap, EwahError> {
    let mut header = [0u8; HEADER_SIZE];
    input.read_exact(&mut header)?;

    let len_bits = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let word_count = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let active = i32::from_le_bytes([header[8], header[9], header[10], header[11]]);

    if len_bits < 0 {
        return Err(EwahError::InvalidHeader(format!(
            "negative length in bits: {len_bits}"
        )));
    }
    if word_count < 1 {
        return Err(EwahError::InvalidHeader(format!(
            "word count must be at least 1, got {word_count}"
        )));
    }
    if active < 0 || active >= word_count {
        return Err(EwahError::InvalidHeader(format!(
            "active marker {active} outside buffer of {word_count} words"
        )));
    }

    let word_count = word_count as usize;
    let active = active as usize;
    let mut buffer = vec![0u64; word_count];
    let mut bytes = [0u8; 8];
    for word in &mut buffer {
        input.read_exact(&mut bytes)?;
        *word = u64::from_le_bytes(bytes);
    }

    validate_blocks(&buffer, active, len_bits as u64)?;
    Ok(Bitmap::from_raw_parts(buffer, len_bits as u64, active))
}

/// Deserialize a bitmap from a byte slice.
pub fn bitmap_from_bytes(mut bytes: &[u8]) -> Result<Bitmap, EwahError> {
    read_bitmap(&mut bytes)
}

/// Check that the buffer partitions into marker blocks, that `active`
/// opens the last block, and that the implied word extent covers the
/// length.
fn validate_blocks(buffer: &[u64], active: usize, len_bits: u64) -> Result<(), EwahError> {
    let mut at = 0;
    let mut implied_words = 0u64;
    loop {
        let m = buffer[at];
        implied_words += marker::block_size(m);
        let following = at + 1 + marker::literal_count(m) as usize;
        match following.cmp(&buffer.len()) {
            std::cmp::Ordering::Less => {
                if at == active {
                    return Err(EwahError::MalformedBuffer(format!(
                        "active marker at {at} is not the last block"
                    )));
                }
                at = following;
            }
            std::cmp::Ordering::Equal => {
                if at != active {
                    return Err(EwahError::MalformedBuffer(format!(
                        "last block starts at {at}, active marker claims {active}"
                    )));
                }
                break;
            }
            std::cmp::Ordering::Greater => {
                return Err(EwahError::MalformedBuffer(format!(
                    "block at {at} runs past the buffer end"
                )));
            }
        }
    }
    if implied_words * 64 < len_bits {
        return Err(EwahError::MalformedBuffer(format!(
            "buffer implies {implied_words} words, too few for {len_bits} bits"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bitmap {
        let mut bm = Bitmap::from_positions([0, 2, 64, 900]);
        bm.set_len_bits(1000, false);
        bm
    }

    #[test]
    fn roundtrip_is_structural_identity() {
        let mut bm = sample();
        bm.shrink();
        let bytes = bm.to_bytes().unwrap();
        let back = Bitmap::from_bytes(&bytes).unwrap();
        assert_eq!(back, bm);
        assert_eq!(back.positions(), bm.positions());
        assert_eq!(back.len_bits(), bm.len_bits());
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.ewah");

        let bm = sample();
        let mut file = std::fs::File::create(&path).unwrap();
        bm.write_to(&mut file).unwrap();

        let mut file = std::fs::File::open(&path).unwrap();
        let back = Bitmap::read_from(&mut file).unwrap();
        assert_eq!(back, bm);
    }

    #[test]
    fn truncated_header_fails() {
        let bytes = sample().to_bytes().unwrap();
        assert!(matches!(
            Bitmap::from_bytes(&bytes[..7]),
            Err(EwahError::Io(_))
        ));
    }

    #[test]
    fn truncated_body_fails() {
        let bytes = sample().to_bytes().unwrap();
        assert!(matches!(
            Bitmap::from_bytes(&bytes[..bytes.len() - 3]),
            Err(EwahError::Io(_))
        ));
    }

    #[test]
    fn negative_fields_are_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[3] = 0x80;
        assert!(matches!(
            Bitmap::from_bytes(&bytes),
            Err(EwahError::InvalidHeader(_))
        ));
    }

    #[test]
    fn active_marker_out_of_bounds_is_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        let words = sample().word_count() as i32;
        bytes[8..12].copy_from_slice(&words.to_le_bytes());
        assert!(matches!(
            Bitmap::from_bytes(&bytes),
            Err(EwahError::InvalidHeader(_))
        ));
    }

    #[test]
    fn active_marker_not_opening_last_block_is_rejected() {
        // sample() has more than one block; point active at the first.
        let bm = sample();
        assert!(bm.word_count() > 2);
        let mut bytes = bm.to_bytes().unwrap();
        bytes[8..12].copy_from_slice(&0i32.to_le_bytes());
        assert!(matches!(
            Bitmap::from_bytes(&bytes),
            Err(EwahError::MalformedBuffer(_))
        ));
    }

    #[test]
    fn lying_literal_count_is_rejected() {
        let mut bm = Bitmap::new();
        bm.append_literal_word(0b101);
        let mut bytes = bm.to_bytes().unwrap();
        // Inflate the marker's literal count past the buffer end.
        let mut m = bm.words()[0];
        crate::marker::set_literal_count(&mut m, 9);
        bytes[12..20].copy_from_slice(&m.to_le_bytes());
        assert!(matches!(
            Bitmap::from_bytes(&bytes),
            Err(EwahError::MalformedBuffer(_))
        ));
    }

    #[test]
    fn length_beyond_implied_words_is_rejected() {
        let bm = Bitmap::from_positions([5]);
        let mut bytes = bm.to_bytes().unwrap();
        bytes[0..4].copy_from_slice(&10_000i32.to_le_bytes());
        assert!(matches!(
            Bitmap::from_bytes(&bytes),
            Err(EwahError::MalformedBuffer(_))
        ));
    }

    #[test]
    fn consecutive_bitmaps_share_a_stream() {
        // The format is self-delimiting, so several bitmaps can sit
        // back to back in one stream.
        let a = Bitmap::from_positions([4, 99]);
        let b = Bitmap::from_positions(0..130);

        let mut stream = Vec::new();
        a.write_to(&mut stream).unwrap();
        b.write_to(&mut stream).unwrap();

        let mut cursor = stream.as_slice();
        assert_eq!(read_bitmap(&mut cursor).unwrap(), a);
        assert_eq!(read_bitmap(&mut cursor).unwrap(), b);
        assert!(cursor.is_empty());
    }

    #[test]
    fn zero_word_count_is_rejected() {
        let mut bytes = Bitmap::new().to_bytes().unwrap();
        bytes[4..8].copy_from_slice(&0i32.to_le_bytes());
        assert!(matches!(
            Bitmap::from_bytes(&bytes),
            Err(EwahError::InvalidHeader(_))
        ));
    }

    #[test]
    fn empty_bitmap_roundtrip() {
        let bm = Bitmap::new();
        let back = Bitmap::from_bytes(&bm.to_bytes().unwrap()).unwrap();
        assert_eq!(back, bm);
        assert_eq!(back.len_bits(), 0);
        assert!(back.is_empty());
    }
}
