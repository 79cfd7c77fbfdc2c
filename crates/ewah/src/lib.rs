//! EWAH compressed bitmaps.
//!
//! An EWAH (Enhanced Word-Aligned Hybrid) bitmap stores a set of
//! non-negative integer positions as a run-length encoded sequence of
//! 64-bit words. Uniform stretches of the uncompressed bitmap (all zeros
//! or all ones) collapse into runs; everything else is kept as literal
//! words. Because compression is word-aligned, the Boolean combinators
//! (AND, OR, XOR, AND-NOT) operate directly on the compressed form
//! without decompressing either operand.
//!
//! Buffer layout:
//! ```text
//! [marker | literal₁ … literalₖ | marker | literal₁ … literalₘ | …]
//! ```
//! Every block opens with a marker word packing three fields (run value,
//! run length, literal count); see [`marker`] for the exact bit split.
//!
//! Construction is strictly append-only: positions must be set in
//! ascending order, and the logical length only grows.
//!
//! ```
//! use ewah::Bitmap;
//!
//! let weekdays = Bitmap::from_positions([1, 2, 3, 4, 5]);
//! let weekend = Bitmap::from_positions([0, 6]);
//!
//! let week = weekdays.or(&weekend);
//! assert_eq!(week.cardinality(), 7);
//! assert!(!weekdays.intersects(&weekend));
//!
//! let bytes = week.to_bytes()?;
//! let restored = Bitmap::from_bytes(&bytes)?;
//! assert_eq!(restored, week);
//! # Ok::<(), ewah::EwahError>(())
//! ```

pub mod bitmap;
pub mod cursor;
pub mod iter;
pub mod marker;
mod ops;
pub mod read;
pub mod write;

pub use bitmap::Bitmap;
pub use cursor::{MarkerStream, PendingBlock};
pub use iter::{PositionIter, RunIter};
pub use read::read_bitmap;
pub use write::write_bitmap;

/// Errors that can occur while encoding or decoding a bitmap.
#[derive(Debug, thiserror::Error)]
pub enum EwahError {
    #[error("invalid bitmap header: {0}")]
    InvalidHeader(String),

    #[error("malformed bitmap buffer: {0}")]
    MalformedBuffer(String),

    #[error("bitmap does not fit the compact format: {field} = {value}")]
    TooLarge { field: &'static str, value: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Size of the compact serialization header in bytes: three little-endian
/// 32-bit fields (length in bits, word count, active marker position).
pub const HEADER_SIZE: usize = 12;
