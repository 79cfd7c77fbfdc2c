//! The compressed bitmap container and its append-only builder.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{Read, Write};

use crate::cursor::MarkerStream;
use crate::iter::{PositionIter, RunIter};
use crate::marker::{self, LITERAL_COUNT_MAX, RUN_LEN_MAX};
use crate::ops::{self, Op};
use crate::{read, write, EwahError};

/// An EWAH compressed bitmap: a set of `u64` positions stored as a
/// run-length encoded sequence of 64-bit words.
///
/// Construction is append-only. Bits are set in ascending order with
/// [`set`], whole words are appended with the `append_*`/`add_word`
/// family, and the logical length only ever grows. The Boolean
/// combinators ([`and`], [`or`], [`xor`], [`and_not`]) walk both
/// compressed operands in parallel and produce a fresh bitmap without
/// decompressing either side.
///
/// ```
/// use ewah::Bitmap;
///
/// let mut bm = Bitmap::new();
/// bm.set(2);
/// bm.set(1000);
/// assert_eq!(bm.positions(), vec![2, 1000]);
/// assert_eq!(bm.cardinality(), 2);
/// ```
///
/// [`set`]: Bitmap::set
/// [`and`]: Bitmap::and
/// [`or`]: Bitmap::or
/// [`xor`]: Bitmap::xor
/// [`and_not`]: Bitmap::and_not
#[derive(Clone)]
pub struct Bitmap {
    /// Packed words; `buffer[0]` is always a marker.
    buffer: Vec<u64>,
    /// Logical uncompressed length in bits.
    len_bits: u64,
    /// Index of the marker open for extension (always the last one).
    active_marker: usize,
}

impl Bitmap {
    /// An empty bitmap: no positions, zero length.
    pub fn new() -> Self {
        Bitmap {
            buffer: vec![0],
            len_bits: 0,
            active_marker: 0,
        }
    }

    /// An empty bitmap whose buffer can hold `words` words before
    /// reallocating.
    pub fn with_capacity(words: usize) -> Self {
        let mut buffer = Vec::with_capacity(words.max(1));
        buffer.push(0);
        Bitmap {
            buffer,
            len_bits: 0,
            active_marker: 0,
        }
    }

    /// Build a bitmap from ascending positions.
    ///
    /// Positions at or below an already-set position are skipped, per the
    /// append-only contract of [`set`](Bitmap::set).
    pub fn from_positions<I>(positions: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        let mut bm = Bitmap::new();
        bm.extend(positions);
        bm
    }

    /// Logical length of the uncompressed bitmap in bits. Positions at or
    /// beyond this are outside the set's domain.
    pub fn len_bits(&self) -> u64 {
        self.len_bits
    }

    /// Whether no position is set.
    pub fn is_empty(&self) -> bool {
        self.cardinality() == 0
    }

    /// Number of significant buffer words.
    pub fn word_count(&self) -> usize {
        self.buffer.len()
    }

    /// Compressed size in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.buffer.len() * 8
    }

    /// The packed buffer. `words()[0]` is always a marker; see the crate
    /// docs for the block layout.
    pub fn words(&self) -> &[u64] {
        &self.buffer
    }

    /// Grow the buffer's capacity by at least `additional` words ahead
    /// of a large append.
    pub fn reserve(&mut self, additional: usize) {
        self.buffer.reserve(additional);
    }

    /// Release allocation slack beyond the significant words.
    pub fn shrink(&mut self) {
        self.buffer.shrink_to_fit();
    }

    // Active-marker field access. The handle is an index resolved through
    // the bitmap on every use, so buffer reallocation can never leave it
    // dangling.

    fn active(&self) -> u64 {
        self.buffer[self.active_marker]
    }

    fn active_run_bit(&self) -> bool {
        marker::run_bit(self.active())
    }

    fn active_run_len(&self) -> u64 {
        marker::run_len(self.active())
    }

    fn active_literal_count(&self) -> u64 {
        marker::literal_count(self.active())
    }

    fn set_active_run_bit(&mut self, value: bool) {
        marker::set_run_bit(&mut self.buffer[self.active_marker], value);
    }

    fn set_active_run_len(&mut self, len: u64) {
        marker::set_run_len(&mut self.buffer[self.active_marker], len);
    }

    fn set_active_literal_count(&mut self, count: u64) {
        marker::set_literal_count(&mut self.buffer[self.active_marker], count);
    }

    /// Open a fresh marker at the buffer's tail.
    fn open_marker(&mut self) {
        self.buffer.push(0);
        self.active_marker = self.buffer.len() - 1;
    }

    // Length-neutral appenders. The public wrappers below advance
    // `len_bits`; `set` and `negate` manage the length themselves.

    /// Append `n` uniform words of `value` without touching the length.
    fn push_empty_words(&mut self, value: bool, mut n: u64) {
        if n == 0 {
            return;
        }
        if self.active_literal_count() == 0 {
            if self.active_run_len() == 0 && self.active_run_bit() != value {
                self.set_active_run_bit(value);
            }
            if self.active_run_bit() == value {
                let room = RUN_LEN_MAX - self.active_run_len();
                let take = n.min(room);
                self.set_active_run_len(self.active_run_len() + take);
                n -= take;
            }
        }
        while n > 0 {
            self.open_marker();
            if value {
                self.set_active_run_bit(true);
            }
            let take = n.min(RUN_LEN_MAX);
            self.set_active_run_len(take);
            n -= take;
        }
    }

    /// Append one literal word without touching the length.
    fn push_literal(&mut self, word: u64) {
        let count = self.active_literal_count();
        if count >= LITERAL_COUNT_MAX {
            self.open_marker();
            self.set_active_literal_count(1);
        } else {
            self.set_active_literal_count(count + 1);
        }
        self.buffer.push(word);
    }

    /// Bulk literal append, splitting markers as capacity demands.
    fn splice_literals(&mut self, words: &[u64], negate: bool) {
        let mut rest = words;
        while !rest.is_empty() {
            if self.active_literal_count() >= LITERAL_COUNT_MAX {
                self.open_marker();
            }
            let count = self.active_literal_count();
            let room = (LITERAL_COUNT_MAX - count) as usize;
            let take = rest.len().min(room);
            self.set_active_literal_count(count + take as u64);
            if negate {
                self.buffer.extend(rest[..take].iter().map(|w| !w));
            } else {
                self.buffer.extend_from_slice(&rest[..take]);
            }
            rest = &rest[take..];
        }
    }

    /// Append `n` uniform words of `value`, advancing the length by
    /// `64 * n` bits. Runs coalesce with a compatible active marker and
    /// split across markers at run-length capacity.
    pub fn append_empty_words(&mut self, value: bool, n: u64) {
        self.push_empty_words(value, n);
        self.len_bits += 64 * n;
    }

    /// Append one literal word verbatim, advancing the length by 64 bits.
    pub fn append_literal_word(&mut self, word: u64) {
        self.push_literal(word);
        self.len_bits += 64;
    }

    /// Bulk-append literal words verbatim.
    pub fn append_literal_words(&mut self, words: &[u64]) {
        self.splice_literals(words, false);
        self.len_bits += 64 * words.len() as u64;
    }

    /// Bulk-append the complement of `words`.
    pub fn append_literal_words_negated(&mut self, words: &[u64]) {
        self.splice_literals(words, true);
        self.len_bits += 64 * words.len() as u64;
    }

    /// Append a full word, classifying it as a zero run, a ones run, or a
    /// literal.
    pub fn add_word(&mut self, word: u64) {
        self.add_word_partial(word, 64);
    }

    /// Append a word of which only the low `bits` count toward the
    /// length.
    ///
    /// A partial word (`bits < 64`) is only meaningful as the final word
    /// of the logical stream; appending more data after one leaves the
    /// skipped high bits inside the stream.
    pub fn add_word_partial(&mut self, word: u64, bits: u32) {
        debug_assert!(bits <= 64);
        match word {
            0 => self.push_empty_words(false, 1),
            u64::MAX => self.push_empty_words(true, 1),
            _ => self.push_literal(word),
        }
        self.len_bits += u64::from(bits);
    }

    /// Set the bit at position `i`.
    ///
    /// The builder is strictly append-only: returns `false` without
    /// modifying anything when `i` is below the current length.
    pub fn set(&mut self, i: u64) -> bool {
        if i < self.len_bits {
            return false;
        }
        // Words covered so far, a trailing partial word counting whole.
        let covered = (self.len_bits + 63) / 64;
        let dist = (i / 64 + 1) - covered;
        self.len_bits = i + 1;
        let bit = 1u64 << (i % 64);
        if dist > 0 {
            // The target word lies past every covered word.
            if dist > 1 {
                self.push_empty_words(false, dist - 1);
            }
            self.push_literal(bit);
            return true;
        }
        // The target word is the trailing partial word.
        if self.active_literal_count() == 0 {
            // It is the last word of the active run: carve it out as a
            // literal carrying the new bit.
            debug_assert!(self.active_run_len() > 0);
            self.set_active_run_len(self.active_run_len() - 1);
            self.push_literal(bit);
            return true;
        }
        let last = self.buffer.len() - 1;
        self.buffer[last] |= bit;
        if self.buffer[last] == u64::MAX {
            // The literal filled up: retract it so the ones run can
            // coalesce with a preceding one.
            self.buffer.pop();
            let count = self.active_literal_count();
            self.set_active_literal_count(count - 1);
            self.push_empty_words(true, 1);
        }
        true
    }

    /// Grow the logical length to `n` bits, filling new positions with
    /// `default`.
    ///
    /// Returns `false` without modifying anything when `n` is below the
    /// current length.
    pub fn set_len_bits(&mut self, n: u64, default: bool) -> bool {
        if n < self.len_bits {
            return false;
        }
        if default {
            // Fill the open partial word bit by bit, then whole words,
            // then the trailing partial bit by bit.
            while self.len_bits % 64 != 0 && self.len_bits < n {
                let next = self.len_bits;
                self.set(next);
            }
            let whole = n / 64 - self.len_bits / 64;
            self.append_empty_words(true, whole);
            while self.len_bits < n {
                let next = self.len_bits;
                self.set(next);
            }
            self.len_bits = n;
        } else {
            let covered = (self.len_bits + 63) / 64;
            let needed = (n + 63) / 64;
            self.push_empty_words(false, needed - covered);
            self.len_bits = n;
        }
        true
    }

    /// Complement the bitmap in place. The logical length is unchanged,
    /// so `cardinality` afterwards is `len_bits - cardinality` before.
    pub fn negate(&mut self) {
        let mut at = 0;
        loop {
            let m = self.buffer[at];
            let literals = marker::literal_count(m) as usize;
            marker::set_run_bit(&mut self.buffer[at], !marker::run_bit(m));
            let base = at + 1;
            for word in &mut self.buffer[base..base + literals] {
                *word = !*word;
            }
            let following = base + literals;
            if following < self.buffer.len() {
                at = following;
                continue;
            }
            // Last block: restore the zero padding past the length.
            let used = (self.len_bits % 64) as u32;
            if used == 0 {
                break;
            }
            let mask = u64::MAX >> (64 - used);
            if literals > 0 {
                self.buffer[base + literals - 1] &= mask;
            } else if marker::run_bit(self.buffer[at]) && marker::run_len(self.buffer[at]) > 0 {
                // The padding sits in the last word of a ones run: carve
                // that word out as a masked literal.
                let len = marker::run_len(self.buffer[at]);
                marker::set_run_len(&mut self.buffer[at], len - 1);
                self.push_literal(mask);
            }
            break;
        }
    }

    /// Number of set positions.
    pub fn cardinality(&self) -> u64 {
        let mut stream = MarkerStream::new(&self.buffer);
        let mut count = 0;
        while stream.has_next() {
            let m = stream.advance();
            if marker::run_bit(m) {
                count += 64 * marker::run_len(m);
            }
            let base = stream.literal_base();
            for &word in &self.buffer[base..base + marker::literal_count(m) as usize] {
                count += u64::from(word.count_ones());
            }
        }
        count
    }

    /// Bitwise AND with `other`, as a fresh bitmap. Neither operand is
    /// modified; the result's length is the larger of the two.
    pub fn and(&self, other: &Bitmap) -> Bitmap {
        ops::combine(self, other, Op::And)
    }

    /// Bitwise OR with `other`, as a fresh bitmap.
    pub fn or(&self, other: &Bitmap) -> Bitmap {
        ops::combine(self, other, Op::Or)
    }

    /// Bitwise XOR with `other`, as a fresh bitmap.
    pub fn xor(&self, other: &Bitmap) -> Bitmap {
        ops::combine(self, other, Op::Xor)
    }

    /// The positions of `self` that are not in `other`, as a fresh
    /// bitmap.
    pub fn and_not(&self, other: &Bitmap) -> Bitmap {
        ops::combine(self, other, Op::AndNot)
    }

    /// Whether `self` and `other` share at least one set position.
    ///
    /// Runs the AND walk without allocating and stops at the first
    /// shared position.
    pub fn intersects(&self, other: &Bitmap) -> bool {
        ops::intersects(self, other)
    }

    /// `cardinality(self AND other)` without materializing the result.
    pub fn and_cardinality(&self, other: &Bitmap) -> u64 {
        ops::combined_cardinality(self, other, Op::And)
    }

    /// `cardinality(self OR other)` without materializing the result.
    pub fn or_cardinality(&self, other: &Bitmap) -> u64 {
        ops::combined_cardinality(self, other, Op::Or)
    }

    /// `cardinality(self XOR other)` without materializing the result.
    pub fn xor_cardinality(&self, other: &Bitmap) -> u64 {
        ops::combined_cardinality(self, other, Op::Xor)
    }

    /// `cardinality(self AND NOT other)` without materializing the
    /// result.
    pub fn and_not_cardinality(&self, other: &Bitmap) -> u64 {
        ops::combined_cardinality(self, other, Op::AndNot)
    }

    /// OR together any number of bitmaps. No operands yields the empty
    /// bitmap.
    pub fn union_of<'a, I>(bitmaps: I) -> Bitmap
    where
        I: IntoIterator<Item = &'a Bitmap>,
    {
        ops::union_of(bitmaps)
    }

    /// AND together any number of bitmaps. No operands yields the empty
    /// bitmap.
    pub fn intersection_of<'a, I>(bitmaps: I) -> Bitmap
    where
        I: IntoIterator<Item = &'a Bitmap>,
    {
        ops::intersection_of(bitmaps)
    }

    /// Whether position `i` is set.
    ///
    /// This scans the blocks up to `i`; the structure has no random
    /// access index.
    pub fn contains(&self, i: u64) -> bool {
        if i >= self.len_bits {
            return false;
        }
        let target = i / 64;
        let mut stream = MarkerStream::new(&self.buffer);
        let mut word_at = 0;
        while stream.has_next() {
            let m = stream.advance();
            let run = marker::run_len(m);
            if target < word_at + run {
                return marker::run_bit(m);
            }
            word_at += run;
            let literals = marker::literal_count(m);
            if target < word_at + literals {
                let index = stream.literal_base() + (target - word_at) as usize;
                return self.buffer[index] & (1 << (i % 64)) != 0;
            }
            word_at += literals;
        }
        false
    }

    /// The smallest set position, if any.
    pub fn first(&self) -> Option<u64> {
        self.iter().next()
    }

    /// The largest set position, if any.
    pub fn last(&self) -> Option<u64> {
        if self.len_bits == 0 {
            return None;
        }
        let clip = self.len_bits - 1;
        let mut stream = MarkerStream::new(&self.buffer);
        let mut word_at = 0u64;
        let mut last = None;
        while stream.has_next() {
            let m = stream.advance();
            let run = marker::run_len(m);
            if marker::run_bit(m) && run > 0 {
                last = Some(((word_at + run) * 64 - 1).min(clip));
            }
            word_at += run;
            let base = stream.literal_base();
            for (k, &word) in self.buffer[base..base + marker::literal_count(m) as usize]
                .iter()
                .enumerate()
            {
                if word != 0 {
                    let top = 63 - u64::from(word.leading_zeros());
                    last = Some(((word_at + k as u64) * 64 + top).min(clip));
                }
            }
            word_at += marker::literal_count(m);
        }
        last
    }

    /// Reset to the empty bitmap, keeping the allocation.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.buffer.push(0);
        self.len_bits = 0;
        self.active_marker = 0;
    }

    /// Ascending iterator over the set positions.
    ///
    /// The iterator is single-pass; [`PositionIter::reset`] rewinds it.
    pub fn iter(&self) -> PositionIter<'_> {
        PositionIter::new(self)
    }

    /// Iterator over maximal stretches of consecutive set positions, as
    /// half-open `start..end` ranges.
    pub fn runs(&self) -> RunIter<'_> {
        RunIter::new(self)
    }

    /// The set positions, ascending.
    pub fn positions(&self) -> Vec<u64> {
        self.iter().collect()
    }

    /// Position-set equality: same logical length and same set positions,
    /// however the runs happen to be split.
    ///
    /// `==` compares buffer layout instead, so two logically identical
    /// bitmaps built along different paths may compare unequal there.
    pub fn logical_eq(&self, other: &Bitmap) -> bool {
        self.len_bits == other.len_bits && self.iter().eq(other.iter())
    }

    /// Serialize into `out` in the compact little-endian format.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), EwahError> {
        write::write_bitmap(self, out)
    }

    /// Serialize into a fresh byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EwahError> {
        write::bitmap_to_bytes(self)
    }

    /// Deserialize a bitmap from `input`.
    pub fn read_from<R: Read>(input: &mut R) -> Result<Bitmap, EwahError> {
        read::read_bitmap(input)
    }

    /// Deserialize a bitmap from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Bitmap, EwahError> {
        read::bitmap_from_bytes(bytes)
    }

    /// Assemble a bitmap from already-validated parts.
    pub(crate) fn from_raw_parts(buffer: Vec<u64>, len_bits: u64, active_marker: usize) -> Bitmap {
        debug_assert!(!buffer.is_empty());
        debug_assert!(active_marker < buffer.len());
        Bitmap {
            buffer,
            len_bits,
            active_marker,
        }
    }

    pub(crate) fn active_marker_index(&self) -> usize {
        self.active_marker
    }

    /// Overwrite the logical length. The combinator engine appends whole
    /// words and fixes the length up afterwards.
    pub(crate) fn force_len_bits(&mut self, n: u64) {
        self.len_bits = n;
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Bitmap::new()
    }
}

impl Extend<u64> for Bitmap {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        for position in iter {
            self.set(position);
        }
    }
}

impl FromIterator<u64> for Bitmap {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Bitmap::from_positions(iter)
    }
}

impl<'a> IntoIterator for &'a Bitmap {
    type Item = u64;
    type IntoIter = PositionIter<'a>;

    fn into_iter(self) -> PositionIter<'a> {
        self.iter()
    }
}

/// Structural equality over the buffer layout, not the position set. Two
/// logically identical bitmaps with different run splits compare unequal;
/// use [`Bitmap::logical_eq`] for position-set equality.
impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.len_bits == other.len_bits
            && self.active_marker == other.active_marker
            && self.buffer == other.buffer
    }
}

impl Eq for Bitmap {}

/// Karp-Rabin fold over the buffer words (32-bit halves, multiplier 31),
/// mixed with the length. Structurally equal bitmaps hash equal.
impl Hash for Bitmap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut fold: u32 = 0;
        for &word in &self.buffer {
            fold = fold.wrapping_mul(31).wrapping_add(word as u32);
            fold = fold.wrapping_mul(31).wrapping_add((word >> 32) as u32);
        }
        state.write_u64(self.len_bits ^ u64::from(fold));
    }
}

/// Structural dump: one line per marker, then each literal word in hex.
impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Bitmap: {} bits, {} words, active marker at {}",
            self.len_bits,
            self.buffer.len(),
            self.active_marker
        )?;
        let mut stream = MarkerStream::new(&self.buffer);
        while stream.has_next() {
            let at = stream.position();
            let m = stream.advance();
            writeln!(
                f,
                "  marker[{at}]: {} x {}, {} literals",
                marker::run_len(m),
                if marker::run_bit(m) { "ones" } else { "zeros" },
                marker::literal_count(m),
            )?;
            let base = stream.literal_base();
            for &word in &self.buffer[base..base + marker::literal_count(m) as usize] {
                writeln!(f, "    0x{word:016x}")?;
            }
        }
        Ok(())
    }
}

/// The position set, e.g. `{0, 2, 64}`.
impl fmt::Display for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, position) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{position}")?;
        }
        write!(f, "}}")
    }
}
