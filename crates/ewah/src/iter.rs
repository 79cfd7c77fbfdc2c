//! Lazy ascending iteration over set positions.

use crate::bitmap::Bitmap;
use crate::cursor::MarkerStream;
use crate::marker;

/// Ascending iterator over the set positions of a bitmap.
///
/// Positions are prefetched into a small buffer one 64-bit word at a
/// time, so even a ones run spanning millions of words is walked in
/// constant memory. The iterator is single-pass; [`reset`] rewinds it
/// for reuse. Holding it borrows the bitmap, which keeps the buffer
/// immutable for the iterator's lifetime.
///
/// [`reset`]: PositionIter::reset
pub struct PositionIter<'a> {
    words: &'a [u64],
    len_bits: u64,
    stream: MarkerStream<'a>,
    /// Words left in the current block's run.
    run_words: u64,
    run_bit: bool,
    /// Literal words left in the current block, and the next one's index.
    literal_words: u64,
    literal_next: usize,
    /// Bit offset of the next unconsumed word.
    pos: u64,
    /// Prefetched positions, drained front to back.
    pending: Vec<u64>,
    pending_next: usize,
}

impl<'a> PositionIter<'a> {
    pub(crate) fn new(bitmap: &'a Bitmap) -> Self {
        let words = bitmap.words();
        PositionIter {
            words,
            len_bits: bitmap.len_bits(),
            stream: MarkerStream::new(words),
            run_words: 0,
            run_bit: false,
            literal_words: 0,
            literal_next: 0,
            pos: 0,
            pending: Vec::with_capacity(64),
            pending_next: 0,
        }
    }

    /// Rewind to the first position.
    pub fn reset(&mut self) {
        self.stream = MarkerStream::new(self.words);
        self.run_words = 0;
        self.run_bit = false;
        self.literal_words = 0;
        self.literal_next = 0;
        self.pos = 0;
        self.pending.clear();
        self.pending_next = 0;
    }

    /// Refill the prefetch buffer. Returns `false` when the bitmap is
    /// exhausted.
    fn refill(&mut self) -> bool {
        self.pending.clear();
        self.pending_next = 0;
        while self.pending.is_empty() {
            if self.run_words > 0 {
                if self.run_bit {
                    // One run word per pass keeps the buffer small.
                    for k in 0..64 {
                        let position = self.pos + k;
                        if position < self.len_bits {
                            self.pending.push(position);
                        }
                    }
                    self.pos += 64;
                    self.run_words -= 1;
                } else {
                    self.pos += 64 * self.run_words;
                    self.run_words = 0;
                }
                continue;
            }
            if self.literal_words > 0 {
                let mut word = self.words[self.literal_next];
                while word != 0 {
                    let k = u64::from(word.trailing_zeros());
                    word &= word - 1;
                    let position = self.pos + k;
                    if position < self.len_bits {
                        self.pending.push(position);
                    }
                }
                self.pos += 64;
                self.literal_next += 1;
                self.literal_words -= 1;
                continue;
            }
            if !self.stream.has_next() {
                return false;
            }
            let m = self.stream.advance();
            self.run_bit = marker::run_bit(m);
            self.run_words = marker::run_len(m);
            self.literal_words = marker::literal_count(m);
            self.literal_next = self.stream.literal_base();
        }
        true
    }
}

impl Iterator for PositionIter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.pending_next >= self.pending.len() && !self.refill() {
            return None;
        }
        let position = self.pending[self.pending_next];
        self.pending_next += 1;
        Some(position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // At least the prefetched positions remain; the rest of the
        // stream is unknown without decompressing it.
        (self.pending.len() - self.pending_next, None)
    }
}

impl std::iter::FusedIterator for PositionIter<'_> {}

/// Iterator over maximal stretches of consecutive set positions, as
/// half-open `start..end` ranges.
///
/// Runs are assembled at word granularity: a ones run of any length
/// contributes one span, and set-bit groups inside literal words are
/// merged with their neighbors across word boundaries.
pub struct RunIter<'a> {
    words: &'a [u64],
    len_bits: u64,
    stream: MarkerStream<'a>,
    run_words: u64,
    run_bit: bool,
    literal_words: u64,
    literal_next: usize,
    /// Bit offset of the next unconsumed word.
    pos: u64,
    /// Span still growing; it closes when the stream stops extending it.
    open: Option<std::ops::Range<u64>>,
    /// Completed spans ready to yield, drained front to back.
    pending: Vec<std::ops::Range<u64>>,
    pending_next: usize,
    exhausted: bool,
}

impl<'a> RunIter<'a> {
    pub(crate) fn new(bitmap: &'a Bitmap) -> Self {
        let words = bitmap.words();
        RunIter {
            words,
            len_bits: bitmap.len_bits(),
            stream: MarkerStream::new(words),
            run_words: 0,
            run_bit: false,
            literal_words: 0,
            literal_next: 0,
            pos: 0,
            open: None,
            pending: Vec::new(),
            pending_next: 0,
            exhausted: false,
        }
    }

    /// Grow the open span or close it and open a new one.
    fn push_span(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        match self.open.take() {
            Some(mut span) if span.end == start => {
                span.end = end;
                self.open = Some(span);
            }
            Some(span) => {
                self.pending.push(span);
                self.open = Some(start..end);
            }
            None => self.open = Some(start..end),
        }
    }

    /// Process words until a span completes or the stream ends.
    fn refill(&mut self) {
        self.pending.clear();
        self.pending_next = 0;
        while self.pending.is_empty() {
            if self.run_words > 0 {
                let span_bits = 64 * self.run_words;
                if self.run_bit {
                    let start = self.pos;
                    let end = (self.pos + span_bits).min(self.len_bits);
                    self.push_span(start, end);
                } else if let Some(span) = self.open.take() {
                    self.pending.push(span);
                }
                self.pos += span_bits;
                self.run_words = 0;
                continue;
            }
            if self.literal_words > 0 {
                let mut word = self.words[self.literal_next];
                let base = self.pos;
                while word != 0 {
                    let low = u64::from(word.trailing_zeros());
                    let ones = u64::from((word >> low).trailing_ones());
                    let start = base + low;
                    if start >= self.len_bits {
                        break;
                    }
                    self.push_span(start, (start + ones).min(self.len_bits));
                    if low + ones >= 64 {
                        break;
                    }
                    word &= !(((1 << ones) - 1) << low);
                }
                self.pos += 64;
                self.literal_next += 1;
                self.literal_words -= 1;
                continue;
            }
            if !self.stream.has_next() {
                self.exhausted = true;
                return;
            }
            let m = self.stream.advance();
            self.run_bit = marker::run_bit(m);
            self.run_words = marker::run_len(m);
            self.literal_words = marker::literal_count(m);
            self.literal_next = self.stream.literal_base();
        }
    }
}

impl Iterator for RunIter<'_> {
    type Item = std::ops::Range<u64>;

    fn next(&mut self) -> Option<std::ops::Range<u64>> {
        loop {
            if self.pending_next < self.pending.len() {
                let span = self.pending[self.pending_next].clone();
                self.pending_next += 1;
                return Some(span);
            }
            if self.exhausted {
                return self.open.take();
            }
            self.refill();
        }
    }
}

impl std::iter::FusedIterator for RunIter<'_> {}
