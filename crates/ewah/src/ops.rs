//! Pairwise set algebra over compressed bitmaps.
//!
//! All combinators share one two-cursor loop. Each iteration picks the
//! operand whose current block has fewer uncompressed words left as the
//! prey and consumes that whole block: its run short-circuits where the
//! truth table allows (a zero run under AND, a ones run under OR),
//! otherwise the predator's words dominate the output and are spliced
//! through. The predator's leftover run is then played against the
//! prey's literals, and finally literals combine word by word. Emission
//! goes through a sink so `intersects` can run the same walk without
//! allocating and stop at the first one bit.

use crate::bitmap::Bitmap;
use crate::cursor::{MarkerStream, PendingBlock};

/// The four pairwise combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    And,
    Or,
    Xor,
    /// `a & !b`, realized as AND with the `b` side complemented on load.
    AndNot,
}

impl Op {
    /// Truth table actually driving the loop; AND-NOT is AND over the
    /// virtually complemented second operand.
    fn effective(self) -> Op {
        match self {
            Op::AndNot => Op::And,
            op => op,
        }
    }
}

/// Receiver for the uncompressed word stream a combinator emits.
///
/// Every method returns `false` to stop the walk early.
pub(crate) trait WordSink {
    /// `n` uniform words of `value`.
    fn empty_words(&mut self, value: bool, n: u64) -> bool;
    /// Literal words spliced from an operand, complemented when `negate`.
    fn literal_words(&mut self, words: &[u64], negate: bool) -> bool;
    /// One combined word, to be classified as run or literal.
    fn word(&mut self, word: u64) -> bool;
}

impl WordSink for Bitmap {
    fn empty_words(&mut self, value: bool, n: u64) -> bool {
        self.append_empty_words(value, n);
        true
    }

    fn literal_words(&mut self, words: &[u64], negate: bool) -> bool {
        if negate {
            self.append_literal_words_negated(words);
        } else {
            self.append_literal_words(words);
        }
        true
    }

    fn word(&mut self, word: u64) -> bool {
        self.add_word(word);
        true
    }
}

/// Sink for `intersects`: remembers whether any one bit was emitted and
/// halts the walk as soon as one is.
struct OneProbe {
    hit: bool,
}

impl WordSink for OneProbe {
    fn empty_words(&mut self, value: bool, n: u64) -> bool {
        if value && n > 0 {
            self.hit = true;
        }
        !self.hit
    }

    fn literal_words(&mut self, words: &[u64], negate: bool) -> bool {
        for &word in words {
            let word = if negate { !word } else { word };
            if word != 0 {
                self.hit = true;
                return false;
            }
        }
        true
    }

    fn word(&mut self, word: u64) -> bool {
        if word != 0 {
            self.hit = true;
        }
        !self.hit
    }
}

/// Sink for the `*_cardinality` queries: counts emitted one bits
/// without materializing the result.
struct CountSink {
    ones: u64,
}

impl WordSink for CountSink {
    fn empty_words(&mut self, value: bool, n: u64) -> bool {
        if value {
            self.ones += 64 * n;
        }
        true
    }

    fn literal_words(&mut self, words: &[u64], negate: bool) -> bool {
        for &word in words {
            let word = if negate { !word } else { word };
            self.ones += u64::from(word.count_ones());
        }
        true
    }

    fn word(&mut self, word: u64) -> bool {
        self.ones += u64::from(word.count_ones());
        true
    }
}

/// Which operand ran out of markers first.
enum Exhausted {
    A,
    B,
}

/// Combine two bitmaps into a fresh one.
pub(crate) fn combine(a: &Bitmap, b: &Bitmap, op: Op) -> Bitmap {
    // AND can only shrink the larger operand; OR and XOR can interleave
    // blocks from both.
    let hint = match op {
        Op::And | Op::AndNot => a.word_count().max(b.word_count()),
        Op::Or | Op::Xor => a.word_count() + b.word_count(),
    };
    let mut out = Bitmap::with_capacity(hint);
    walk(a, b, op, &mut out);
    out.force_len_bits(a.len_bits().max(b.len_bits()));
    out
}

/// Whether the two bitmaps share a set position. Allocation-free.
pub(crate) fn intersects(a: &Bitmap, b: &Bitmap) -> bool {
    let mut probe = OneProbe { hit: false };
    walk(a, b, Op::And, &mut probe);
    probe.hit
}

/// Cardinality of `combine(a, b, op)` without building the result.
pub(crate) fn combined_cardinality(a: &Bitmap, b: &Bitmap, op: Op) -> u64 {
    let mut count = CountSink { ones: 0 };
    walk(a, b, op, &mut count);
    count.ones
}

/// OR together any number of bitmaps.
///
/// Operands are folded smallest-first so intermediate results stay
/// small for as long as possible.
pub(crate) fn union_of<'a, I>(bitmaps: I) -> Bitmap
where
    I: IntoIterator<Item = &'a Bitmap>,
{
    fold_sorted_by_size(bitmaps, Op::Or)
}

/// AND together any number of bitmaps. No operands yields the empty
/// bitmap.
pub(crate) fn intersection_of<'a, I>(bitmaps: I) -> Bitmap
where
    I: IntoIterator<Item = &'a Bitmap>,
{
    fold_sorted_by_size(bitmaps, Op::And)
}

fn fold_sorted_by_size<'a, I>(bitmaps: I, op: Op) -> Bitmap
where
    I: IntoIterator<Item = &'a Bitmap>,
{
    let mut operands: Vec<&Bitmap> = bitmaps.into_iter().collect();
    operands.sort_by_key(|bm| bm.size_in_bytes());
    let mut operands = operands.into_iter();
    let first = match operands.next() {
        Some(bm) => bm.clone(),
        None => return Bitmap::new(),
    };
    operands.fold(first, |acc, bm| combine(&acc, bm, op))
}

/// The shared two-cursor walk. Emits the uncompressed combination of
/// `a` and `b` into `sink`, stopping early if the sink asks.
fn walk<S: WordSink>(a: &Bitmap, b: &Bitmap, op: Op, sink: &mut S) {
    let a_words = a.words();
    let b_words = b.words();
    let mut ia = MarkerStream::new(a_words);
    let mut ib = MarkerStream::new(b_words);
    // A buffer always opens with a marker, so the first advance is safe.
    ia.advance();
    ib.advance();
    let mut ra = PendingBlock::load(&ia);
    let mut rb = PendingBlock::load(&ib);
    if op == Op::AndNot {
        rb.invert_run();
    }
    let eff = op.effective();

    let exhausted = loop {
        let a_is_prey = ra.size() < rb.size();
        let (prey, pred, prey_words, pred_words, prey_neg, pred_neg) = if a_is_prey {
            (&mut ra, &mut rb, a_words, b_words, false, op == Op::AndNot)
        } else {
            (&mut rb, &mut ra, b_words, a_words, op == Op::AndNot, false)
        };

        // 1. The prey's run. Either the run value decides the output by
        // itself, or the predator's next `run` words dominate.
        let run = prey.run_len();
        if run > 0 {
            let short_circuit = match eff {
                Op::And => !prey.run_bit(),
                Op::Or => prey.run_bit(),
                _ => false,
            };
            if short_circuit {
                let fill = matches!(eff, Op::Or);
                if !sink.empty_words(fill, run) {
                    return;
                }
            } else {
                // XOR against a ones run complements the predator.
                let complement = eff == Op::Xor && prey.run_bit();
                let from_run = run.min(pred.run_len());
                if from_run > 0 && !sink.empty_words(pred.run_bit() != complement, from_run) {
                    return;
                }
                let from_literals = (run - from_run) as usize;
                if from_literals > 0 {
                    let base = pred.literal_base();
                    let negate = pred_neg != complement;
                    if !sink.literal_words(&pred_words[base..base + from_literals], negate) {
                        return;
                    }
                }
            }
            pred.consume(run);
            prey.clear_run();
        }

        // 2. The predator's leftover run against the prey's literals.
        let pred_run = pred.run_len();
        if pred_run > 0 {
            let n = pred_run.min(prey.literal_count());
            if n > 0 {
                let base = prey.literal_base();
                let literals = &prey_words[base..base + n as usize];
                let keep = match (eff, pred.run_bit()) {
                    (Op::And, false) => sink.empty_words(false, n),
                    (Op::And, true) => sink.literal_words(literals, prey_neg),
                    (Op::Or, true) => sink.empty_words(true, n),
                    (Op::Or, false) => sink.literal_words(literals, prey_neg),
                    (Op::Xor, false) => sink.literal_words(literals, prey_neg),
                    (Op::Xor, true) => sink.literal_words(literals, !prey_neg),
                    (Op::AndNot, _) => unreachable!("AND-NOT runs as AND"),
                };
                if !keep {
                    return;
                }
                pred.consume(n);
                prey.consume(n);
            }
        }

        // 3. Literals against literals, through the classifying add.
        let n = prey.literal_count();
        if n > 0 {
            let prey_base = prey.literal_base();
            let pred_base = pred.literal_base();
            for j in 0..n as usize {
                let mut x = prey_words[prey_base + j];
                if prey_neg {
                    x = !x;
                }
                let mut y = pred_words[pred_base + j];
                if pred_neg {
                    y = !y;
                }
                let word = match eff {
                    Op::And => x & y,
                    Op::Or => x | y,
                    Op::Xor => x ^ y,
                    Op::AndNot => unreachable!("AND-NOT runs as AND"),
                };
                if !sink.word(word) {
                    return;
                }
            }
            pred.consume(n);
            prey.consume(n);
        }

        // 4. The prey's block is spent; refill it or finish.
        if a_is_prey {
            if !ia.has_next() {
                break Exhausted::A;
            }
            ia.advance();
            ra = PendingBlock::load(&ia);
        } else {
            if !ib.has_next() {
                break Exhausted::B;
            }
            ib.advance();
            rb = PendingBlock::load(&ib);
            if op == Op::AndNot {
                rb.invert_run();
            }
        }
    };

    // One side is out of markers; the exhausted side reads as zeros from
    // here on, which settles the rest of the output per combinator.
    match exhausted {
        Exhausted::A => match op {
            // 0 & b and a & !b with a = 0 are both all zeros.
            Op::And | Op::AndNot => drain_empty(&rb, &mut ib, sink),
            // 0 | b = b and 0 ^ b = b.
            Op::Or | Op::Xor => drain_copy(&rb, &mut ib, b_words, sink),
        },
        Exhausted::B => match op {
            Op::And => drain_empty(&ra, &mut ia, sink),
            // a & !0 = a, a | 0 = a, a ^ 0 = a.
            Op::AndNot | Op::Or | Op::Xor => drain_copy(&ra, &mut ia, a_words, sink),
        },
    }
}

/// Emit the remaining blocks of one side verbatim.
fn drain_copy<S: WordSink>(
    block: &PendingBlock,
    stream: &mut MarkerStream<'_>,
    words: &[u64],
    sink: &mut S,
) {
    let mut block = *block;
    loop {
        if block.run_len() > 0 && !sink.empty_words(block.run_bit(), block.run_len()) {
            return;
        }
        let n = block.literal_count() as usize;
        if n > 0 {
            let base = block.literal_base();
            if !sink.literal_words(&words[base..base + n], false) {
                return;
            }
        }
        if !stream.has_next() {
            return;
        }
        stream.advance();
        block = PendingBlock::load(stream);
    }
}

/// Emit zeros covering the remaining size of one side.
fn drain_empty<S: WordSink>(block: &PendingBlock, stream: &mut MarkerStream<'_>, sink: &mut S) {
    let mut n = block.size();
    while stream.has_next() {
        stream.advance();
        n += PendingBlock::load(stream).size();
    }
    if n > 0 {
        sink.empty_words(false, n);
    }
}

/// `&`, `|`, `^`, and `-` mirror [`Bitmap::and`], [`Bitmap::or`],
/// [`Bitmap::xor`], and [`Bitmap::and_not`].
impl std::ops::BitAnd for &Bitmap {
    type Output = Bitmap;

    fn bitand(self, other: &Bitmap) -> Bitmap {
        self.and(other)
    }
}

impl std::ops::BitOr for &Bitmap {
    type Output = Bitmap;

    fn bitor(self, other: &Bitmap) -> Bitmap {
        self.or(other)
    }
}

impl std::ops::BitXor for &Bitmap {
    type Output = Bitmap;

    fn bitxor(self, other: &Bitmap) -> Bitmap {
        self.xor(other)
    }
}

impl std::ops::Sub for &Bitmap {
    type Output = Bitmap;

    fn sub(self, other: &Bitmap) -> Bitmap {
        self.and_not(other)
    }
}
