//! Bit-parallel Myers (BPM) edit distance.
//!
//! The key is compiled once into PEQ bitmaps, one 64-bit word per 64 key
//! bases and per symbol. Each text symbol then advances the whole DP column
//! in `ceil(m/64)` word operations, carrying horizontal deltas between words.
//! The first row is free (semi-global): any text position may start the
//! alignment.
//!
//! Bits past the end of the key are padded with ones in every PEQ word. The
//! automaton only propagates information towards higher bits, so padding
//! cannot influence the score read at bit `m-1`.

use super::types::{ALIGN_COLUMN_INF, ALIGN_DISTANCE_INF};
use super::workspace::with_workspace;
use crate::core::dna::DNA_RANGE;

pub const BPM_WORD_LENGTH: usize = 64;
const BPM_HIGH_BIT: u64 = 1 << 63;

/// Columns between two early-termination checks
const BPM_CUTOFF_INTERVAL: usize = 8;

/// Compiled key: PEQ bitmaps laid out word-major (`peq[word * DNA_RANGE + symbol]`)
#[derive(Debug, Clone)]
pub struct BpmPattern {
    pattern_length: usize,
    num_words: usize,
    peq: Vec<u64>,
}

impl BpmPattern {
    /// Build the PEQ bitmaps of an encoded key.
    ///
    /// Bit `i` of `peq[w][c]` is set iff `key[w*64 + i] == c`, so N in the key
    /// matches N in the text, exactly like the DP reference.
    pub fn compile(key: &[u8]) -> Self {
        let pattern_length = key.len();
        let num_words = pattern_length.div_ceil(BPM_WORD_LENGTH).max(1);
        let mut peq = vec![0u64; num_words * DNA_RANGE];
        for (i, &c) in key.iter().enumerate() {
            let symbol = (c as usize).min(DNA_RANGE - 1);
            peq[(i / BPM_WORD_LENGTH) * DNA_RANGE + symbol] |= 1u64 << (i % BPM_WORD_LENGTH);
        }
        let used = pattern_length % BPM_WORD_LENGTH;
        if used != 0 || pattern_length == 0 {
            let padding = !0u64 << used;
            let last = (num_words - 1) * DNA_RANGE;
            for word in &mut peq[last..last + DNA_RANGE] {
                *word |= padding;
            }
        }
        Self {
            pattern_length,
            num_words,
            peq,
        }
    }

    pub fn pattern_length(&self) -> usize {
        self.pattern_length
    }

    pub fn num_words(&self) -> usize {
        self.num_words
    }

    pub fn peq(&self) -> &[u64] {
        &self.peq
    }

    /// Best `(distance, end_column)` over the whole text, no error bound
    pub fn scan_min(&self, text: &[u8]) -> (u64, u64) {
        bpm_compute(&self.peq, self.pattern_length, text, u64::MAX)
    }

    /// Best `(distance, end_column)` if it is within `max_error`, otherwise
    /// `(ALIGN_DISTANCE_INF, ALIGN_COLUMN_INF)`
    pub fn verify(&self, text: &[u8], max_error: u64) -> (u64, u64) {
        bpm_compute(&self.peq, self.pattern_length, text, max_error)
    }
}

/// Advance one 64-row block by one text column.
///
/// `hin` is the horizontal delta entering the block from above; the return
/// value is the delta leaving it at the row selected by `out_mask`.
#[inline(always)]
fn advance_block(pv: &mut u64, mv: &mut u64, eq: u64, hin: i32, out_mask: u64) -> i32 {
    let mut eq = eq;
    let xv = eq | *mv;
    if hin < 0 {
        eq |= 1;
    }
    let xh = ((eq & *pv).wrapping_add(*pv) ^ *pv) | eq;
    let mut ph = *mv | !(xh | *pv);
    let mut mh = *pv & xh;

    let hout = if ph & out_mask != 0 {
        1
    } else if mh & out_mask != 0 {
        -1
    } else {
        0
    };

    ph <<= 1;
    mh <<= 1;
    if hin < 0 {
        mh |= 1;
    } else if hin > 0 {
        ph |= 1;
    }
    *pv = mh | !(xv | ph);
    *mv = ph & xv;
    hout
}

/// Run the automaton over `text` for a PEQ table in word-major layout.
///
/// Returns the minimum distance at the last key row and the first (inclusive)
/// text column reaching it. With a finite `max_error` the scan stops as soon
/// as the remaining columns cannot bring the score within bound, and an
/// out-of-bound minimum is reported as `ALIGN_DISTANCE_INF`.
pub fn bpm_compute(peq: &[u64], pattern_length: usize, text: &[u8], max_error: u64) -> (u64, u64) {
    if pattern_length == 0 {
        return (0, if text.is_empty() { ALIGN_COLUMN_INF } else { 0 });
    }
    let num_words = pattern_length.div_ceil(BPM_WORD_LENGTH);
    debug_assert!(peq.len() >= num_words * DNA_RANGE);
    let last_mask = 1u64 << ((pattern_length - 1) % BPM_WORD_LENGTH);
    let bounded = max_error != u64::MAX;

    let (min_distance, min_column) = with_workspace(|ws| {
        let (pv, mv) = ws.ensure_bpm_state(num_words);
        let mut score = pattern_length as i64;
        let mut min_distance = pattern_length as i64;
        let mut min_column = ALIGN_COLUMN_INF;

        for (column, &c) in text.iter().enumerate() {
            let symbol = (c as usize).min(DNA_RANGE - 1);
            let mut hin = 0i32;
            for w in 0..num_words {
                let mask = if w + 1 == num_words { last_mask } else { BPM_HIGH_BIT };
                hin = advance_block(&mut pv[w], &mut mv[w], peq[w * DNA_RANGE + symbol], hin, mask);
            }
            score += hin as i64;
            if score < min_distance {
                min_distance = score;
                min_column = column as u64;
            }
            if bounded && column % BPM_CUTOFF_INTERVAL == BPM_CUTOFF_INTERVAL - 1 {
                let remaining = (text.len() - column - 1) as i64;
                if min_distance > max_error as i64 && score - remaining > max_error as i64 {
                    log::trace!("bpm: early cutoff at column {} (score {})", column, score);
                    break;
                }
            }
        }
        (min_distance as u64, min_column)
    });

    if bounded && min_distance > max_error {
        (ALIGN_DISTANCE_INF, ALIGN_COLUMN_INF)
    } else {
        (min_distance, min_column)
    }
}

/// One-shot bounded verification of an encoded key against a text span
pub fn bpm_verify(key: &[u8], text: &[u8], max_error: u64) -> (u64, u64) {
    BpmPattern::compile(key).verify(text, max_error)
}
