//! Smith-Waterman-Gotoh (gap-affine) alignment with traceback.
//!
//! Two modes:
//! - [`SwgMode::Global`]: the key is aligned end-to-end, leading and trailing
//!   text are free (the candidate text carries error flanks on both sides).
//! - [`SwgMode::Local`]: best-scoring interior alignment; unaligned key ends
//!   become soft clips.
//!
//! A gap of length `L` scores `gap_open_score + L * gap_extension_score`.

use super::cigar::{CigarBuffer, CigarElement, CigarOp, CigarRange};
use super::workspace::with_workspace;
use crate::core::dna::DNA_RANGE;
use crate::error::{Error, Result};

const SCORE_NEG_INF: i32 = i32::MIN / 4;

/// Gap-affine scoring model
#[derive(Debug, Clone, PartialEq)]
pub struct SwgPenalties {
    /// Substitution score, indexed `[key symbol][text symbol]`
    pub matching_score: [[i32; DNA_RANGE]; DNA_RANGE],
    pub generic_match_score: i32,
    pub generic_mismatch_score: i32,
    pub gap_open_score: i32,
    pub gap_extension_score: i32,
}

impl Default for SwgPenalties {
    fn default() -> Self {
        let mut penalties = Self {
            matching_score: [[0; DNA_RANGE]; DNA_RANGE],
            generic_match_score: 1,
            generic_mismatch_score: -4,
            gap_open_score: -6,
            gap_extension_score: -1,
        };
        penalties.rebuild_matrix();
        penalties
    }
}

impl SwgPenalties {
    /// Refill the substitution matrix from the generic scores. N never matches.
    fn rebuild_matrix(&mut self) {
        for a in 0..DNA_RANGE {
            for b in 0..DNA_RANGE {
                self.matching_score[a][b] = if a == b && a < DNA_RANGE - 1 {
                    self.generic_match_score
                } else {
                    self.generic_mismatch_score
                };
            }
        }
    }

    pub fn configure_match_score(&mut self, match_score: i32) {
        self.generic_match_score = match_score;
        self.rebuild_matrix();
    }

    /// Accepts the penalty as a positive number
    pub fn configure_mismatch_penalty(&mut self, mismatch_penalty: i32) {
        self.generic_mismatch_score = -mismatch_penalty.abs();
        self.rebuild_matrix();
    }

    /// Accepts both penalties as positive numbers
    pub fn configure_gap_penalties(&mut self, gap_open_penalty: i32, gap_extension_penalty: i32) {
        self.gap_open_score = -gap_open_penalty.abs();
        self.gap_extension_score = -gap_extension_penalty.abs();
    }

    #[inline(always)]
    pub fn score(&self, key: u8, text: u8) -> i32 {
        self.matching_score[(key as usize).min(DNA_RANGE - 1)][(text as usize).min(DNA_RANGE - 1)]
    }

    #[inline]
    pub fn gap_score(&self, length: u32) -> i32 {
        self.gap_open_score + length as i32 * self.gap_extension_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwgMode {
    #[default]
    Global,
    Local,
}

/// Outcome of one SWG alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwgAlignment {
    pub score: i32,
    pub key_begin: usize,
    pub key_end: usize,
    pub text_begin: u64,
    pub text_end: u64,
    pub cigar: CigarRange,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TraceState {
    H,
    E,
    F,
}

/// Align an encoded key against an encoded text, appending the CIGAR to
/// `cigar_buffer`.
pub fn swg_align(
    key: &[u8],
    text: &[u8],
    penalties: &SwgPenalties,
    mode: SwgMode,
    cigar_buffer: &mut CigarBuffer,
) -> Result<SwgAlignment> {
    let rows = key.len() + 1;
    let cols = text.len() + 1;
    let local = mode == SwgMode::Local;
    let open_ext = penalties.gap_open_score + penalties.gap_extension_score;
    let ext = penalties.gap_extension_score;

    let traced = with_workspace(|ws| {
        let (h, e, f) = ws.ensure_swg_matrices(rows, cols);
        for j in 0..cols {
            h[j] = 0;
            e[j] = SCORE_NEG_INF;
            f[j] = SCORE_NEG_INF;
        }
        for i in 1..rows {
            let row = i * cols;
            if local {
                h[row] = 0;
                f[row] = SCORE_NEG_INF;
            } else {
                h[row] = penalties.gap_score(i as u32);
                f[row] = h[row];
            }
            e[row] = SCORE_NEG_INF;
        }

        let mut best = (if local { 0 } else { SCORE_NEG_INF }, 0usize, 0usize);
        for i in 1..rows {
            let row = i * cols;
            let prev = (i - 1) * cols;
            let k = key[i - 1];
            for j in 1..cols {
                e[row + j] = (h[row + j - 1] + open_ext).max(e[row + j - 1] + ext);
                f[row + j] = (h[prev + j] + open_ext).max(f[prev + j] + ext);
                let diag = h[prev + j - 1] + penalties.score(k, text[j - 1]);
                let mut score = diag.max(e[row + j]).max(f[row + j]);
                if local {
                    score = score.max(0);
                    if score > best.0 {
                        best = (score, i, j);
                    }
                }
                h[row + j] = score;
            }
        }
        if !local {
            let last = (rows - 1) * cols;
            for j in 0..cols {
                if h[last + j] > best.0 {
                    best = (h[last + j], rows - 1, j);
                }
            }
        }

        // Traceback
        let (score, end_i, end_j) = best;
        let mut reversed: Vec<CigarElement> = Vec::with_capacity(key.len() + 8);
        let (mut i, mut j) = (end_i, end_j);
        let mut state = TraceState::H;
        loop {
            match state {
                TraceState::H => {
                    let here = h[i * cols + j];
                    if i == 0 || (local && here == 0) {
                        break;
                    }
                    if j > 0
                        && h[(i - 1) * cols + j - 1] + penalties.score(key[i - 1], text[j - 1])
                            == here
                    {
                        reversed.push(if key[i - 1] == text[j - 1] {
                            CigarElement::new(CigarOp::Match, 1)
                        } else {
                            CigarElement::mismatch(text[j - 1])
                        });
                        i -= 1;
                        j -= 1;
                    } else if here == f[i * cols + j] {
                        state = TraceState::F;
                    } else if j > 0 && here == e[i * cols + j] {
                        state = TraceState::E;
                    } else {
                        return Err(Error::Unaligned);
                    }
                }
                TraceState::F => {
                    let here = f[i * cols + j];
                    reversed.push(CigarElement::new(CigarOp::Insertion, 1));
                    let opened = h[(i - 1) * cols + j] + open_ext == here;
                    i -= 1;
                    if opened || i == 0 {
                        state = TraceState::H;
                    }
                }
                TraceState::E => {
                    let here = e[i * cols + j];
                    reversed.push(CigarElement::new(CigarOp::Deletion, 1));
                    let opened = h[i * cols + j - 1] + open_ext == here;
                    j -= 1;
                    if opened || j == 0 {
                        state = TraceState::H;
                    }
                }
            }
        }
        Ok((score, i, j, end_i, end_j, reversed))
    })?;

    let (score, key_begin, text_begin, key_end, text_end, reversed) = traced;
    cigar_buffer.begin_range();
    if key_begin > 0 {
        cigar_buffer.append_soft_clip(key_begin as u32);
    }
    for element in reversed.iter().rev() {
        cigar_buffer.append_element(*element);
    }
    if key_end < key.len() {
        cigar_buffer.append_soft_clip((key.len() - key_end) as u32);
    }
    let cigar = cigar_buffer.finish_range();
    log::trace!(
        "swg {:?}: score {} key [{},{}) text [{},{})",
        mode,
        score,
        key_begin,
        key_end,
        text_begin,
        text_end
    );
    Ok(SwgAlignment {
        score,
        key_begin,
        key_end,
        text_begin: text_begin as u64,
        text_end: text_end as u64,
        cigar,
    })
}

/// Gap-affine score of an existing CIGAR placed at `text_offset`.
/// Soft clips score zero.
pub fn swg_score_cigar(
    penalties: &SwgPenalties,
    key: &[u8],
    text: &[u8],
    text_offset: usize,
    cigar: &[CigarElement],
) -> i32 {
    let (mut k, mut t) = (0usize, text_offset);
    let mut score = 0i32;
    let mut i = 0;
    while i < cigar.len() {
        let element = cigar[i];
        let len = element.length as usize;
        match element.op {
            CigarOp::Match | CigarOp::Mismatch => {
                for _ in 0..len {
                    if k < key.len() && t < text.len() {
                        score += penalties.score(key[k], text[t]);
                    }
                    k += 1;
                    t += 1;
                }
            }
            CigarOp::SoftClip => k += len,
            CigarOp::Insertion | CigarOp::Deletion => {
                let mut gap = element.length;
                while i + 1 < cigar.len() && cigar[i + 1].op == element.op {
                    i += 1;
                    gap += cigar[i].length;
                }
                score += penalties.gap_score(gap);
                if element.op == CigarOp::Insertion {
                    k += gap as usize;
                } else {
                    t += gap as usize;
                }
            }
        }
        i += 1;
    }
    score
}
