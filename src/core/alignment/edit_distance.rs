//! Levenshtein distance by dynamic programming - the reference the faster
//! filters are checked against.
//!
//! `ends_free = false` aligns the key end-to-end against the whole text.
//! `ends_free = true` is semi-global: the key must be fully aligned but leading
//! and trailing text is free, which is what candidate verification needs.
//!
//! Text end positions are exclusive offsets into the text.

use super::cigar::{CigarBuffer, CigarElement, CigarOp, CigarRange};
use super::workspace::with_workspace;
use crate::error::{Error, Result};

/// Result of an edit-distance alignment with traceback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditAlignment {
    pub distance: u64,
    pub text_begin: u64,
    pub text_end: u64,
    pub cigar: CigarRange,
}

#[inline(always)]
fn fill_matrix(dp: &mut [u32], key: &[u8], text: &[u8], ends_free: bool) {
    let cols = text.len() + 1;
    for j in 0..cols {
        dp[j] = if ends_free { 0 } else { j as u32 };
    }
    for i in 1..=key.len() {
        let row = i * cols;
        let prev = (i - 1) * cols;
        dp[row] = i as u32;
        let k = key[i - 1];
        for j in 1..cols {
            let sub = dp[prev + j - 1] + (k != text[j - 1]) as u32;
            let ins = dp[prev + j] + 1;
            let del = dp[row + j - 1] + 1;
            dp[row + j] = sub.min(ins).min(del);
        }
    }
}

/// Best end column in the last row; the leftmost one on ties.
fn best_end(last_row: &[u32], ends_free: bool) -> Option<(u32, usize)> {
    if !ends_free {
        return last_row.last().map(|&d| (d, last_row.len() - 1));
    }
    last_row
        .iter()
        .enumerate()
        .min_by_key(|&(j, &d)| (d, j))
        .map(|(j, &d)| (d, j))
}

/// Minimum number of edits aligning `key` against `text`.
///
/// Returns `(distance, text_end)`.
pub fn edit_distance(key: &[u8], text: &[u8], ends_free: bool) -> Result<(u64, u64)> {
    let cols = text.len() + 1;
    with_workspace(|ws| {
        let dp = ws.ensure_dp_matrix(key.len() + 1, cols);
        fill_matrix(dp, key, text, ends_free);
        let last_row = &dp[key.len() * cols..];
        best_end(last_row, ends_free)
            .map(|(d, j)| (d as u64, j as u64))
            .ok_or(Error::Unaligned)
    })
}

/// Edit distance plus traceback; the CIGAR is appended to `cigar_buffer`.
///
/// Ties prefer substitutions, then insertions, then deletions.
pub fn edit_distance_align(
    key: &[u8],
    text: &[u8],
    ends_free: bool,
    cigar_buffer: &mut CigarBuffer,
) -> Result<EditAlignment> {
    let cols = text.len() + 1;
    let (distance, text_begin, text_end, reversed) = with_workspace(|ws| {
        let dp = ws.ensure_dp_matrix(key.len() + 1, cols);
        fill_matrix(dp, key, text, ends_free);
        let (distance, end) =
            best_end(&dp[key.len() * cols..], ends_free).ok_or(Error::Unaligned)?;

        let mut reversed: Vec<CigarElement> = Vec::with_capacity(key.len() + 8);
        let (mut i, mut j) = (key.len(), end);
        while i > 0 || (j > 0 && !ends_free) {
            let here = dp[i * cols + j];
            if i > 0 && j > 0 {
                let mismatch = key[i - 1] != text[j - 1];
                if dp[(i - 1) * cols + j - 1] + mismatch as u32 == here {
                    reversed.push(if mismatch {
                        CigarElement::mismatch(text[j - 1])
                    } else {
                        CigarElement::new(CigarOp::Match, 1)
                    });
                    i -= 1;
                    j -= 1;
                    continue;
                }
            }
            if i > 0 && dp[(i - 1) * cols + j] + 1 == here {
                reversed.push(CigarElement::new(CigarOp::Insertion, 1));
                i -= 1;
            } else if j > 0 {
                reversed.push(CigarElement::new(CigarOp::Deletion, 1));
                j -= 1;
            } else {
                return Err(Error::Unaligned);
            }
        }
        Ok((distance as u64, j as u64, end as u64, reversed))
    })?;

    cigar_buffer.begin_range();
    for element in reversed.iter().rev() {
        cigar_buffer.append_element(*element);
    }
    let cigar = cigar_buffer.finish_range();
    Ok(EditAlignment {
        distance,
        text_begin,
        text_end,
        cigar,
    })
}

/// Check that `cigar` reproduces `key` against `text` starting at
/// `text_offset`. Used by debug checks and tests.
pub fn alignment_check(key: &[u8], text: &[u8], text_offset: usize, cigar: &[CigarElement]) -> bool {
    let (mut k, mut t) = (0usize, text_offset);
    for element in cigar {
        let len = element.length as usize;
        match element.op {
            CigarOp::Match => {
                if k + len > key.len() || t + len > text.len() {
                    return false;
                }
                if key[k..k + len] != text[t..t + len] {
                    log::debug!("alignment_check: match run differs at key {} text {}", k, t);
                    return false;
                }
                k += len;
                t += len;
            }
            CigarOp::Mismatch => {
                if k >= key.len() || t >= text.len() {
                    return false;
                }
                if key[k] == text[t] || text[t] != element.mismatch {
                    log::debug!("alignment_check: bad mismatch at key {} text {}", k, t);
                    return false;
                }
                k += 1;
                t += 1;
            }
            CigarOp::Insertion | CigarOp::SoftClip => {
                k += len;
                if k > key.len() {
                    return false;
                }
            }
            CigarOp::Deletion => {
                t += len;
                if t > text.len() {
                    return false;
                }
            }
        }
    }
    k == key.len()
}
