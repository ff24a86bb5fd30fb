//! CIGAR storage - one append-only arena shared by every trace of a read.
//!
//! Traces never own their CIGAR. They hold a [`CigarRange`] (offset + length)
//! into a [`CigarBuffer`], which keeps insertion cheap and lets trace
//! metadata be copied freely. Runs are coalesced on append, but never across
//! the boundary of the range currently being built.
//!
//! Orientation follows SAM: an insertion consumes key bases only, a deletion
//! consumes text bases only, and the effective length of an alignment is the
//! number of text bases it spans.

use crate::core::dna::{dna_complement, dna_decode};
use std::fmt::Write;

/// CIGAR operation with zero-cost conversion to its text symbol
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CigarOp {
    Match = b'=',
    Mismatch = b'X',
    Insertion = b'I',
    Deletion = b'D',
    SoftClip = b'S',
}

impl CigarOp {
    #[inline(always)]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    #[inline(always)]
    pub const fn consumes_key(self) -> bool {
        matches!(self, Self::Match | Self::Mismatch | Self::Insertion | Self::SoftClip)
    }

    #[inline(always)]
    pub const fn consumes_text(self) -> bool {
        matches!(self, Self::Match | Self::Mismatch | Self::Deletion)
    }
}

/// One CIGAR run.
///
/// Mismatches always have length 1 and carry the text base they stand on
/// (encoded), so they are never coalesced.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CigarElement {
    pub op: CigarOp,
    pub length: u32,
    pub mismatch: u8,
}

impl CigarElement {
    pub const fn new(op: CigarOp, length: u32) -> Self {
        Self {
            op,
            length,
            mismatch: 0,
        }
    }

    pub const fn mismatch(base: u8) -> Self {
        Self {
            op: CigarOp::Mismatch,
            length: 1,
            mismatch: base,
        }
    }

    /// Text bases spanned by this element
    #[inline]
    pub fn effective_length(&self) -> u64 {
        if self.op.consumes_text() {
            self.length as u64
        } else {
            0
        }
    }
}

/// Location of one CIGAR inside a [`CigarBuffer`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct CigarRange {
    pub offset: usize,
    pub length: usize,
}

impl CigarRange {
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Append-only CIGAR arena
#[derive(Debug, Clone, Default)]
pub struct CigarBuffer {
    elements: Vec<CigarElement>,
    open_start: usize,
}

impl CigarBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elements: Vec::with_capacity(capacity),
            open_start: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.open_start = 0;
    }

    pub fn reserve(&mut self, additional: usize) {
        self.elements.reserve(additional);
    }

    /// Start a new range; later appends coalesce only within it.
    pub fn begin_range(&mut self) -> usize {
        self.open_start = self.elements.len();
        self.open_start
    }

    /// Close the range opened by [`begin_range`](Self::begin_range).
    pub fn finish_range(&mut self) -> CigarRange {
        let range = CigarRange {
            offset: self.open_start,
            length: self.elements.len() - self.open_start,
        };
        self.open_start = self.elements.len();
        range
    }

    /// Drop everything appended since the open range started.
    pub fn discard_range(&mut self) {
        self.elements.truncate(self.open_start);
    }

    /// Release a scratch range. Only the tail range can be released; anything
    /// else is left in place.
    pub fn release(&mut self, range: CigarRange) {
        if range.offset + range.length == self.elements.len() {
            self.elements.truncate(range.offset);
            self.open_start = self.open_start.min(range.offset);
        }
    }

    pub fn get(&self, range: CigarRange) -> &[CigarElement] {
        &self.elements[range.offset..range.offset + range.length]
    }

    /// Copy a finished CIGAR into the arena as its own range.
    pub fn append_slice(&mut self, cigar: &[CigarElement]) -> CigarRange {
        self.begin_range();
        for element in cigar {
            self.append_element(*element);
        }
        self.finish_range()
    }

    /// Append any element, coalescing with the previous run of the same op.
    pub fn append_element(&mut self, element: CigarElement) {
        if element.length == 0 {
            return;
        }
        if element.op != CigarOp::Mismatch && self.elements.len() > self.open_start {
            if let Some(last) = self.elements.last_mut() {
                if last.op == element.op {
                    last.length += element.length;
                    return;
                }
            }
        }
        self.elements.push(element);
    }

    pub fn append_match(&mut self, length: u32) {
        self.append_element(CigarElement::new(CigarOp::Match, length));
    }

    pub fn append_mismatch(&mut self, text_base: u8) {
        self.elements.push(CigarElement::mismatch(text_base));
    }

    pub fn append_insertion(&mut self, length: u32) {
        self.append_element(CigarElement::new(CigarOp::Insertion, length));
    }

    pub fn append_deletion(&mut self, length: u32) {
        self.append_element(CigarElement::new(CigarOp::Deletion, length));
    }

    pub fn append_soft_clip(&mut self, length: u32) {
        self.append_element(CigarElement::new(CigarOp::SoftClip, length));
    }

    /// Reverse a range in place for a match found on the emulated reverse
    /// strand; mismatch bases are complemented.
    pub fn reverse(&mut self, range: CigarRange) {
        let slice = &mut self.elements[range.offset..range.offset + range.length];
        slice.reverse();
        for element in slice.iter_mut() {
            if element.op == CigarOp::Mismatch {
                element.mismatch = dna_complement(element.mismatch);
            }
        }
    }

    /// Reverse a range in place without complementing (colour space)
    pub fn reverse_colorspace(&mut self, range: CigarRange) {
        self.elements[range.offset..range.offset + range.length].reverse();
    }
}

/// Text bases spanned by a CIGAR
pub fn effective_length(cigar: &[CigarElement]) -> u64 {
    cigar.iter().map(CigarElement::effective_length).sum()
}

/// Key bases consumed by a CIGAR (soft clips included)
pub fn key_length(cigar: &[CigarElement]) -> u64 {
    cigar
        .iter()
        .filter(|e| e.op.consumes_key())
        .map(|e| e.length as u64)
        .sum()
}

/// Edit distance implied by a CIGAR; soft clips count as edits.
pub fn compute_edit_distance(cigar: &[CigarElement]) -> u64 {
    cigar
        .iter()
        .map(|e| match e.op {
            CigarOp::Match => 0,
            _ => e.length as u64,
        })
        .sum()
}

/// Edit distance implied by a CIGAR, ignoring soft clips
pub fn compute_edit_distance_excluding_clipping(cigar: &[CigarElement]) -> u64 {
    cigar
        .iter()
        .map(|e| match e.op {
            CigarOp::Match | CigarOp::SoftClip => 0,
            _ => e.length as u64,
        })
        .sum()
}

/// Render as extended CIGAR text (e.g. `7=1X`). Adjacent mismatches merge.
pub fn to_string(cigar: &[CigarElement]) -> String {
    if cigar.is_empty() {
        return "*".to_string();
    }
    let mut result = String::with_capacity(cigar.len() * 4);
    let mut i = 0;
    while i < cigar.len() {
        let op = cigar[i].op;
        let mut length = cigar[i].length;
        let mut j = i + 1;
        while op == CigarOp::Mismatch && j < cigar.len() && cigar[j].op == CigarOp::Mismatch {
            length += cigar[j].length;
            j += 1;
        }
        let _ = write!(&mut result, "{}{}", length, op.to_byte() as char);
        i = j;
    }
    result
}

/// Mismatch bases as ASCII, in CIGAR order
pub fn mismatch_bases(cigar: &[CigarElement]) -> String {
    cigar
        .iter()
        .filter(|e| e.op == CigarOp::Mismatch)
        .map(|e| dna_decode(e.mismatch) as char)
        .collect()
}

/// Clip gaps that sit at either end of an alignment without enough
/// flanking context.
///
/// Everything before the first match run of at least `min_end_context` bases
/// (and after the last one) is turned into a soft clip when it contains an
/// insertion or deletion. Returns the curated CIGAR and how many text bases
/// were removed from its head.
pub fn curate_ends(cigar: &[CigarElement], min_end_context: u64) -> (Vec<CigarElement>, u64) {
    let anchored = |e: &CigarElement| e.op == CigarOp::Match && e.length as u64 >= min_end_context;
    let (Some(first), Some(last)) = (cigar.iter().position(anchored), cigar.iter().rposition(anchored))
    else {
        return (cigar.to_vec(), 0);
    };
    let has_gap = |part: &[CigarElement]| {
        part.iter()
            .any(|e| matches!(e.op, CigarOp::Insertion | CigarOp::Deletion))
    };

    let mut curated = Vec::with_capacity(cigar.len());
    let mut text_trimmed = 0;
    let head = &cigar[..first];
    if has_gap(head) {
        curated.push(CigarElement::new(CigarOp::SoftClip, key_length(head) as u32));
        text_trimmed = effective_length(head);
    } else {
        curated.extend_from_slice(head);
    }
    curated.extend_from_slice(&cigar[first..=last]);
    let tail = &cigar[last + 1..];
    if has_gap(tail) {
        curated.push(CigarElement::new(CigarOp::SoftClip, key_length(tail) as u32));
    } else {
        curated.extend_from_slice(tail);
    }
    // Adjacent soft clips (an existing clip next to a new one) merge
    curated.dedup_by(|b, a| {
        if a.op == CigarOp::SoftClip && b.op == CigarOp::SoftClip {
            a.length += b.length;
            true
        } else {
            false
        }
    });
    curated.retain(|e| e.length > 0);
    (curated, text_trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_coalesces_runs() {
        let mut buffer = CigarBuffer::new();
        buffer.begin_range();
        buffer.append_match(3);
        buffer.append_match(4);
        buffer.append_mismatch(2);
        buffer.append_mismatch(1);
        buffer.append_deletion(1);
        buffer.append_deletion(2);
        let range = buffer.finish_range();
        let cigar = buffer.get(range);
        assert_eq!(cigar.len(), 4);
        assert_eq!(cigar[0], CigarElement::new(CigarOp::Match, 7));
        assert_eq!(cigar[3], CigarElement::new(CigarOp::Deletion, 3));
        assert_eq!(to_string(cigar), "7=2X3D");
    }

    #[test]
    fn test_ranges_do_not_coalesce_across_boundary() {
        let mut buffer = CigarBuffer::new();
        let first = buffer.append_slice(&[CigarElement::new(CigarOp::Match, 5)]);
        let second = buffer.append_slice(&[CigarElement::new(CigarOp::Match, 6)]);
        assert_eq!(first, CigarRange { offset: 0, length: 1 });
        assert_eq!(second, CigarRange { offset: 1, length: 1 });
        assert_eq!(buffer.get(second)[0].length, 6);
    }

    #[test]
    fn test_effective_length_and_distance() {
        let cigar = [
            CigarElement::new(CigarOp::SoftClip, 2),
            CigarElement::new(CigarOp::Match, 10),
            CigarElement::new(CigarOp::Insertion, 2),
            CigarElement::mismatch(0),
            CigarElement::new(CigarOp::Deletion, 3),
        ];
        assert_eq!(effective_length(&cigar), 14);
        assert_eq!(key_length(&cigar), 15);
        assert_eq!(compute_edit_distance(&cigar), 8);
        assert_eq!(compute_edit_distance_excluding_clipping(&cigar), 6);
        assert_eq!(to_string(&cigar), "2S10=2I1X3D");
    }

    #[test]
    fn test_reverse_complements_mismatches() {
        let mut buffer = CigarBuffer::new();
        let range = buffer.append_slice(&[
            CigarElement::new(CigarOp::Match, 4),
            CigarElement::mismatch(0),
            CigarElement::new(CigarOp::Insertion, 1),
        ]);
        buffer.reverse(range);
        let cigar = buffer.get(range);
        assert_eq!(cigar[0].op, CigarOp::Insertion);
        assert_eq!(cigar[1], CigarElement::mismatch(3));
        assert_eq!(cigar[2].length, 4);

        buffer.reverse_colorspace(range);
        assert_eq!(buffer.get(range)[1], CigarElement::mismatch(3));
        assert_eq!(buffer.get(range)[0].op, CigarOp::Match);
    }

    #[test]
    fn test_empty_renders_star() {
        assert_eq!(to_string(&[]), "*");
    }

    #[test]
    fn test_curate_ends_clips_unanchored_gaps() {
        let cigar = [
            CigarElement::new(CigarOp::Match, 1),
            CigarElement::new(CigarOp::Deletion, 2),
            CigarElement::new(CigarOp::Match, 20),
            CigarElement::mismatch(1),
            CigarElement::new(CigarOp::Match, 1),
        ];
        let (curated, trimmed) = curate_ends(&cigar, 2);
        assert_eq!(trimmed, 3);
        assert_eq!(to_string(&curated), "1S20=1X1=");
        assert_eq!(key_length(&curated), key_length(&cigar));

        let tail_gap = [
            CigarElement::new(CigarOp::Match, 20),
            CigarElement::new(CigarOp::Insertion, 1),
            CigarElement::new(CigarOp::Match, 1),
        ];
        let (curated, trimmed) = curate_ends(&tail_gap, 2);
        assert_eq!(trimmed, 0);
        assert_eq!(to_string(&curated), "20=2S");
    }
}
