//! Match scaffolding: a skeleton of trusted matching regions inside one
//! candidate, used to bound the gap-affine refinement.
//!
//! Refinement escalates through [`ScaffoldType`] in order and never goes
//! back: chained seed anchors first, then regions recovered from a
//! Levenshtein alignment, then regions from a full SWG alignment. It stops
//! at the first level whose coverage reaches the configured minimum, or at
//! the configured maximum level.

use crate::core::alignment::cigar::{CigarBuffer, CigarElement, CigarOp};
use crate::core::alignment::edit_distance::edit_distance_align;
use crate::core::alignment::swg::{swg_align, SwgMode, SwgPenalties};
use crate::error::Result;
use crate::pipelines::search_params::NominalParameters;

/// How far scaffolding has progressed. Ordered by cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ScaffoldType {
    #[default]
    None,
    AlignmentChain,
    Levenshtein,
    Swg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionType {
    Exact,
    Approximate,
}

/// Matching span with known offsets in both the key and the candidate text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentRegion {
    pub region_type: RegionType,
    pub error: u64,
    pub key_begin: u64,
    pub key_end: u64,
    pub text_begin: u64,
    pub text_end: u64,
}

impl AlignmentRegion {
    pub fn exact(key_begin: u64, key_end: u64, text_begin: u64) -> Self {
        Self {
            region_type: RegionType::Exact,
            error: 0,
            key_begin,
            key_end,
            text_begin,
            text_end: text_begin + (key_end - key_begin),
        }
    }

    pub fn key_length(&self) -> u64 {
        self.key_end - self.key_begin
    }

    pub fn text_length(&self) -> u64 {
        self.text_end - self.text_begin
    }
}

/// Scaffolding thresholds for one read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaffoldParameters {
    /// Key bases that must be covered by regions to stop escalating
    pub min_coverage: u64,
    /// Shortest region kept
    pub min_matching_length: u64,
    pub max_level: ScaffoldType,
}

impl ScaffoldParameters {
    pub fn from_nominal(nominal: &NominalParameters, max_level: ScaffoldType) -> Self {
        Self {
            min_coverage: nominal.scaffolding_min_coverage,
            min_matching_length: nominal.scaffolding_min_matching_length.max(1),
            max_level,
        }
    }
}

/// Key, candidate text and seed anchors (offsets relative to `text`)
#[derive(Debug, Clone, Copy)]
pub struct ScaffoldInput<'a> {
    pub key: &'a [u8],
    pub text: &'a [u8],
    pub anchors: &'a [AlignmentRegion],
}

#[derive(Debug, Clone, Default)]
pub struct MatchScaffold {
    scaffold_type: ScaffoldType,
    regions: Vec<AlignmentRegion>,
    coverage: u64,
}

impl MatchScaffold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.scaffold_type = ScaffoldType::None;
        self.regions.clear();
        self.coverage = 0;
    }

    pub fn is_null(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn scaffold_type(&self) -> ScaffoldType {
        self.scaffold_type
    }

    pub fn regions(&self) -> &[AlignmentRegion] {
        &self.regions
    }

    /// Key bases covered by regions
    pub fn coverage(&self) -> u64 {
        self.coverage
    }

    /// Order regions by text offset, then key offset
    pub fn sort_alignment_regions(&mut self) {
        self.regions.sort_by_key(|r| (r.text_begin, r.key_begin));
    }

    /// Best-effort scaffolding of one candidate.
    ///
    /// `cigar_buffer` is only used as scratch space; whatever is appended is
    /// released before returning.
    pub fn adaptive(
        &mut self,
        input: &ScaffoldInput<'_>,
        params: &ScaffoldParameters,
        penalties: &SwgPenalties,
        cigar_buffer: &mut CigarBuffer,
    ) -> Result<()> {
        self.clear();
        if input.key.is_empty() || input.text.is_empty() {
            return Ok(());
        }
        for level in [
            ScaffoldType::AlignmentChain,
            ScaffoldType::Levenshtein,
            ScaffoldType::Swg,
        ] {
            if level > params.max_level {
                break;
            }
            let regions = match level {
                ScaffoldType::AlignmentChain => chain_anchors(input, params.min_matching_length),
                ScaffoldType::Levenshtein => {
                    let aln = edit_distance_align(input.key, input.text, true, cigar_buffer)?;
                    let regions = regions_from_cigar(
                        cigar_buffer.get(aln.cigar),
                        aln.text_begin,
                        params.min_matching_length,
                    );
                    cigar_buffer.release(aln.cigar);
                    regions
                }
                ScaffoldType::Swg => {
                    let aln =
                        swg_align(input.key, input.text, penalties, SwgMode::Global, cigar_buffer)?;
                    let regions = regions_from_cigar(
                        cigar_buffer.get(aln.cigar),
                        aln.text_begin,
                        params.min_matching_length,
                    );
                    cigar_buffer.release(aln.cigar);
                    regions
                }
                ScaffoldType::None => Vec::new(),
            };
            if !regions.is_empty() {
                self.coverage = regions.iter().map(AlignmentRegion::key_length).sum();
                self.regions = regions;
                self.scaffold_type = level;
            }
            log::trace!(
                "scaffold {:?}: {} regions, coverage {}/{}",
                level,
                self.regions.len(),
                self.coverage,
                input.key.len()
            );
            if self.coverage >= params.min_coverage {
                break;
            }
        }
        Ok(())
    }

    /// Text window `[begin, end)` that an alignment guided by this scaffold
    /// can reach, allowing `bandwidth` extra bases at each end
    pub fn text_window(&self, key_length: u64, text_length: u64, bandwidth: u64) -> Option<(u64, u64)> {
        let first = self.regions.first()?;
        let last = self.regions.last()?;
        let begin = first
            .text_begin
            .saturating_sub(first.key_begin)
            .saturating_sub(bandwidth);
        let end = (last.text_end + (key_length - last.key_end.min(key_length)) + bandwidth)
            .min(text_length);
        (begin < end).then_some((begin, end))
    }

    /// Regions are sorted, disjoint, inside key and text, and exact regions
    /// really match
    pub fn check(&self, key: &[u8], text: &[u8]) -> bool {
        let mut previous: Option<&AlignmentRegion> = None;
        for region in &self.regions {
            if region.key_begin > region.key_end
                || region.key_end > key.len() as u64
                || region.text_begin > region.text_end
                || region.text_end > text.len() as u64
            {
                return false;
            }
            if let Some(prev) = previous {
                if region.key_begin < prev.key_end || region.text_begin < prev.text_end {
                    return false;
                }
            }
            if region.region_type == RegionType::Exact {
                let k = &key[region.key_begin as usize..region.key_end as usize];
                let t = &text[region.text_begin as usize..region.text_end as usize];
                if k != t {
                    return false;
                }
            }
            previous = Some(region);
        }
        true
    }
}

/// Greedy chain of seed anchors increasing in both key and text
fn chain_anchors(input: &ScaffoldInput<'_>, min_matching_length: u64) -> Vec<AlignmentRegion> {
    let mut anchors: Vec<AlignmentRegion> = input
        .anchors
        .iter()
        .filter(|a| {
            a.key_length() >= min_matching_length
                && a.key_end <= input.key.len() as u64
                && a.text_end <= input.text.len() as u64
        })
        .copied()
        .collect();
    anchors.sort_by_key(|r| (r.text_begin, r.key_begin));

    let mut chained: Vec<AlignmentRegion> = Vec::with_capacity(anchors.len());
    for anchor in anchors {
        match chained.last() {
            Some(last) if anchor.key_begin < last.key_end || anchor.text_begin < last.text_end => {}
            _ => chained.push(anchor),
        }
    }
    chained
}

/// Match runs of at least `min_length` bases as exact regions
fn regions_from_cigar(cigar: &[CigarElement], text_offset: u64, min_length: u64) -> Vec<AlignmentRegion> {
    let mut regions = Vec::new();
    let (mut k, mut t) = (0u64, text_offset);
    for element in cigar {
        let len = element.length as u64;
        if element.op == CigarOp::Match && len >= min_length {
            regions.push(AlignmentRegion::exact(k, k + len, t));
        }
        if element.op.consumes_key() {
            k += len;
        }
        if element.op.consumes_text() {
            t += len;
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dna::encode_sequence;

    const KEY: &[u8] = b"ACGTTGCAAGGCTTACCGATCGATTACGGCATTAGC";

    fn params(min_coverage: u64, max_level: ScaffoldType) -> ScaffoldParameters {
        ScaffoldParameters {
            min_coverage,
            min_matching_length: 5,
            max_level,
        }
    }

    fn scaffold(
        key: &[u8],
        text: &[u8],
        anchors: &[AlignmentRegion],
        params: &ScaffoldParameters,
    ) -> MatchScaffold {
        let mut scaffold = MatchScaffold::new();
        let mut buffer = CigarBuffer::new();
        let input = ScaffoldInput { key, text, anchors };
        scaffold
            .adaptive(&input, params, &SwgPenalties::default(), &mut buffer)
            .unwrap();
        assert!(buffer.is_empty());
        assert!(scaffold.check(key, text));
        scaffold
    }

    #[test]
    fn test_chain_sufficient_stops_early() {
        let key = encode_sequence(KEY);
        let mut text = encode_sequence(b"GGGG");
        text.extend_from_slice(&key);
        let anchors = [AlignmentRegion::exact(0, 20, 4), AlignmentRegion::exact(20, 36, 24)];
        let s = scaffold(&key, &text, &anchors, &params(30, ScaffoldType::Swg));
        assert_eq!(s.scaffold_type(), ScaffoldType::AlignmentChain);
        assert_eq!(s.coverage(), 36);
        assert_eq!(s.text_window(36, text.len() as u64, 2), Some((2, 40)));
    }

    #[test]
    fn test_chain_drops_crossing_anchors() {
        let key = encode_sequence(KEY);
        let anchors = [
            AlignmentRegion::exact(10, 20, 10),
            AlignmentRegion::exact(0, 8, 12),
            AlignmentRegion::exact(25, 30, 25),
        ];
        let s = scaffold(&key, &key, &anchors, &params(100, ScaffoldType::AlignmentChain));
        assert_eq!(s.regions().len(), 2);
        assert_eq!(s.regions()[0].key_begin, 10);
    }

    #[test]
    fn test_escalates_to_levenshtein() {
        let key = encode_sequence(KEY);
        let mut text = key.clone();
        text[18] = (text[18] + 1) % 4;
        let s = scaffold(&key, &text, &[], &params(30, ScaffoldType::Swg));
        assert_eq!(s.scaffold_type(), ScaffoldType::Levenshtein);
        assert_eq!(s.coverage(), 35);
    }

    #[test]
    fn test_level_cap_is_respected() {
        let key = encode_sequence(KEY);
        let s = scaffold(&key, &key, &[], &params(100, ScaffoldType::AlignmentChain));
        assert!(s.is_null());
        assert_eq!(s.scaffold_type(), ScaffoldType::None);
    }

    #[test]
    fn test_check_rejects_overlap() {
        let key = encode_sequence(KEY);
        let mut s = MatchScaffold::new();
        s.regions = vec![AlignmentRegion::exact(0, 10, 0), AlignmentRegion::exact(5, 15, 5)];
        assert!(!s.check(&key, &key));
        s.regions = vec![AlignmentRegion::exact(5, 15, 5), AlignmentRegion::exact(0, 4, 0)];
        s.sort_alignment_regions();
        assert!(s.check(&key, &key));
    }
}
