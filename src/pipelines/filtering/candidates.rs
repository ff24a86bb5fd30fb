//! Filtering candidates: SA intervals handed over by the index search,
//! waiting to be decoded into text positions and verified.
//!
//! Candidates are kept undecoded until verification starts. Decoding goes
//! through a [`CandidateLocator`]; candidates that land within the error
//! budget of each other on the same strand are composed into one region, and
//! every composed region is recorded as verified so the same text position is
//! never verified twice for a read.

use super::interval_set::IntervalSet;
use crate::core::alignment::types::Strand;
use crate::pipelines::matches::scaffold::{AlignmentRegion, RegionType};
use std::collections::HashSet;

/// Maps suffix-array positions to text positions
pub trait CandidateLocator: Send + Sync {
    /// Text position of the region the SA position stands for, and the
    /// strand whose key the region was searched with
    fn locate(&self, sa_position: u64) -> Option<(u64, Strand)>;
}

/// Locator for producers that already report text positions on the forward
/// strand
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPositionLocator;

impl CandidateLocator for TextPositionLocator {
    fn locate(&self, sa_position: u64) -> Option<(u64, Strand)> {
        Some((sa_position, Strand::Forward))
    }
}

/// One undecoded candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidatePosition {
    pub sa_position: u64,
    pub region_start: u64,
    pub region_end: u64,
    pub region_errors: u64,
}

/// Decoded candidate: where the key would start in the text, plus the seed
/// regions supporting it (text offsets relative to `begin_position`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRegion {
    pub begin_position: u64,
    pub strand: Strand,
    pub anchors: Vec<AlignmentRegion>,
}

#[derive(Debug, Default)]
pub struct FilteringCandidates {
    pending: Vec<CandidatePosition>,
    verified: HashSet<(u64, Strand)>,
}

impl FilteringCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything (next read)
    pub fn clear(&mut self) {
        self.pending.clear();
        self.verified.clear();
    }

    /// Queue every position of `[lo, hi)`, found for key region
    /// `[region_start, region_end)` with `region_errors` errors
    pub fn add_interval(
        &mut self,
        lo: u64,
        hi: u64,
        region_start: u64,
        region_end: u64,
        region_errors: u64,
    ) {
        self.pending
            .extend((lo..hi).map(|sa_position| CandidatePosition {
                sa_position,
                region_start,
                region_end,
                region_errors,
            }));
    }

    pub fn add_interval_set(&mut self, interval_set: &IntervalSet, region_start: u64, region_end: u64) {
        for interval in interval_set {
            self.add_interval(
                interval.lo,
                interval.hi,
                region_start,
                region_end,
                interval.distance,
            );
        }
    }

    /// Like [`add_interval_set`](Self::add_interval_set), skipping intervals
    /// with more than `max_error` errors
    pub fn add_interval_set_thresholded(
        &mut self,
        interval_set: &IntervalSet,
        region_start: u64,
        region_end: u64,
        max_error: u64,
    ) {
        for interval in interval_set.iter().filter(|i| i.distance <= max_error) {
            self.add_interval(
                interval.lo,
                interval.hi,
                region_start,
                region_end,
                interval.distance,
            );
        }
    }

    /// Candidates waiting for verification
    pub fn get_pending_candidates(&self) -> usize {
        self.pending.len()
    }

    pub fn num_verified(&self) -> usize {
        self.verified.len()
    }

    pub fn is_verified(&self, begin_position: u64, strand: Strand) -> bool {
        self.verified.contains(&(begin_position, strand))
    }

    /// Record a position as verified; false if it already was
    pub fn mark_verified(&mut self, begin_position: u64, strand: Strand) -> bool {
        self.verified.insert((begin_position, strand))
    }

    /// Decode and compose every pending candidate, dropping positions already
    /// verified. The returned regions are marked verified.
    pub fn compose_pending(
        &mut self,
        locator: &dyn CandidateLocator,
        key_length: u64,
        max_error: u64,
    ) -> Vec<CandidateRegion> {
        let mut decoded: Vec<(Strand, u64, u64, CandidatePosition)> = self
            .pending
            .drain(..)
            .filter_map(|candidate| {
                let (position, strand) = locator.locate(candidate.sa_position)?;
                let begin = position.saturating_sub(candidate.region_start);
                Some((strand, begin, position, candidate))
            })
            .collect();
        decoded.sort_unstable_by_key(|&(strand, begin, _, c)| (strand, begin, c.region_start));

        let mut regions: Vec<CandidateRegion> = Vec::new();
        for (strand, begin, anchor_begin, candidate) in decoded {
            let extends_last = regions.last().is_some_and(|r: &CandidateRegion| {
                r.strand == strand && begin >= r.begin_position && begin - r.begin_position <= max_error
            });
            if !extends_last {
                regions.push(CandidateRegion {
                    begin_position: begin,
                    strand,
                    anchors: Vec::new(),
                });
            }
            if let Some(region) = regions.last_mut() {
                let key_end = candidate.region_end.min(key_length);
                if candidate.region_start < key_end {
                    let text_begin = anchor_begin - region.begin_position;
                    let anchor = AlignmentRegion {
                        region_type: if candidate.region_errors == 0 {
                            RegionType::Exact
                        } else {
                            RegionType::Approximate
                        },
                        error: candidate.region_errors,
                        key_begin: candidate.region_start,
                        key_end,
                        text_begin,
                        text_end: text_begin + (key_end - candidate.region_start),
                    };
                    if !region.anchors.contains(&anchor) {
                        region.anchors.push(anchor);
                    }
                }
            }
        }

        let before = regions.len();
        regions.retain(|r| self.verified.insert((r.begin_position, r.strand)));
        log::trace!(
            "filtering: {} regions composed, {} already verified",
            before,
            before - regions.len()
        );
        regions
    }
}
