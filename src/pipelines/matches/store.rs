//! The per-read match store.
//!
//! Traces live in a plain vector. Two hash indices map the begin and the end
//! position of every trace (per strand) to its slot, which is how duplicates
//! found from different candidates are detected in O(1). Removing a trace
//! uses `swap_remove` and patches the index entries of the trace that moved.

use super::counters::MatchesCounters;
use super::scaffold::ScaffoldType;
use crate::core::alignment::cigar::{self, CigarBuffer, CigarElement, CigarRange};
use crate::core::alignment::types::Strand;
use crate::core::text::{TextCollection, TextHandle};
use crate::error::{Error, Result};
use crate::pipelines::filtering::interval_set::IntervalSet;
use crate::pipelines::search_params::integer_proportion;
use std::collections::HashMap;
use std::fmt;

/// One concrete alignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchTrace {
    /// Filled in by decoding
    pub sequence_name: Option<String>,
    /// Position inside the named sequence, filled in by decoding
    pub sequence_position: u64,
    /// Begin of the alignment in global text coordinates
    pub position: u64,
    pub strand: Strand,
    /// Found by searching the forward strand on behalf of the reverse one
    pub emulated_rc_search: bool,
    /// Stratum the trace is counted in (soft clips count as edits)
    pub distance: u64,
    /// Edits excluding soft clips
    pub edit_distance: u64,
    pub swg_score: i32,
    pub mapq_score: u8,
    pub cigar: CigarRange,
    /// Text bases spanned by the CIGAR; set on insertion
    pub effective_length: u64,
    pub text_trace: Option<TextHandle>,
    pub scaffold_type: ScaffoldType,
}

impl MatchTrace {
    pub fn new(position: u64, strand: Strand, cigar: CigarRange) -> Self {
        Self {
            sequence_name: None,
            sequence_position: 0,
            position,
            strand,
            emulated_rc_search: false,
            distance: 0,
            edit_distance: 0,
            swg_score: 0,
            mapq_score: 0,
            cigar,
            effective_length: 0,
            text_trace: None,
            scaffold_type: ScaffoldType::None,
        }
    }

    pub fn end_position(&self) -> u64 {
        self.position + self.effective_length
    }
}

/// Class of equivalent matches sharing an SA interval (not decoded yet)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchInterval {
    pub lo: u64,
    pub hi: u64,
    pub length: u64,
    pub distance: u64,
    pub emulated_rc_search: bool,
}

impl MatchInterval {
    pub fn count(&self) -> u64 {
        self.hi.saturating_sub(self.lo)
    }
}

/// What [`Matches::add_match_trace`] did with a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMatchOutcome {
    Inserted(usize),
    /// Evicted one or more traces with a worse score under the same key
    Replaced(usize),
    /// An equivalent trace scores the same or better
    Rejected,
}

/// Summary of a match set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchesMetrics {
    pub num_traces: usize,
    pub num_intervals: usize,
    pub total_count: u64,
    pub min_distance: Option<u64>,
    pub max_distance: Option<u64>,
    pub max_swg_score: Option<i32>,
    pub max_complete_stratum: u64,
}

impl fmt::Display for MatchesMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "traces={} intervals={} total={} distance=[{},{}] max_swg={} mcs={}",
            self.num_traces,
            self.num_intervals,
            self.total_count,
            self.min_distance.map_or("-".to_string(), |d| d.to_string()),
            self.max_distance.map_or("-".to_string(), |d| d.to_string()),
            self.max_swg_score.map_or("-".to_string(), |s| s.to_string()),
            self.max_complete_stratum
        )
    }
}

type PositionKey = (u64, Strand);

#[derive(Debug, Default)]
pub struct Matches {
    /// Distance up to which the search is known to be exhaustive
    pub max_complete_stratum: u64,
    counters: MatchesCounters,
    max_swg_score: Option<i32>,
    interval_matches: Vec<MatchInterval>,
    position_matches: Vec<MatchTrace>,
    begin_pos_matches: HashMap<PositionKey, usize>,
    end_pos_matches: HashMap<PositionKey, usize>,
    cigar_buffer: CigarBuffer,
    text_collection: TextCollection,
}

impl Matches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for the next read; every arena is emptied
    pub fn clear(&mut self) {
        self.max_complete_stratum = 0;
        self.counters.clear();
        self.max_swg_score = None;
        self.interval_matches.clear();
        self.position_matches.clear();
        self.clear_index();
        self.cigar_buffer.clear();
        self.text_collection.clear();
    }

    /// Forget the position indices (traces stay). Lookups miss afterwards.
    pub fn clear_index(&mut self) {
        self.begin_pos_matches.clear();
        self.end_pos_matches.clear();
    }

    pub fn is_mapped(&self) -> bool {
        !self.position_matches.is_empty() || !self.interval_matches.is_empty()
    }

    pub fn counters(&self) -> &MatchesCounters {
        &self.counters
    }

    pub fn counters_compact(&mut self) -> u64 {
        self.counters.compact()
    }

    pub fn get_max_swg_score(&self) -> Option<i32> {
        self.max_swg_score
    }

    pub fn get_match_traces(&self) -> &[MatchTrace] {
        &self.position_matches
    }

    /// Mutable traces for score assignment and decoding. Keys used by the
    /// indices (position, strand, CIGAR) must not be changed through this.
    pub fn match_traces_mut(&mut self) -> &mut [MatchTrace] {
        &mut self.position_matches
    }

    pub fn get_num_match_traces(&self) -> usize {
        self.position_matches.len()
    }

    pub fn interval_matches(&self) -> &[MatchInterval] {
        &self.interval_matches
    }

    pub fn cigar_buffer(&self) -> &CigarBuffer {
        &self.cigar_buffer
    }

    pub fn cigar_buffer_mut(&mut self) -> &mut CigarBuffer {
        &mut self.cigar_buffer
    }

    pub fn text_collection(&self) -> &TextCollection {
        &self.text_collection
    }

    pub fn text_collection_mut(&mut self) -> &mut TextCollection {
        &mut self.text_collection
    }

    /// CIGAR and text arenas for building a trace in one go
    pub fn arenas_mut(&mut self) -> (&mut CigarBuffer, &mut TextCollection) {
        (&mut self.cigar_buffer, &mut self.text_collection)
    }

    pub fn trace_cigar(&self, trace: &MatchTrace) -> &[CigarElement] {
        self.cigar_buffer.get(trace.cigar)
    }

    /// CIGAR as text (`=`/`X`/`I`/`D`/`S`)
    pub fn cigar_string(&self, trace: &MatchTrace) -> String {
        cigar::to_string(self.trace_cigar(trace))
    }

    /// Reverse the CIGAR of a trace found through an emulated reverse search
    pub fn reverse_cigar(&mut self, index: usize) {
        let range = self.position_matches[index].cigar;
        self.cigar_buffer.reverse(range);
    }

    pub fn reverse_cigar_colorspace(&mut self, index: usize) {
        let range = self.position_matches[index].cigar;
        self.cigar_buffer.reverse_colorspace(range);
    }

    pub fn hint_allocate_match_trace(&mut self, num_traces: usize) {
        self.position_matches.reserve(num_traces);
        self.begin_pos_matches.reserve(num_traces);
        self.end_pos_matches.reserve(num_traces);
    }

    pub fn hint_allocate_match_interval(&mut self, num_intervals: usize) {
        self.interval_matches.reserve(num_intervals);
    }

    /// Trace already stored with the same begin or the same end position
    pub fn lookup_match(&self, begin_position: u64, effective_length: u64, strand: Strand) -> Option<usize> {
        self.begin_pos_matches
            .get(&(begin_position, strand))
            .or_else(|| {
                self.end_pos_matches
                    .get(&(begin_position + effective_length, strand))
            })
            .copied()
    }

    /// Insert a trace whose CIGAR already lives in this store's buffer.
    ///
    /// Traces sharing a begin or an end position on the same strand are the
    /// same match; only the best scoring one is kept.
    pub fn add_match_trace(&mut self, mut trace: MatchTrace) -> Result<AddMatchOutcome> {
        if trace.cigar.is_empty() {
            return Err(Error::CigarZeroLength);
        }
        trace.effective_length = cigar::effective_length(self.cigar_buffer.get(trace.cigar));

        let mut hits: Vec<usize> = [
            self.begin_pos_matches.get(&(trace.position, trace.strand)),
            self.end_pos_matches.get(&(trace.end_position(), trace.strand)),
        ]
        .into_iter()
        .flatten()
        .copied()
        .collect();
        hits.sort_unstable();
        hits.dedup();

        let outcome_replaced = !hits.is_empty();
        if let Some(best) = hits.iter().map(|&i| self.position_matches[i].swg_score).max() {
            if trace.swg_score == best {
                log::debug!(
                    "matches: duplicate trace at {}:{:?} with equal score {} rejected",
                    trace.position,
                    trace.strand,
                    best
                );
                return Ok(AddMatchOutcome::Rejected);
            }
            if trace.swg_score < best {
                log::trace!(
                    "matches: trace at {} (score {}) loses to stored score {}",
                    trace.position,
                    trace.swg_score,
                    best
                );
                return Ok(AddMatchOutcome::Rejected);
            }
            for &index in hits.iter().rev() {
                self.remove_trace(index);
            }
            self.max_swg_score = self.position_matches.iter().map(|t| t.swg_score).max();
        }

        let index = self.position_matches.len();
        self.counters.add(trace.distance, 1);
        self.max_swg_score = Some(self.max_swg_score.map_or(trace.swg_score, |s| s.max(trace.swg_score)));
        self.begin_pos_matches.insert((trace.position, trace.strand), index);
        self.end_pos_matches.insert((trace.end_position(), trace.strand), index);
        self.position_matches.push(trace);

        Ok(if outcome_replaced {
            AddMatchOutcome::Replaced(index)
        } else {
            AddMatchOutcome::Inserted(index)
        })
    }

    fn remove_trace(&mut self, index: usize) {
        let removed = self.position_matches.swap_remove(index);
        self.counters.sub(removed.distance, 1);
        let begin_key = (removed.position, removed.strand);
        let end_key = (removed.end_position(), removed.strand);
        if self.begin_pos_matches.get(&begin_key) == Some(&index) {
            self.begin_pos_matches.remove(&begin_key);
        }
        if self.end_pos_matches.get(&end_key) == Some(&index) {
            self.end_pos_matches.remove(&end_key);
        }
        // The former last trace now sits at `index`
        if let Some(moved) = self.position_matches.get(index) {
            let old = self.position_matches.len();
            let begin_key = (moved.position, moved.strand);
            let end_key = (moved.end_position(), moved.strand);
            if let Some(slot) = self.begin_pos_matches.get_mut(&begin_key) {
                if *slot == old {
                    *slot = index;
                }
            }
            if let Some(slot) = self.end_pos_matches.get_mut(&end_key) {
                if *slot == old {
                    *slot = index;
                }
            }
        }
    }

    /// Record `[lo, hi)` as undecoded matches of `length` bases
    pub fn add_interval_match(
        &mut self,
        lo: u64,
        hi: u64,
        length: u64,
        distance: u64,
        emulated_rc_search: bool,
    ) {
        let interval = MatchInterval {
            lo,
            hi,
            length,
            distance,
            emulated_rc_search,
        };
        self.counters.add(distance, interval.count());
        self.interval_matches.push(interval);
    }

    pub fn add_interval_set(&mut self, interval_set: &IntervalSet, length: u64, emulated_rc_search: bool) {
        self.hint_allocate_match_interval(interval_set.len());
        for interval in interval_set {
            self.add_interval_match(
                interval.lo,
                interval.hi,
                length,
                interval.distance,
                emulated_rc_search,
            );
        }
    }

    fn rebuild_index(&mut self) {
        self.clear_index();
        for (index, trace) in self.position_matches.iter().enumerate() {
            self.begin_pos_matches
                .insert((trace.position, trace.strand), index);
            self.end_pos_matches
                .insert((trace.end_position(), trace.strand), index);
        }
    }

    fn rebuild_counters(&mut self) {
        self.counters.clear();
        for interval in &self.interval_matches {
            self.counters.add(interval.distance, interval.count());
        }
        for trace in &self.position_matches {
            self.counters.add(trace.distance, 1);
        }
        self.max_swg_score = self.position_matches.iter().map(|t| t.swg_score).max();
    }

    pub fn sort_by_distance(&mut self) {
        self.position_matches.sort_by_key(|t| t.distance);
        self.rebuild_index();
    }

    /// Highest score first
    pub fn sort_by_swg_score(&mut self) {
        self.position_matches
            .sort_by(|a, b| b.swg_score.cmp(&a.swg_score));
        self.rebuild_index();
    }

    /// Highest MAPQ first, ties by score
    pub fn sort_by_mapq_score(&mut self) {
        self.position_matches.sort_by(|a, b| {
            b.mapq_score
                .cmp(&a.mapq_score)
                .then(b.swg_score.cmp(&a.swg_score))
        });
        self.rebuild_index();
    }

    /// Deterministic output order: sequence name, then position in it
    pub fn sort_by_sequence_name_position(&mut self) {
        self.position_matches.sort_by(|a, b| {
            a.sequence_name
                .cmp(&b.sequence_name)
                .then(a.sequence_position.cmp(&b.sequence_position))
                .then(a.position.cmp(&b.position))
        });
        self.rebuild_index();
    }

    /// Keep the traces for which `keep` returns true (order preserved)
    pub fn retain_traces<F>(&mut self, keep: F)
    where
        F: FnMut(&MatchTrace) -> bool,
    {
        let before = self.position_matches.len();
        self.position_matches.retain(keep);
        if self.position_matches.len() != before {
            self.rebuild_index();
            self.rebuild_counters();
        }
    }

    pub fn truncate_traces(&mut self, len: usize) {
        if len < self.position_matches.len() {
            self.position_matches.truncate(len);
            self.rebuild_index();
            self.rebuild_counters();
        }
    }

    /// Drop traces scoring more than `swg_score_difference` of the maximum
    /// attainable score (`read_length * match_score`) below the best one.
    /// The best trace always survives.
    pub fn curate(&mut self, swg_score_difference: f64, read_length: u64, match_score: i32) -> usize {
        let Some(max_score) = self.max_swg_score else {
            return 0;
        };
        let range = read_length * match_score.max(0) as u64;
        let threshold = max_score as i64 - integer_proportion(swg_score_difference, range) as i64;
        let before = self.position_matches.len();
        self.retain_traces(|t| t.swg_score as i64 >= threshold);
        let removed = before - self.position_matches.len();
        if removed > 0 {
            log::debug!("matches: curation removed {} traces (threshold {})", removed, threshold);
        }
        removed
    }

    /// Best and second best SWG scores over all traces
    pub fn best_swg_scores(&self) -> (Option<i32>, Option<i32>) {
        let mut best: Option<i32> = None;
        let mut second: Option<i32> = None;
        for trace in &self.position_matches {
            let score = trace.swg_score;
            if best.map_or(true, |b| score > b) {
                second = best;
                best = Some(score);
            } else if second.map_or(true, |s| score > s) {
                second = Some(score);
            }
        }
        (best, second)
    }

    pub fn metrics(&self) -> MatchesMetrics {
        MatchesMetrics {
            num_traces: self.position_matches.len(),
            num_intervals: self.interval_matches.len(),
            total_count: self.counters.get_total_count(),
            min_distance: self.counters.get_min_distance(),
            max_distance: self.counters.get_max_distance(),
            max_swg_score: self.max_swg_score,
            max_complete_stratum: self.max_complete_stratum,
        }
    }
}
