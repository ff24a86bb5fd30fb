//! Selection: turns a raw match set into the capped, ordered set that is
//! reported, decoding trace positions into sequence coordinates on the way.

use super::classify::{score_matches, MatchClassifier, MatchesClass};
use super::store::Matches;
use crate::core::alignment::swg::SwgPenalties;
use crate::core::text::TextSource;
use crate::defaults;
use crate::pipelines::search_params::integer_proportion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchesSorting {
    Distance,
    SwgScore,
    #[default]
    Mapq,
    SequencePosition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectParameters {
    pub mapq_threshold: u8,
    /// Strata past the best one that are decoded (fraction or absolute)
    pub min_decoded_strata: f64,
    pub max_decoded_matches: u64,
    pub min_reported_matches: u64,
    pub max_reported_matches: u64,
    pub sorting: MatchesSorting,
    /// Drop traces trailing the best score by this fraction of the maximum
    pub curation_swg_score_difference: f64,
}

impl Default for SelectParameters {
    fn default() -> Self {
        Self {
            mapq_threshold: defaults::MAPQ_THRESHOLD,
            min_decoded_strata: defaults::MIN_DECODED_STRATA as f64,
            max_decoded_matches: defaults::MAX_DECODED_MATCHES,
            min_reported_matches: defaults::MIN_REPORTED_MATCHES,
            max_reported_matches: defaults::MAX_REPORTED_MATCHES,
            sorting: MatchesSorting::Mapq,
            curation_swg_score_difference: defaults::CURATION_SWG_SCORE_DIFFERENCE,
        }
    }
}

impl SelectParameters {
    pub fn configure_reporting(
        &mut self,
        min_decoded_strata: f64,
        max_decoded_matches: u64,
        min_reported_matches: u64,
        max_reported_matches: u64,
    ) {
        self.min_decoded_strata = min_decoded_strata;
        self.max_decoded_matches = max_decoded_matches;
        self.min_reported_matches = min_reported_matches;
        self.max_reported_matches = max_reported_matches;
    }

    pub fn min_decoded_strata_nominal(&self, sequence_length: u64) -> u64 {
        integer_proportion(self.min_decoded_strata, sequence_length)
    }
}

/// Stages of [`select_matches`] to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectStages {
    pub curate: bool,
    pub score: bool,
    pub sort: bool,
}

impl Default for SelectStages {
    fn default() -> Self {
        Self {
            curate: true,
            score: true,
            sort: true,
        }
    }
}

/// Decode every trace: sequence name, position inside the sequence, and
/// the CIGAR orientation of traces found by emulated reverse search.
pub fn decode_trace_matches(matches: &mut Matches, text: &dyn TextSource) {
    for index in 0..matches.get_num_match_traces() {
        let trace = &matches.get_match_traces()[index];
        if trace.sequence_name.is_some() {
            continue;
        }
        let decoded = text
            .decode_position(trace.position)
            .map(|d| (d.sequence_name.to_string(), d.position));
        let reverse = trace.emulated_rc_search;
        if reverse {
            matches.reverse_cigar(index);
        }
        let trace = &mut matches.match_traces_mut()[index];
        match decoded {
            Some((name, position)) => {
                trace.sequence_name = Some(name);
                trace.sequence_position = position;
            }
            None => log::warn!("select: trace at {} lies outside the text", trace.position),
        }
        if reverse {
            trace.emulated_rc_search = false;
        }
    }
}

/// Curate, score, sort, cap and decode a read's match set
pub fn select_matches(
    matches: &mut Matches,
    params: &SelectParameters,
    stages: SelectStages,
    classifier: &dyn MatchClassifier,
    penalties: &SwgPenalties,
    read_length: u64,
    text: &dyn TextSource,
) -> MatchesClass {
    if stages.curate {
        matches.curate(
            params.curation_swg_score_difference,
            read_length,
            penalties.generic_match_score,
        );
    }
    let class = if stages.score {
        score_matches(matches, classifier, penalties, read_length)
    } else {
        MatchesClass::default()
    };
    if stages.sort {
        match params.sorting {
            MatchesSorting::Distance => matches.sort_by_distance(),
            MatchesSorting::SwgScore => matches.sort_by_swg_score(),
            MatchesSorting::Mapq => matches.sort_by_mapq_score(),
            MatchesSorting::SequencePosition => {}
        }
    }

    // Decode strata [best, best + min_decoded_strata], at least
    // `min_reported_matches`, at most `max_decoded_matches`
    if let Some(best) = matches.get_match_traces().iter().map(|t| t.distance).min() {
        let strata_limit = best + params.min_decoded_strata_nominal(read_length);
        let min_reported = params.min_reported_matches as usize;
        let mut position = 0usize;
        let threshold = params.mapq_threshold;
        matches.retain_traces(|t| {
            let keep = position < min_reported || t.distance <= strata_limit;
            position += 1;
            keep && (threshold == 0 || t.mapq_score >= threshold)
        });
    }
    let cap = params.max_decoded_matches.min(params.max_reported_matches) as usize;
    matches.truncate_traces(cap.max(params.min_reported_matches as usize));

    decode_trace_matches(matches, text);
    if stages.sort && params.sorting == MatchesSorting::SequencePosition {
        matches.sort_by_sequence_name_position();
    }
    log::debug!("select: {:?} {}", class, matches.metrics());
    class
}

/// Whether the search can stop: enough complete strata past the best match,
/// or enough matches found
pub fn accuracy_reached(matches: &Matches, complete_strata_after_best: u64, max_search_matches: u64) -> bool {
    if matches.counters().get_total_count() >= max_search_matches {
        return true;
    }
    match matches.counters().get_min_distance() {
        Some(best) => matches.max_complete_stratum > best + complete_strata_after_best,
        None => false,
    }
}
