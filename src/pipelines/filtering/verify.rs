//! Candidate verification and realignment on the CPU.
//!
//! Per candidate region:
//! 1. fetch the text window `[begin - e, begin + m + e)` into the read arena
//! 2. tiled k-mer + BPM bound; candidates over budget are dropped
//! 3. exact BPM distance and end column for the whole key
//! 4. duplicate lookup against the match store
//! 5. adaptive scaffold, which narrows the SWG window
//! 6. SWG (global, then local depending on the policy), thresholds, curation
//! 7. insertion into the match store
//!
//! Steps 3-7 are shared with the batched driver, which replaces 2-3 with a
//! device round trip.

use super::candidates::{CandidateLocator, CandidateRegion, FilteringCandidates};
use crate::core::alignment::bpm::BpmPattern;
use crate::core::alignment::cigar::{self, CigarElement, CigarOp};
use crate::core::alignment::swg::{swg_align, swg_score_cigar, SwgMode};
use crate::core::alignment::tiles::{alignment_init, alignment_verify_levenshtein, AlignmentFilters};
use crate::core::alignment::types::{Alignment, Strand, ALIGN_COLUMN_INF, ALIGN_DISTANCE_INF};
use crate::core::dna::reverse_complement;
use crate::core::text::{TextHandle, TextSource};
use crate::error::Result;
use crate::pipelines::matches::scaffold::{MatchScaffold, ScaffoldInput, ScaffoldParameters};
use crate::pipelines::matches::store::{AddMatchOutcome, MatchTrace, Matches};
use crate::pipelines::search_params::{LocalAlignment, NominalParameters, SearchParameters};

/// Read-independent inputs of verification
#[derive(Clone, Copy)]
pub struct VerifyContext<'a> {
    pub params: &'a SearchParameters,
    pub text: &'a dyn TextSource,
    pub locator: &'a dyn CandidateLocator,
}

/// One strand's key with its compiled filters
#[derive(Debug, Clone)]
pub struct StrandKey {
    pub key: Vec<u8>,
    pub filters: AlignmentFilters,
    pub pattern: BpmPattern,
}

impl StrandKey {
    fn compile(key: Vec<u8>, params: &SearchParameters) -> Self {
        let filters = AlignmentFilters::compile(&key, params.tile_length, params.kmer_length);
        let pattern = BpmPattern::compile(&key);
        Self {
            key,
            filters,
            pattern,
        }
    }
}

/// Both keys of a read plus its instantiated thresholds, compiled once
#[derive(Debug, Clone)]
pub struct ReadKeys {
    forward: StrandKey,
    reverse: StrandKey,
    pub nominal: NominalParameters,
}

impl ReadKeys {
    /// `read` must be encoded
    pub fn new(read: &[u8], params: &SearchParameters) -> Self {
        Self {
            forward: StrandKey::compile(read.to_vec(), params),
            reverse: StrandKey::compile(reverse_complement(read), params),
            nominal: params.instantiate_values(read.len() as u64),
        }
    }

    pub fn len(&self) -> usize {
        self.forward.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.key.is_empty()
    }

    pub fn strand(&self, strand: Strand) -> &StrandKey {
        match strand {
            Strand::Forward => &self.forward,
            Strand::Reverse => &self.reverse,
        }
    }
}

/// Candidate text copied into the read arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateWindow {
    pub handle: TextHandle,
    /// Global text position of the first window base
    pub begin: u64,
    pub length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// Over the error budget
    Discarded,
    /// An equivalent trace is already stored
    Duplicate,
    /// Aligned, but under the identity or score thresholds
    Rejected,
    Accepted(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyStats {
    pub candidates: usize,
    pub discarded: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub accepted: usize,
}

impl VerifyStats {
    pub fn record(&mut self, outcome: CandidateOutcome) {
        match outcome {
            CandidateOutcome::Discarded => self.discarded += 1,
            CandidateOutcome::Duplicate => self.duplicates += 1,
            CandidateOutcome::Rejected => self.rejected += 1,
            CandidateOutcome::Accepted(_) => self.accepted += 1,
        }
    }

    pub fn merge(&mut self, other: &VerifyStats) {
        self.candidates += other.candidates;
        self.discarded += other.discarded;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
        self.accepted += other.accepted;
    }
}

/// Copy the text a candidate can align to into the read arena
pub fn fetch_candidate_window(
    region: &CandidateRegion,
    key_length: u64,
    max_error: u64,
    text: &dyn TextSource,
    matches: &mut Matches,
) -> CandidateWindow {
    let begin = region.begin_position.saturating_sub(max_error);
    let end = region.begin_position + key_length + max_error;
    let handle = matches
        .text_collection_mut()
        .fetch_text(text, begin, end - begin);
    let length = matches.text_collection().get(handle).len() as u64;
    CandidateWindow {
        handle,
        begin,
        length,
    }
}

/// Verify and align every pending candidate of one read
pub fn verify_candidates(
    candidates: &mut FilteringCandidates,
    keys: &ReadKeys,
    ctx: &VerifyContext<'_>,
    matches: &mut Matches,
) -> Result<VerifyStats> {
    let max_error = keys.nominal.max_error;
    let regions = candidates.compose_pending(ctx.locator, keys.len() as u64, max_error);
    let mut stats = VerifyStats {
        candidates: regions.len(),
        ..Default::default()
    };
    if keys.is_empty() {
        // Nothing to align; the read stays unmapped
        stats.discarded = regions.len();
        return Ok(stats);
    }
    let mut backlog: Vec<(usize, CandidateWindow)> = Vec::new();
    let mut alignment = Alignment::default();

    for (index, region) in regions.iter().enumerate() {
        let window = fetch_candidate_window(region, keys.len() as u64, max_error, ctx.text, matches);
        let strand_key = keys.strand(region.strand);
        let text = matches.text_collection().get(window.handle);
        alignment_init(&mut alignment, &strand_key.filters, text.len() as u64, max_error);
        alignment_verify_levenshtein(&mut alignment, &strand_key.filters, &strand_key.key, text, max_error);
        if alignment.is_discarded() {
            stats.record(CandidateOutcome::Discarded);
            continue;
        }
        let outcome = realign_candidate(region, &window, None, keys, ctx, matches, SwgMode::Global)?;
        if outcome == CandidateOutcome::Rejected && ctx.params.local_alignment != LocalAlignment::Never {
            backlog.push((index, window));
            continue;
        }
        stats.record(outcome);
    }

    let local = match ctx.params.local_alignment {
        LocalAlignment::Never => false,
        LocalAlignment::IfUnmapped => !matches.is_mapped(),
        LocalAlignment::Always => true,
    };
    for (index, window) in backlog {
        let outcome = if local {
            realign_candidate(&regions[index], &window, None, keys, ctx, matches, SwgMode::Local)?
        } else {
            CandidateOutcome::Rejected
        };
        stats.record(outcome);
    }

    log::debug!(
        "verify: {} candidates, {} discarded, {} duplicates, {} rejected, {} accepted",
        stats.candidates,
        stats.discarded,
        stats.duplicates,
        stats.rejected,
        stats.accepted
    );
    Ok(stats)
}

/// Align one candidate that survived filtering and store the trace.
///
/// `bpm_result` is the `(distance, end_column)` of the whole key over the
/// window when already known (batched path); otherwise it is computed here.
/// Local mode skips the distance check.
pub fn realign_candidate(
    region: &CandidateRegion,
    window: &CandidateWindow,
    bpm_result: Option<(u64, u64)>,
    keys: &ReadKeys,
    ctx: &VerifyContext<'_>,
    matches: &mut Matches,
    mode: SwgMode,
) -> Result<CandidateOutcome> {
    let nominal = &keys.nominal;
    let params = ctx.params;
    let strand_key = keys.strand(region.strand);
    let key = strand_key.key.as_slice();
    let key_length = key.len() as u64;
    if key.is_empty() {
        return Ok(CandidateOutcome::Discarded);
    }

    if mode == SwgMode::Global {
        let (distance, column) = match bpm_result {
            Some(result) => result,
            None => strand_key
                .pattern
                .verify(matches.text_collection().get(window.handle), nominal.max_error),
        };
        if distance == ALIGN_DISTANCE_INF || distance > nominal.max_error {
            log::trace!(
                "candidate {}:{:?}: distance over budget",
                region.begin_position,
                region.strand
            );
            return Ok(CandidateOutcome::Discarded);
        }
        let stored = (column != ALIGN_COLUMN_INF)
            .then(|| window.begin + column + 1)
            .and_then(|end| matches.lookup_match(end.saturating_sub(key_length), key_length, region.strand));
        if let Some(index) = stored {
            if matches.get_match_traces()[index].distance <= distance {
                log::trace!("candidate {}: already matched", region.begin_position);
                return Ok(CandidateOutcome::Duplicate);
            }
        }
    }

    let (cigar_buffer, texts) = matches.arenas_mut();
    let text = texts.get(window.handle);

    // Scaffold anchors are relative to the candidate begin; shift them into
    // the window
    let shift = region.begin_position - window.begin;
    let anchors: Vec<_> = region
        .anchors
        .iter()
        .map(|a| {
            let mut a = *a;
            a.text_begin += shift;
            a.text_end += shift;
            a
        })
        .collect();
    let mut scaffold = MatchScaffold::new();
    scaffold.adaptive(
        &ScaffoldInput {
            key,
            text,
            anchors: &anchors,
        },
        &ScaffoldParameters::from_nominal(nominal, params.scaffolding_max_level),
        &params.swg_penalties,
        cigar_buffer,
    )?;
    let (sub_begin, sub_end) = if params.force_full_swg {
        (0, text.len() as u64)
    } else {
        scaffold
            .text_window(key_length, text.len() as u64, nominal.max_bandwidth)
            .unwrap_or((0, text.len() as u64))
    };
    let sub_text = &text[sub_begin as usize..sub_end as usize];

    let aln = swg_align(key, sub_text, &params.swg_penalties, mode, cigar_buffer)?;
    let mut cigar_range = aln.cigar;
    let mut text_begin = aln.text_begin;

    let (min_identity, min_score) = match mode {
        SwgMode::Global => (nominal.global_min_identity, nominal.global_min_swg_threshold),
        SwgMode::Local => (nominal.local_min_identity, nominal.local_min_swg_threshold),
    };
    let elements = cigar_buffer.get(cigar_range);
    let matching = matching_bases(elements);
    let longest_gap = longest_gap(elements);
    if matching < min_identity || aln.score < min_score || longest_gap > nominal.max_aligned_gap_length {
        log::trace!(
            "candidate {}:{:?} {:?}: score {} identity {} gap {} under thresholds",
            region.begin_position,
            region.strand,
            mode,
            aln.score,
            matching,
            longest_gap
        );
        cigar_buffer.release(cigar_range);
        return Ok(CandidateOutcome::Rejected);
    }

    if params.cigar_curation {
        let (curated, trimmed) = cigar::curate_ends(elements, nominal.cigar_curation_min_end_context);
        if curated.as_slice() != elements {
            cigar_buffer.release(cigar_range);
            cigar_range = cigar_buffer.append_slice(&curated);
            text_begin += trimmed;
        }
    }

    let elements = cigar_buffer.get(cigar_range);
    let mut trace = MatchTrace::new(window.begin + sub_begin + text_begin, region.strand, cigar_range);
    trace.swg_score = swg_score_cigar(
        &params.swg_penalties,
        key,
        sub_text,
        text_begin as usize,
        elements,
    );
    trace.distance = cigar::compute_edit_distance(elements);
    trace.edit_distance = cigar::compute_edit_distance_excluding_clipping(elements);
    trace.text_trace = Some(window.handle);
    trace.scaffold_type = scaffold.scaffold_type();

    let end = trace.position + cigar::effective_length(elements);
    if !ctx.text.is_contained(trace.position, end) {
        log::trace!("candidate {}: alignment spans two sequences", region.begin_position);
        cigar_buffer.release(cigar_range);
        return Ok(CandidateOutcome::Rejected);
    }

    Ok(match matches.add_match_trace(trace)? {
        AddMatchOutcome::Inserted(index) | AddMatchOutcome::Replaced(index) => {
            CandidateOutcome::Accepted(index)
        }
        AddMatchOutcome::Rejected => CandidateOutcome::Duplicate,
    })
}

/// Key bases aligned to an identical text base
fn matching_bases(cigar: &[CigarElement]) -> u64 {
    cigar
        .iter()
        .filter(|e| e.op == CigarOp::Match)
        .map(|e| e.length as u64)
        .sum()
}

fn longest_gap(cigar: &[CigarElement]) -> u64 {
    cigar
        .iter()
        .filter(|e| matches!(e.op, CigarOp::Insertion | CigarOp::Deletion))
        .map(|e| e.length as u64)
        .max()
        .unwrap_or(0)
}
