//! Batched verification through a [`BpmBatchBuffer`].
//!
//! Candidates of many reads are packed into one buffer. Every candidate gets
//! one slot per pattern chunk; the device verifies each chunk against the
//! whole candidate window, and the sum of the chunk distances is an
//! admissible bound on the distance of the whole key. Survivors are realigned
//! on the CPU exactly as in [`verify_candidates`](super::verify::verify_candidates).
//!
//! When the buffer is full it is flushed (send, receive, realign, clear) and
//! packing resumes. Results are consumed only through the slot positions
//! recorded while packing, so the order of reads inside a batch is
//! irrelevant.

use super::candidates::{CandidateRegion, FilteringCandidates};
use super::verify::{
    fetch_candidate_window, realign_candidate, CandidateOutcome, CandidateWindow, ReadKeys,
    VerifyContext, VerifyStats,
};
use crate::compute::bpm_buffer::{self, BpmBatchBuffer, BpmBatchDimensions, BpmChunkLayout};
use crate::core::alignment::swg::SwgMode;
use crate::core::alignment::types::{Strand, ALIGN_COLUMN_INF};
use crate::error::Result;
use crate::pipelines::matches::store::Matches;
use crate::pipelines::search_params::LocalAlignment;

/// Everything verification needs to keep per read
#[derive(Debug)]
pub struct ReadState {
    pub keys: ReadKeys,
    pub candidates: FilteringCandidates,
    pub matches: Matches,
}

impl ReadState {
    pub fn new(keys: ReadKeys) -> Self {
        Self {
            keys,
            candidates: FilteringCandidates::new(),
            matches: Matches::new(),
        }
    }
}

/// One packed candidate
struct PackedCandidate {
    read: usize,
    region: usize,
    window: CandidateWindow,
    first_slot: u64,
    num_chunks: u64,
}

struct ReadRegions {
    regions: Vec<CandidateRegion>,
    windows: Vec<CandidateWindow>,
    /// Regions rejected by global alignment, kept for the local pass
    backlog: Vec<usize>,
}

/// Verify the pending candidates of every read in `reads` through `buffer`.
///
/// The buffer must be idle and available; it is left cleared.
pub fn verify_candidates_batched(
    buffer: &mut BpmBatchBuffer,
    reads: &mut [ReadState],
    ctx: &VerifyContext<'_>,
) -> Result<Vec<VerifyStats>> {
    let mut stats = vec![VerifyStats::default(); reads.len()];
    let mut composed: Vec<ReadRegions> = Vec::with_capacity(reads.len());
    for (read, state) in reads.iter_mut().enumerate() {
        let key_length = state.keys.len() as u64;
        let max_error = state.keys.nominal.max_error;
        let regions = state
            .candidates
            .compose_pending(ctx.locator, key_length, max_error);
        stats[read].candidates = regions.len();
        if state.keys.is_empty() {
            stats[read].discarded = regions.len();
            composed.push(ReadRegions {
                regions: Vec::new(),
                windows: Vec::new(),
                backlog: Vec::new(),
            });
            continue;
        }
        let windows = regions
            .iter()
            .map(|r| fetch_candidate_window(r, key_length, max_error, ctx.text, &mut state.matches))
            .collect();
        composed.push(ReadRegions {
            regions,
            windows,
            backlog: Vec::new(),
        });
    }

    let mut packed: Vec<PackedCandidate> = Vec::new();
    for read in 0..reads.len() {
        for strand in [Strand::Forward, Strand::Reverse] {
            let group: Vec<usize> = composed[read]
                .regions
                .iter()
                .enumerate()
                .filter(|(_, r)| r.strand == strand)
                .map(|(i, _)| i)
                .collect();
            if group.is_empty() {
                continue;
            }
            let layout = {
                let keys = &reads[read].keys;
                bpm_buffer::compile(&keys.strand(strand).pattern, keys.nominal.max_error)
            };
            let mut next = 0;
            while next < group.len() {
                let mut dims = BpmBatchDimensions::default();
                buffer.compute_dimensions(&layout, 1, &mut dims);
                if !buffer.fits_in_buffer(
                    dims.total_entries,
                    dims.total_query_chunks,
                    dims.total_candidate_chunks,
                )? {
                    flush(buffer, &mut packed, reads, &mut composed, &mut stats, ctx)?;
                    continue;
                }
                // The pattern is packed again after a flush; candidates always
                // refer to the last packed pattern
                let keys = &reads[read].keys;
                buffer.add_pattern(&keys.strand(strand).pattern, &layout)?;
                while next < group.len()
                    && buffer.get_num_candidates() + layout.num_chunks <= buffer.get_max_candidates()
                {
                    let region = group[next];
                    let window = composed[read].windows[region];
                    let first_slot = pack_candidate(buffer, &layout, &window)?;
                    packed.push(PackedCandidate {
                        read,
                        region,
                        window,
                        first_slot,
                        num_chunks: layout.num_chunks,
                    });
                    next += 1;
                }
            }
        }
    }
    if !buffer.is_empty() {
        flush(buffer, &mut packed, reads, &mut composed, &mut stats, ctx)?;
    }

    // Local pass per read, as in the CPU driver
    for (read, state) in reads.iter_mut().enumerate() {
        let local = match ctx.params.local_alignment {
            LocalAlignment::Never => false,
            LocalAlignment::IfUnmapped => !state.matches.is_mapped(),
            LocalAlignment::Always => true,
        };
        let read_regions = &composed[read];
        for &region in &read_regions.backlog {
            let outcome = if local {
                realign_candidate(
                    &read_regions.regions[region],
                    &read_regions.windows[region],
                    None,
                    &state.keys,
                    ctx,
                    &mut state.matches,
                    SwgMode::Local,
                )?
            } else {
                CandidateOutcome::Rejected
            };
            stats[read].record(outcome);
        }
    }
    Ok(stats)
}

fn pack_candidate(
    buffer: &mut BpmBatchBuffer,
    layout: &BpmChunkLayout,
    window: &CandidateWindow,
) -> Result<u64> {
    let mut first_slot = None;
    for chunk in 0..layout.num_chunks {
        let slot = buffer.add_candidate(window.begin, window.length, chunk)?;
        first_slot.get_or_insert(slot);
    }
    Ok(first_slot.unwrap_or_default())
}

/// Round trip the buffer and realign what survived
fn flush(
    buffer: &mut BpmBatchBuffer,
    packed: &mut Vec<PackedCandidate>,
    reads: &mut [ReadState],
    composed: &mut [ReadRegions],
    stats: &mut [VerifyStats],
    ctx: &VerifyContext<'_>,
) -> Result<()> {
    buffer.send()?;
    buffer.receive()?;
    log::debug!(
        "batch: {} candidates from {} slots received",
        packed.len(),
        buffer.get_num_candidates()
    );
    for candidate in packed.drain(..) {
        let state = &mut reads[candidate.read];
        let max_error = state.keys.nominal.max_error;
        let mut bound = 0u64;
        let mut last_column = ALIGN_COLUMN_INF;
        for slot in candidate.first_slot..candidate.first_slot + candidate.num_chunks {
            let (distance, column) = buffer.get_candidate_result(slot)?;
            bound = bound.saturating_add(distance);
            last_column = column;
        }
        let outcome = if bound > max_error || last_column == ALIGN_COLUMN_INF {
            CandidateOutcome::Discarded
        } else {
            // A single chunk gives the exact distance and end column
            let known = (candidate.num_chunks == 1).then_some((bound, last_column));
            let region = &composed[candidate.read].regions[candidate.region];
            realign_candidate(
                region,
                &candidate.window,
                known,
                &state.keys,
                ctx,
                &mut state.matches,
                SwgMode::Global,
            )?
        };
        if outcome == CandidateOutcome::Rejected && ctx.params.local_alignment != LocalAlignment::Never {
            composed[candidate.read].backlog.push(candidate.region);
        } else {
            stats[candidate.read].record(outcome);
        }
    }
    buffer.clear()
}
