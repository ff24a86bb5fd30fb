//! Per-read driver.
//!
//! ```text
//! read -> CandidateProducer -> FilteringCandidates -> verify -> Matches -> select
//! ```
//!
//! Every read owns its candidates and match store. Reads are independent, so
//! [`map_reads_parallel`] fans them out on the rayon pool; a failed read is
//! logged and reported in its own slot without stopping the others.
//! [`map_reads_batched`] runs the filtering step of a window of reads through
//! one BPM batch buffer instead.

use rayon::prelude::*;

use crate::compute::bpm_buffer::BpmBatchBuffer;
use crate::core::dna::encode_sequence;
use crate::core::text::TextSource;
use crate::error::Result;
use crate::pipelines::filtering::batch::{verify_candidates_batched, ReadState};
use crate::pipelines::filtering::candidates::{CandidateLocator, FilteringCandidates};
use crate::pipelines::filtering::verify::{verify_candidates, ReadKeys, VerifyContext, VerifyStats};
use crate::pipelines::matches::classify::{MatchClassifier, MatchesClass};
use crate::pipelines::matches::select::{select_matches, SelectParameters, SelectStages};
use crate::pipelines::matches::store::Matches;
use crate::pipelines::search_params::{NominalParameters, SearchParameters};

/// Source of candidates for a read (an index search, in practice)
pub trait CandidateProducer: Send + Sync {
    /// Queue the candidates of `read` (encoded) and return the highest
    /// stratum up to which the search was complete.
    fn generate(
        &self,
        read: &[u8],
        nominal: &NominalParameters,
        candidates: &mut FilteringCandidates,
    ) -> u64;
}

/// Everything shared by the reads of a run
pub struct MapperContext<'a> {
    pub params: &'a SearchParameters,
    pub select: &'a SelectParameters,
    pub classifier: &'a dyn MatchClassifier,
    pub text: &'a dyn TextSource,
    pub locator: &'a dyn CandidateLocator,
    pub producer: &'a dyn CandidateProducer,
}

impl MapperContext<'_> {
    fn verify_context(&self) -> VerifyContext<'_> {
        VerifyContext {
            params: self.params,
            text: self.text,
            locator: self.locator,
        }
    }
}

/// Outcome of mapping one read
#[derive(Debug)]
pub struct MappedRead {
    pub class: MatchesClass,
    pub matches: Matches,
    pub stats: VerifyStats,
}

fn prepare_read(ctx: &MapperContext<'_>, read: &[u8]) -> ReadState {
    let encoded = encode_sequence(read);
    let mut state = ReadState::new(ReadKeys::new(&encoded, ctx.params));
    state.matches.hint_allocate_match_trace(ctx.select.max_decoded_matches as usize);
    let mcs = ctx
        .producer
        .generate(&encoded, &state.keys.nominal, &mut state.candidates);
    state.matches.max_complete_stratum = mcs;
    state
}

fn finish_read(ctx: &MapperContext<'_>, mut state: ReadState, stats: VerifyStats) -> MappedRead {
    let read_length = state.keys.len() as u64;
    let class = select_matches(
        &mut state.matches,
        ctx.select,
        SelectStages::default(),
        ctx.classifier,
        &ctx.params.swg_penalties,
        read_length,
        ctx.text,
    );
    MappedRead {
        class,
        matches: state.matches,
        stats,
    }
}

/// Map one read (ASCII bases)
pub fn map_read(ctx: &MapperContext<'_>, read: &[u8]) -> Result<MappedRead> {
    let mut state = prepare_read(ctx, read);
    let stats = verify_candidates(
        &mut state.candidates,
        &state.keys,
        &ctx.verify_context(),
        &mut state.matches,
    )?;
    Ok(finish_read(ctx, state, stats))
}

/// Map reads on the rayon pool. Results keep the order of `reads`.
pub fn map_reads_parallel<R>(ctx: &MapperContext<'_>, reads: &[R]) -> Vec<Result<MappedRead>>
where
    R: AsRef<[u8]> + Sync,
{
    let results: Vec<Result<MappedRead>> = reads
        .par_iter()
        .enumerate()
        .map(|(index, read)| {
            map_read(ctx, read.as_ref()).inspect_err(|e| {
                log::warn!("mapper: read {} skipped: {}", index, e);
            })
        })
        .collect();
    let mapped = results
        .iter()
        .filter(|r| r.as_ref().is_ok_and(|m| m.class != MatchesClass::Unmapped))
        .count();
    log::debug!("mapper: {}/{} reads mapped", mapped, reads.len());
    results
}

/// Map a window of reads, filtering all their candidates through one batch
/// buffer. Buffer errors are structural and abort the window.
pub fn map_reads_batched<R>(
    ctx: &MapperContext<'_>,
    buffer: &mut BpmBatchBuffer,
    reads: &[R],
) -> Result<Vec<MappedRead>>
where
    R: AsRef<[u8]>,
{
    let mut states: Vec<ReadState> = reads
        .iter()
        .map(|read| prepare_read(ctx, read.as_ref()))
        .collect();
    let stats = verify_candidates_batched(buffer, &mut states, &ctx.verify_context())?;
    Ok(states
        .into_iter()
        .zip(stats)
        .map(|(state, stats)| finish_read(ctx, state, stats))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::text::ReferenceText;
    use crate::pipelines::filtering::candidates::TextPositionLocator;
    use crate::pipelines::matches::classify::ScoreGapClassifier;

    /// Proposes a fixed list of positions for every read
    struct FixedProducer(Vec<u64>);

    impl CandidateProducer for FixedProducer {
        fn generate(
            &self,
            _read: &[u8],
            nominal: &NominalParameters,
            candidates: &mut FilteringCandidates,
        ) -> u64 {
            for &position in &self.0 {
                candidates.add_interval(position, position + 1, 0, 16, 0);
            }
            nominal.complete_search_error
        }
    }

    #[test]
    fn test_map_read_reports_decoded_position() {
        let chrom1: Vec<u8> = (0..400).map(|i| b"ACGT"[(i * 7 + i / 5) % 4]).collect();
        let chrom2: Vec<u8> = (0..400).map(|i| b"TGCA"[(i * 3 + i / 7) % 4]).collect();
        let reference = ReferenceText::from_sequences([("chr1", chrom1.as_slice()), ("chr2", chrom2.as_slice())]);
        let read = chrom2[100..180].to_vec();

        let params = SearchParameters::default();
        let select = SelectParameters::default();
        let classifier = ScoreGapClassifier::default();
        let producer = FixedProducer(vec![500]);
        let ctx = MapperContext {
            params: &params,
            select: &select,
            classifier: &classifier,
            text: &reference,
            locator: &TextPositionLocator,
            producer: &producer,
        };
        let results = map_reads_parallel(&ctx, &[read.clone(), read]);
        assert_eq!(results.len(), 2);
        for result in results {
            let mapped = result.unwrap();
            assert_eq!(mapped.class, MatchesClass::Unique);
            let trace = &mapped.matches.get_match_traces()[0];
            assert_eq!(trace.sequence_name.as_deref(), Some("chr2"));
            assert_eq!(trace.sequence_position, 100);
            assert_eq!(mapped.matches.cigar_string(trace), "80=");
        }
    }
}
