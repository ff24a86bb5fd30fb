// benches/verify_perf.rs
// Criterion benchmarks for the verification kernels and the two filtering
// drivers (per-candidate CPU and batched through the host BPM device).

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use ferrous_mapper::compute::bpm_buffer::BpmBatchBuffer;
use ferrous_mapper::compute::{open_bpm_device, BpmDeviceLimits, ComputeBackend};
use ferrous_mapper::core::alignment::bpm::BpmPattern;
use ferrous_mapper::core::alignment::cigar::CigarBuffer;
use ferrous_mapper::core::alignment::kmer_filter::KmerCountingFilter;
use ferrous_mapper::core::alignment::swg::{swg_align, SwgMode, SwgPenalties};
use ferrous_mapper::core::alignment::tiles::{alignment_init, alignment_verify_levenshtein, AlignmentFilters};
use ferrous_mapper::core::alignment::types::Alignment;
use ferrous_mapper::core::dna::encode_sequence;
use ferrous_mapper::core::text::ReferenceText;
use ferrous_mapper::pipelines::filtering::batch::{verify_candidates_batched, ReadState};
use ferrous_mapper::pipelines::filtering::candidates::{FilteringCandidates, TextPositionLocator};
use ferrous_mapper::pipelines::filtering::verify::{verify_candidates, ReadKeys, VerifyContext};
use ferrous_mapper::pipelines::matches::store::Matches;
use ferrous_mapper::pipelines::search_params::SearchParameters;

fn random_encoded(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen_range(0..4)).collect()
}

/// `key` placed in a window with `edits` substitutions and random flanks
fn make_candidate(rng: &mut StdRng, len: usize, edits: usize, flank: usize) -> (Vec<u8>, Vec<u8>) {
    let key = random_encoded(rng, len);
    let mut text = random_encoded(rng, flank);
    let mut body = key.clone();
    for _ in 0..edits {
        let at = rng.gen_range(0..len);
        body[at] = (body[at] + 1) % 4;
    }
    text.extend(body);
    text.extend(random_encoded(rng, flank));
    (key, text)
}

fn bench_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernels");
    let mut rng = StdRng::seed_from_u64(0x5EED_BA5E);
    let penalties = SwgPenalties::default();

    for len in [100usize, 150, 250] {
        let (key, text) = make_candidate(&mut rng, len, len / 25, 15);
        group.throughput(Throughput::Bytes(text.len() as u64));

        let pattern = BpmPattern::compile(&key);
        group.bench_function(format!("bpm_len{len}"), |b| {
            b.iter(|| black_box(pattern.verify(black_box(&text), (len / 8) as u64)))
        });

        let kmers = KmerCountingFilter::compile(&key, 5);
        group.bench_function(format!("kmer_len{len}"), |b| {
            b.iter(|| black_box(kmers.min_distance_bound(black_box(&text))))
        });

        let filters = AlignmentFilters::compile(&key, 128, 5);
        let mut alignment = Alignment::default();
        group.bench_function(format!("tiles_len{len}"), |b| {
            b.iter(|| {
                alignment_init(&mut alignment, &filters, text.len() as u64, (len / 8) as u64);
                alignment_verify_levenshtein(&mut alignment, &filters, &key, &text, (len / 8) as u64);
                black_box(alignment.distance_min_bound)
            })
        });

        let mut cigar_buffer = CigarBuffer::new();
        group.bench_function(format!("swg_global_len{len}"), |b| {
            b.iter(|| {
                cigar_buffer.clear();
                black_box(swg_align(&key, &text, &penalties, SwgMode::Global, &mut cigar_buffer).map(|a| a.score))
            })
        });
    }
    group.finish();
}

struct Workload {
    reference: ReferenceText,
    reads: Vec<(Vec<u8>, Vec<u64>)>,
}

/// 64 reads of 150bp, each with its true locus and three decoys
fn make_workload() -> Workload {
    let mut rng = StdRng::seed_from_u64(0xF00D);
    let chrom: Vec<u8> = (0..200_000).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect();
    let reference = ReferenceText::from_sequences([("chr1", chrom.as_slice())]);
    let reads = (0..64)
        .map(|_| {
            let locus = rng.gen_range(1000..chrom.len() - 1000);
            let mut read = chrom[locus..locus + 150].to_vec();
            for _ in 0..3 {
                let at = rng.gen_range(0..150);
                read[at] = if read[at] == b'A' { b'C' } else { b'A' };
            }
            let mut loci = vec![locus as u64];
            loci.extend((0..3).map(|_| rng.gen_range(1000..chrom.len() as u64 - 1000)));
            (encode_sequence(&read), loci)
        })
        .collect();
    Workload { reference, reads }
}

fn fill(candidates: &mut FilteringCandidates, loci: &[u64]) {
    for &locus in loci {
        candidates.add_interval(locus, locus + 1, 0, 20, 0);
    }
}

fn bench_drivers(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_drivers");
    let workload = make_workload();
    let params = SearchParameters::default();
    let ctx = VerifyContext {
        params: &params,
        text: &workload.reference,
        locator: &TextPositionLocator,
    };
    let keys: Vec<ReadKeys> = workload
        .reads
        .iter()
        .map(|(read, _)| ReadKeys::new(read, &params))
        .collect();
    group.throughput(Throughput::Elements(workload.reads.len() as u64));

    group.bench_function("cpu", |b| {
        b.iter_batched(
            || {
                workload
                    .reads
                    .iter()
                    .map(|(_, loci)| {
                        let mut candidates = FilteringCandidates::new();
                        fill(&mut candidates, loci);
                        candidates
                    })
                    .collect::<Vec<_>>()
            },
            |mut all| {
                for (candidates, keys) in all.iter_mut().zip(&keys) {
                    let mut matches = Matches::new();
                    black_box(verify_candidates(candidates, keys, &ctx, &mut matches).ok());
                }
            },
            BatchSize::SmallInput,
        )
    });

    if ComputeBackend::BpmAccelerator.is_accelerated() {
        let limits = BpmDeviceLimits::from_buffer_size(1 << 20, 150, 20);
        let device = open_bpm_device(ComputeBackend::BpmAccelerator, workload.reference.shared_text(), limits);
        let mut buffer = BpmBatchBuffer::new(device);
        group.bench_function("batched", |b| {
            b.iter_batched(
                || {
                    workload
                        .reads
                        .iter()
                        .zip(&keys)
                        .map(|((_, loci), keys)| {
                            let mut state = ReadState::new(keys.clone());
                            fill(&mut state.candidates, loci);
                            state
                        })
                        .collect::<Vec<_>>()
                },
                |mut states| black_box(verify_candidates_batched(&mut buffer, &mut states, &ctx).ok()),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_kernels, bench_drivers);
criterion_main!(benches);
