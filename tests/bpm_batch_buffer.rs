// tests/bpm_batch_buffer.rs
// Batch buffer protocol and round trip through the host BPM device.
#![cfg(feature = "accelerator")]

use std::sync::Arc;

use ferrous_mapper::compute::bpm_buffer::{self, BpmBatchBuffer, BpmBatchDimensions, BufferState};
use ferrous_mapper::compute::device::HostBpmDevice;
use ferrous_mapper::compute::{open_bpm_device, BpmDeviceLimits, ComputeBackend};
use ferrous_mapper::core::alignment::bpm::BpmPattern;
use ferrous_mapper::core::dna::encode_sequence;
use ferrous_mapper::Error;
use proptest::prelude::*;

fn host_buffer(text: Vec<u8>, limits: BpmDeviceLimits) -> BpmBatchBuffer {
    BpmBatchBuffer::new(Box::new(HostBpmDevice::new(Arc::new(text), limits)))
}

#[test]
fn test_third_query_does_not_fit() {
    let text = encode_sequence(b"ACGTACGTTTGCAACGTACGGTACCA");
    let limits = BpmDeviceLimits {
        max_peq_entries: 16,
        max_queries: 2,
        max_candidates: 4,
    };
    let mut buffer = host_buffer(text, limits);
    assert_eq!(buffer.get_max_queries(), 2);
    assert_eq!(buffer.get_max_candidates(), 4);

    for key in [&b"ACGTACGT"[..], &b"GCAACG"[..]] {
        let pattern = BpmPattern::compile(&encode_sequence(key));
        let layout = bpm_buffer::compile(&pattern, 2);
        let mut dims = BpmBatchDimensions::default();
        buffer.compute_dimensions(&layout, 2, &mut dims);
        assert!(buffer
            .fits_in_buffer(dims.total_entries, dims.total_query_chunks, dims.total_candidate_chunks)
            .unwrap());
        buffer.add_pattern(&pattern, &layout).unwrap();
        buffer.add_candidate(0, 12, 0).unwrap();
        buffer.add_candidate(10, 12, 0).unwrap();
    }

    let pattern = BpmPattern::compile(&encode_sequence(b"GGTACC"));
    let layout = bpm_buffer::compile(&pattern, 2);
    let mut dims = BpmBatchDimensions::default();
    buffer.compute_dimensions(&layout, 1, &mut dims);
    let fits = buffer
        .fits_in_buffer(dims.total_entries, dims.total_query_chunks, dims.total_candidate_chunks)
        .unwrap();
    assert!(!fits);
    assert_eq!(buffer.get_num_queries(), 2);
    assert_eq!(buffer.get_num_candidates(), 4);
    assert_eq!(buffer.get_num_peq_entries(), 2);
    assert!(matches!(buffer.add_pattern(&pattern, &layout), Err(Error::BufferOverflow(_))));
    assert_eq!(buffer.get_num_queries(), 2);
}

#[test]
fn test_oversized_pattern_is_fatal() {
    let limits = BpmDeviceLimits {
        max_peq_entries: 1,
        max_queries: 8,
        max_candidates: 8,
    };
    let buffer = host_buffer(vec![0; 10], limits);
    let pattern = BpmPattern::compile(&vec![1u8; 200]);
    let layout = bpm_buffer::compile(&pattern, 10);
    let mut dims = BpmBatchDimensions::default();
    buffer.compute_dimensions(&layout, 1, &mut dims);
    assert!(matches!(
        buffer.fits_in_buffer(dims.total_entries, dims.total_query_chunks, dims.total_candidate_chunks),
        Err(Error::PatternTooLarge { entries: 2, max: 1 })
    ));
}

#[test]
fn test_protocol_violations() {
    let mut buffer = host_buffer(vec![0; 10], BpmDeviceLimits::default());
    assert!(matches!(buffer.receive(), Err(Error::InvalidBufferState { .. })));
    assert!(matches!(buffer.get_candidate_result(0), Err(Error::InvalidBufferState { .. })));

    let pattern = BpmPattern::compile(&[0, 0, 0]);
    let layout = bpm_buffer::compile(&pattern, 1);
    buffer.add_pattern(&pattern, &layout).unwrap();
    buffer.add_candidate(0, 10, 0).unwrap();
    buffer.send().unwrap();
    assert_eq!(buffer.state(), BufferState::InFlight);
    assert!(matches!(buffer.add_candidate(0, 10, 0), Err(Error::InvalidBufferState { .. })));
    assert!(matches!(buffer.clear(), Err(Error::InvalidBufferState { .. })));
    buffer.receive().unwrap();
    assert_eq!(buffer.get_candidate_result(0).unwrap(), (0, 2));
    assert_eq!(buffer.get_candidate(0).unwrap(), (0, 10));
    buffer.clear().unwrap();
    assert!(buffer.is_empty());
}

#[test]
fn test_cpu_backend_opens_stub() {
    let mut buffer = BpmBatchBuffer::new(open_bpm_device(
        ComputeBackend::Cpu,
        Arc::new(vec![0; 4]),
        BpmDeviceLimits::default(),
    ));
    assert!(!buffer.is_available());
    assert!(matches!(buffer.fits_in_buffer(1, 1, 1), Err(Error::AcceleratorUnavailable)));
    assert!(matches!(buffer.send(), Err(Error::AcceleratorUnavailable)));
}

fn batch_input() -> impl Strategy<Value = (Vec<u8>, Vec<(Vec<u8>, u64, Vec<(u64, u64)>)>)> {
    let text = prop::collection::vec(0u8..4, 300..600);
    let patterns = prop::collection::vec(
        (
            prop::collection::vec(0u8..4, 1..300),
            0u64..40,
            prop::collection::vec((0u64..600, 1u64..200), 1..4),
        ),
        1..5,
    );
    (text, patterns)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn batch_round_trip_matches_direct_verification((text, patterns) in batch_input()) {
        let limits = BpmDeviceLimits {
            max_peq_entries: 64,
            max_queries: 64,
            max_candidates: 256,
        };
        let mut buffer = host_buffer(text.clone(), limits);
        let mut expected = Vec::new();
        for (key, max_error, candidates) in &patterns {
            let pattern = BpmPattern::compile(key);
            let layout = bpm_buffer::compile(&pattern, *max_error);
            buffer.add_pattern(&pattern, &layout).unwrap();
            for &(position, size) in candidates {
                for chunk in 0..layout.num_chunks {
                    let slot = buffer.add_candidate(position, size, chunk).unwrap();
                    let (begin, end) = layout.chunk_span(chunk);
                    let chunk_pattern = BpmPattern::compile(&key[begin as usize..end as usize]);
                    let lo = (position as usize).min(text.len());
                    let hi = ((position + size) as usize).min(text.len());
                    expected.push((slot, chunk_pattern.scan_min(&text[lo..hi])));
                }
            }
        }
        buffer.send().unwrap();
        buffer.receive().unwrap();
        for (slot, direct) in expected {
            prop_assert_eq!(buffer.get_candidate_result(slot).unwrap(), direct);
        }
    }
}
