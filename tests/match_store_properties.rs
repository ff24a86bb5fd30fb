// tests/match_store_properties.rs
// Deduplication and counter bookkeeping of the match store under arbitrary
// insertion sequences.

use ferrous_mapper::core::alignment::cigar::{CigarElement, CigarOp};
use ferrous_mapper::core::alignment::types::Strand;
use ferrous_mapper::pipelines::matches::store::{AddMatchOutcome, MatchTrace, Matches};
use proptest::prelude::*;
use std::collections::HashSet;

fn insert(matches: &mut Matches, position: u64, length: u32, strand: Strand, score: i32, distance: u64) -> AddMatchOutcome {
    let cigar = matches
        .cigar_buffer_mut()
        .append_slice(&[CigarElement::new(CigarOp::Match, length)]);
    let mut trace = MatchTrace::new(position, strand, cigar);
    trace.swg_score = score;
    trace.distance = distance;
    matches.add_match_trace(trace).unwrap()
}

#[test]
fn test_equal_score_duplicate_keeps_one_trace() {
    let mut matches = Matches::new();
    assert_eq!(insert(&mut matches, 1000, 100, Strand::Forward, 90, 2), AddMatchOutcome::Inserted(0));
    assert_eq!(insert(&mut matches, 1000, 100, Strand::Forward, 90, 2), AddMatchOutcome::Rejected);
    assert_eq!(matches.get_num_match_traces(), 1);
    assert_eq!(matches.counters().get_count(2), 1);
}

#[test]
fn test_higher_score_evicts_and_moves_counters() {
    let mut matches = Matches::new();
    insert(&mut matches, 1000, 100, Strand::Forward, 90, 2);
    assert_eq!(insert(&mut matches, 1000, 100, Strand::Forward, 95, 1), AddMatchOutcome::Replaced(0));
    assert_eq!(matches.get_num_match_traces(), 1);
    assert_eq!(matches.counters().get_count(2), 0);
    assert_eq!(matches.counters().get_count(1), 1);
    assert_eq!(matches.get_match_traces()[0].swg_score, 95);

    // Same coordinates on the other strand are a different match
    assert_eq!(insert(&mut matches, 1000, 100, Strand::Reverse, 50, 6), AddMatchOutcome::Inserted(1));
    assert_eq!(matches.counters().get_total_count(), 2);
}

#[test]
fn test_shared_end_is_a_duplicate() {
    let mut matches = Matches::new();
    insert(&mut matches, 1000, 100, Strand::Forward, 90, 2);
    // Begins 2 bases later but ends on the same base
    assert_eq!(insert(&mut matches, 1002, 98, Strand::Forward, 80, 3), AddMatchOutcome::Rejected);
    assert_eq!(matches.lookup_match(1002, 98, Strand::Forward), Some(0));
}

proptest! {
    #[test]
    fn counters_track_stored_traces(
        ops in prop::collection::vec((0u64..12, 0u32..3, any::<bool>(), 40i32..60, 0u64..6), 1..60)
    ) {
        let mut matches = Matches::new();
        for (slot, extra, reverse, score, distance) in ops {
            let strand = if reverse { Strand::Reverse } else { Strand::Forward };
            insert(&mut matches, slot * 10, 50 + extra, strand, score, distance);

            let traces = matches.get_match_traces();
            prop_assert_eq!(matches.counters().get_total_count(), traces.len() as u64);
            for d in 0..6 {
                let stored = traces.iter().filter(|t| t.distance == d).count() as u64;
                prop_assert_eq!(matches.counters().get_count(d), stored);
            }
            // No two stored traces share a begin or an end on one strand
            let begins: HashSet<_> = traces.iter().map(|t| (t.position, t.strand)).collect();
            let ends: HashSet<_> = traces.iter().map(|t| (t.end_position(), t.strand)).collect();
            prop_assert_eq!(begins.len(), traces.len());
            prop_assert_eq!(ends.len(), traces.len());
            // Every stored trace is reachable through the index
            for (index, trace) in traces.iter().enumerate() {
                prop_assert_eq!(
                    matches.lookup_match(trace.position, trace.effective_length, trace.strand),
                    Some(index)
                );
            }
        }
    }
}
