// tests/alignment_properties.rs
// Lower bounds used by candidate filtering must never overshoot the real
// edit distance, and the aligners must agree with each other.

use ferrous_mapper::core::alignment::bpm::{bpm_verify, BpmPattern};
use ferrous_mapper::core::alignment::cigar::CigarBuffer;
use ferrous_mapper::core::alignment::edit_distance::{alignment_check, edit_distance, edit_distance_align};
use ferrous_mapper::core::alignment::kmer_filter::kmer_distance_bound;
use ferrous_mapper::core::alignment::swg::{swg_align, swg_score_cigar, SwgMode, SwgPenalties};
use ferrous_mapper::core::alignment::tiles::{alignment_init, alignment_verify_levenshtein, AlignmentFilters};
use ferrous_mapper::core::alignment::types::{Alignment, ALIGN_DISTANCE_INF};
use proptest::prelude::*;

fn encoded(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..4, 1..max_len)
}

/// A text derived from `key` by a handful of point edits, so that the
/// interesting small-distance cases are actually exercised
fn mutated(key: &[u8], edits: &[(usize, u8, u8)]) -> Vec<u8> {
    let mut text = key.to_vec();
    for &(at, kind, base) in edits {
        if text.is_empty() {
            break;
        }
        let at = at % text.len();
        match kind % 3 {
            0 => text[at] = base,
            1 => text.insert(at, base),
            _ => {
                text.remove(at);
            }
        }
    }
    text
}

fn related_pair() -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
    (
        encoded(160),
        prop::collection::vec((0usize..1000, 0u8..3, 0u8..4), 0..8),
        encoded(20),
        encoded(20),
    )
        .prop_map(|(key, edits, left, right)| {
            let mut text = left;
            text.extend(mutated(&key, &edits));
            text.extend(right);
            (key, text)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn ends_free_never_exceeds_global(key in encoded(60), text in encoded(80)) {
        let (global, _) = edit_distance(&key, &text, false).unwrap();
        let (free, _) = edit_distance(&key, &text, true).unwrap();
        prop_assert!(free <= global);
    }

    #[test]
    fn kmer_bound_is_admissible((key, text) in related_pair(), k in 3usize..7) {
        let (distance, _) = edit_distance(&key, &text, true).unwrap();
        prop_assert!(kmer_distance_bound(&key, &text, k) <= distance);
    }

    #[test]
    fn bpm_matches_dynamic_programming((key, text) in related_pair()) {
        let (distance, _) = edit_distance(&key, &text, true).unwrap();
        let (bpm_distance, _) = BpmPattern::compile(&key).scan_min(&text);
        prop_assert_eq!(bpm_distance, distance);

        let bounded = bpm_verify(&key, &text, distance);
        prop_assert_eq!(bounded.0, distance);
        if distance > 0 {
            prop_assert_eq!(bpm_verify(&key, &text, distance - 1).0, ALIGN_DISTANCE_INF);
        }
    }

    #[test]
    fn tile_bound_is_admissible((key, text) in related_pair(), max_error in 0u64..24) {
        let filters = AlignmentFilters::compile(&key, 48, 4);
        let mut alignment = Alignment::default();
        alignment_init(&mut alignment, &filters, text.len() as u64, max_error);
        alignment_verify_levenshtein(&mut alignment, &filters, &key, &text, max_error);

        let (distance, _) = edit_distance(&key, &text, true).unwrap();
        if alignment.is_discarded() {
            prop_assert!(distance > max_error);
        } else {
            prop_assert!(alignment.distance_min_bound <= distance);
        }
    }

    #[test]
    fn traceback_reproduces_distance((key, text) in related_pair()) {
        let mut cigar_buffer = CigarBuffer::new();
        let aln = edit_distance_align(&key, &text, true, &mut cigar_buffer).unwrap();
        let cigar = cigar_buffer.get(aln.cigar);
        prop_assert!(alignment_check(&key, &text, aln.text_begin as usize, cigar));
        prop_assert_eq!(ferrous_mapper::core::alignment::cigar::compute_edit_distance(cigar), aln.distance);
    }

    #[test]
    fn swg_cigar_rescores_to_reported_score((key, text) in related_pair()) {
        let penalties = SwgPenalties::default();
        let mut cigar_buffer = CigarBuffer::new();
        let aln = swg_align(&key, &text, &penalties, SwgMode::Global, &mut cigar_buffer).unwrap();
        let cigar = cigar_buffer.get(aln.cigar);
        prop_assert!(alignment_check(&key, &text, aln.text_begin as usize, cigar));
        prop_assert_eq!(
            swg_score_cigar(&penalties, &key, &text, aln.text_begin as usize, cigar),
            aln.score
        );
    }

    #[test]
    fn local_score_dominates_global((key, text) in related_pair()) {
        let penalties = SwgPenalties::default();
        let mut cigar_buffer = CigarBuffer::new();
        let global = swg_align(&key, &text, &penalties, SwgMode::Global, &mut cigar_buffer).unwrap();
        let local = swg_align(&key, &text, &penalties, SwgMode::Local, &mut cigar_buffer).unwrap();
        prop_assert!(local.score >= global.score);
    }
}
