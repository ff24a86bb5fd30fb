// src/defaults.rs

// Error model (values < 1.0 are fractions of the read length)
pub const COMPLETE_SEARCH_ERROR: f64 = 0.04;
pub const COMPLETE_STRATA_AFTER_BEST: f64 = 1.0;
pub const ALIGNMENT_MAX_ERROR: f64 = 0.12;
pub const ALIGNMENT_MAX_BANDWIDTH: f64 = 0.20;
pub const ALIGNMENT_GLOBAL_MIN_IDENTITY: f64 = 0.80;
pub const ALIGNMENT_GLOBAL_MIN_SWG_THRESHOLD: f64 = 0.20; // x read_length x match_score
pub const ALIGNMENT_LOCAL_MIN_IDENTITY: f64 = 40.0;
pub const ALIGNMENT_LOCAL_MIN_SWG_THRESHOLD: f64 = 20.0;
pub const ALIGNMENT_MAX_ALIGNED_GAP_LENGTH: f64 = 100.0;
pub const FORCE_FULL_SWG: bool = false;
pub const SCAFFOLDING_MIN_COVERAGE: f64 = 0.80;
pub const SCAFFOLDING_MIN_MATCHING_LENGTH: f64 = 10.0;
pub const CIGAR_CURATION: bool = true;
pub const CIGAR_CURATION_MIN_END_CONTEXT: f64 = 2.0;

// Scoring Constants
pub const MATCH_SCORE: i32 = 1;
pub const MISMATCH_PENALTY: i32 = 4;
pub const GAP_OPEN_PENALTY: i32 = 6;
pub const GAP_EXTEND_PENALTY: i32 = 1;

// Verification
pub const KMER_LENGTH: usize = 5;
pub const TILE_LENGTH: usize = 128;

// Selection
pub const MAPQ_THRESHOLD: u8 = 0;
pub const MIN_DECODED_STRATA: u64 = 0;
pub const MAX_DECODED_MATCHES: u64 = 20;
pub const MIN_REPORTED_MATCHES: u64 = 1;
pub const MAX_REPORTED_MATCHES: u64 = 100;
pub const CURATION_SWG_SCORE_DIFFERENCE: f64 = 0.30;

// Batched verification
pub const DEVICE_BUFFER_SIZE: u64 = 4 << 20;
pub const DEVICE_AVERAGE_QUERY_LENGTH: u64 = 150;
pub const DEVICE_CANDIDATES_PER_QUERY: u64 = 20;
