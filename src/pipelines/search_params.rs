//! Search and alignment configuration.
//!
//! Thresholds are stored as nominal values: anything below 1.0 is a fraction
//! of the read length, anything from 1.0 up is an absolute count. They are
//! turned into integers for one read by [`SearchParameters::instantiate_values`].

use crate::core::alignment::swg::SwgPenalties;
use crate::core::dna::{dna_encode, is_dna, DNA_RANGE, ENC_DNA_CHAR_N};
use crate::defaults;
use crate::error::{Error, Result};
use crate::pipelines::matches::scaffold::ScaffoldType;

/// When to fall back to local alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalAlignment {
    Never,
    /// Only when no global alignment passed the thresholds
    #[default]
    IfUnmapped,
    Always,
}

/// Fraction-or-absolute conversion used by every nominal threshold.
/// Fractions are truncated.
#[inline]
pub fn integer_proportion(value: f64, length: u64) -> u64 {
    if value < 0.0 {
        0
    } else if value < 1.0 {
        // Absorb representation error (0.12 * 100 must give 12)
        (value * length as f64 + 1e-9).floor() as u64
    } else {
        value as u64
    }
}

/// Thresholds for one read, in bases or score units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NominalParameters {
    pub pattern_length: u64,
    pub complete_search_error: u64,
    pub complete_strata_after_best: u64,
    pub max_error: u64,
    pub max_bandwidth: u64,
    pub global_min_identity: u64,
    pub global_min_swg_threshold: i32,
    pub local_min_identity: u64,
    pub local_min_swg_threshold: i32,
    pub max_aligned_gap_length: u64,
    pub scaffolding_min_coverage: u64,
    pub scaffolding_min_matching_length: u64,
    pub cigar_curation_min_end_context: u64,
}

#[derive(Debug, Clone)]
pub struct SearchParameters {
    // Error model
    pub complete_search_error: f64,
    pub complete_strata_after_best: f64,
    pub alignment_max_error: f64,
    pub alignment_max_bandwidth: f64,
    pub alignment_global_min_identity: f64,
    pub alignment_global_min_swg_threshold: f64,
    pub local_alignment: LocalAlignment,
    pub alignment_local_min_identity: f64,
    pub alignment_local_min_swg_threshold: f64,
    pub alignment_max_aligned_gap_length: f64,
    pub force_full_swg: bool,
    pub alignment_scaffolding_min_coverage: f64,
    pub alignment_scaffolding_min_matching_length: f64,
    /// Most expensive scaffold refinement the verifier may attempt
    pub scaffolding_max_level: ScaffoldType,
    pub cigar_curation: bool,
    pub cigar_curation_min_end_context: f64,

    // Scoring
    pub swg_penalties: SwgPenalties,

    // Verification filters
    pub kmer_length: usize,
    pub tile_length: usize,

    // Replacements
    pub allowed_enc: [bool; DNA_RANGE],
    pub replacements: Vec<u8>,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            complete_search_error: defaults::COMPLETE_SEARCH_ERROR,
            complete_strata_after_best: defaults::COMPLETE_STRATA_AFTER_BEST,
            alignment_max_error: defaults::ALIGNMENT_MAX_ERROR,
            alignment_max_bandwidth: defaults::ALIGNMENT_MAX_BANDWIDTH,
            alignment_global_min_identity: defaults::ALIGNMENT_GLOBAL_MIN_IDENTITY,
            alignment_global_min_swg_threshold: defaults::ALIGNMENT_GLOBAL_MIN_SWG_THRESHOLD,
            local_alignment: LocalAlignment::IfUnmapped,
            alignment_local_min_identity: defaults::ALIGNMENT_LOCAL_MIN_IDENTITY,
            alignment_local_min_swg_threshold: defaults::ALIGNMENT_LOCAL_MIN_SWG_THRESHOLD,
            alignment_max_aligned_gap_length: defaults::ALIGNMENT_MAX_ALIGNED_GAP_LENGTH,
            force_full_swg: defaults::FORCE_FULL_SWG,
            alignment_scaffolding_min_coverage: defaults::SCAFFOLDING_MIN_COVERAGE,
            alignment_scaffolding_min_matching_length: defaults::SCAFFOLDING_MIN_MATCHING_LENGTH,
            scaffolding_max_level: ScaffoldType::Swg,
            cigar_curation: defaults::CIGAR_CURATION,
            cigar_curation_min_end_context: defaults::CIGAR_CURATION_MIN_END_CONTEXT,
            swg_penalties: SwgPenalties::default(),
            kmer_length: defaults::KMER_LENGTH,
            tile_length: defaults::TILE_LENGTH,
            allowed_enc: [true, true, true, true, false],
            replacements: vec![0, 1, 2, 3],
        }
    }
}

impl SearchParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the bases N may be replaced with. Non-DNA symbols are
    /// ignored; an alphabet with no DNA symbol at all is rejected.
    pub fn configure_replacements(&mut self, alphabet: &str) -> Result<()> {
        let mut allowed = [false; DNA_RANGE];
        let mut replacements = Vec::with_capacity(4);
        for c in alphabet.bytes().filter(|&c| is_dna(c)) {
            let enc = dna_encode(c);
            if !allowed[enc as usize] {
                allowed[enc as usize] = true;
                replacements.push(enc);
            }
        }
        if replacements.is_empty() {
            return Err(Error::EmptyReplacementAlphabet);
        }
        allowed[ENC_DNA_CHAR_N as usize] = false;
        self.allowed_enc = allowed;
        self.replacements = replacements;
        Ok(())
    }

    pub fn configure_match_score(&mut self, match_score: i32) {
        self.swg_penalties.configure_match_score(match_score);
    }

    pub fn configure_mismatch_penalty(&mut self, mismatch_penalty: i32) {
        self.swg_penalties.configure_mismatch_penalty(mismatch_penalty);
    }

    pub fn configure_gap_penalties(&mut self, gap_open: i32, gap_extension: i32) {
        self.swg_penalties.configure_gap_penalties(gap_open, gap_extension);
    }

    /// Evaluate every nominal threshold for a read of `pattern_length` bases
    pub fn instantiate_values(&self, pattern_length: u64) -> NominalParameters {
        let max_score = pattern_length * self.swg_penalties.generic_match_score.max(0) as u64;
        NominalParameters {
            pattern_length,
            complete_search_error: integer_proportion(self.complete_search_error, pattern_length),
            complete_strata_after_best: integer_proportion(
                self.complete_strata_after_best,
                pattern_length,
            ),
            max_error: integer_proportion(self.alignment_max_error, pattern_length),
            max_bandwidth: integer_proportion(self.alignment_max_bandwidth, pattern_length),
            global_min_identity: integer_proportion(
                self.alignment_global_min_identity,
                pattern_length,
            ),
            global_min_swg_threshold: integer_proportion(
                self.alignment_global_min_swg_threshold,
                max_score,
            ) as i32,
            local_min_identity: integer_proportion(self.alignment_local_min_identity, pattern_length),
            local_min_swg_threshold: integer_proportion(
                self.alignment_local_min_swg_threshold,
                max_score,
            ) as i32,
            max_aligned_gap_length: integer_proportion(
                self.alignment_max_aligned_gap_length,
                pattern_length,
            ),
            scaffolding_min_coverage: integer_proportion(
                self.alignment_scaffolding_min_coverage,
                pattern_length,
            ),
            scaffolding_min_matching_length: integer_proportion(
                self.alignment_scaffolding_min_matching_length,
                pattern_length,
            ),
            cigar_curation_min_end_context: integer_proportion(
                self.cigar_curation_min_end_context,
                pattern_length,
            ),
        }
    }

    /// Validate parameters, returning every problem found
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let non_negative = [
            ("complete_search_error", self.complete_search_error),
            ("complete_strata_after_best", self.complete_strata_after_best),
            ("alignment_max_error", self.alignment_max_error),
            ("alignment_max_bandwidth", self.alignment_max_bandwidth),
            ("alignment_global_min_swg_threshold", self.alignment_global_min_swg_threshold),
            ("alignment_local_min_identity", self.alignment_local_min_identity),
            ("alignment_local_min_swg_threshold", self.alignment_local_min_swg_threshold),
            ("alignment_max_aligned_gap_length", self.alignment_max_aligned_gap_length),
            ("alignment_scaffolding_min_matching_length", self.alignment_scaffolding_min_matching_length),
            ("cigar_curation_min_end_context", self.cigar_curation_min_end_context),
        ];
        for (name, value) in non_negative {
            if value.is_nan() || value < 0.0 {
                errors.push(format!("{} must be >= 0, got {}", name, value));
            }
        }
        if !(0.0..=1.0).contains(&self.alignment_global_min_identity) {
            errors.push(format!(
                "alignment_global_min_identity must be in [0, 1], got {}",
                self.alignment_global_min_identity
            ));
        }
        if !(0.0..=1.0).contains(&self.alignment_scaffolding_min_coverage) {
            errors.push(format!(
                "alignment_scaffolding_min_coverage must be in [0, 1], got {}",
                self.alignment_scaffolding_min_coverage
            ));
        }

        // Scoring validation
        if self.swg_penalties.generic_match_score < 1 {
            errors.push(format!(
                "match_score must be >= 1, got {}",
                self.swg_penalties.generic_match_score
            ));
        }
        if self.swg_penalties.gap_open_score > 0 || self.swg_penalties.gap_extension_score > 0 {
            errors.push(format!(
                "gap scores must be <= 0, got open {} extension {}",
                self.swg_penalties.gap_open_score, self.swg_penalties.gap_extension_score
            ));
        }

        // Filter validation
        if self.kmer_length < 1 || self.kmer_length > crate::core::alignment::kmer_filter::MAX_KMER_LENGTH {
            errors.push(format!("kmer_length must be in [1, 8], got {}", self.kmer_length));
        }
        if self.tile_length < 1 {
            errors.push(format!("tile_length must be >= 1, got {}", self.tile_length));
        }
        if self.replacements.is_empty() {
            errors.push("replacement alphabet is empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
