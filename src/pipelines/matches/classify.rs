//! Match-set classification and MAPQ assignment.
//!
//! A read is classified from its best and second-best SWG scores, the
//! completeness of the search and the number of tied best traces. The
//! confidence formulas are a pluggable policy ([`MatchClassifier`]); every
//! threshold of the default policy is derived from the scoring model.

use super::store::Matches;
use crate::core::alignment::swg::SwgPenalties;

const MAPQ_MAX: u8 = 60;

/// Classification of a read's match set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchesClass {
    #[default]
    Unmapped,
    /// A single trace
    Unique,
    /// One best trace clearly ahead of the rest
    Ambiguous,
    /// Several traces within one mismatch worth of score of the best
    Mmaps,
    /// Several traces share the best score
    Tie,
}

/// Everything the classification formulas look at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifyContext {
    pub num_traces: u64,
    pub best_score: i32,
    pub second_score: Option<i32>,
    pub num_ties: u64,
    pub best_distance: u64,
    pub max_complete_stratum: u64,
    /// `read_length * match_score`
    pub max_score: i64,
    /// Score lost by turning one match into a mismatch
    pub mismatch_delta: i64,
    pub read_length: u64,
}

impl ClassifyContext {
    pub fn from_matches(
        matches: &Matches,
        max_complete_stratum: u64,
        penalties: &SwgPenalties,
        read_length: u64,
    ) -> Option<Self> {
        let (best, second) = matches.best_swg_scores();
        let best = best?;
        let traces = matches.get_match_traces();
        let num_ties = traces.iter().filter(|t| t.swg_score == best).count() as u64;
        let best_distance = traces
            .iter()
            .filter(|t| t.swg_score == best)
            .map(|t| t.distance)
            .min()
            .unwrap_or(0);
        let match_score = penalties.generic_match_score as i64;
        Some(Self {
            num_traces: traces.len() as u64,
            best_score: best,
            second_score: second,
            num_ties,
            best_distance,
            max_complete_stratum,
            max_score: read_length as i64 * match_score,
            mismatch_delta: (match_score - penalties.generic_mismatch_score as i64).max(1),
            read_length,
        })
    }

    /// Score gap between the best and second best trace
    pub fn score_gap(&self) -> Option<i64> {
        self.second_score
            .map(|s| self.best_score as i64 - s as i64)
    }
}

/// Confidence policy. Each method returns a confidence in `[0, 1]`.
pub trait MatchClassifier: Send + Sync {
    fn classify_unique(&self, ctx: &ClassifyContext) -> f64;
    fn classify_ambiguous(&self, ctx: &ClassifyContext) -> f64;
    fn classify_mmaps(&self, ctx: &ClassifyContext) -> f64;
    fn classify_ties(&self, ctx: &ClassifyContext) -> f64;

    /// Which class a match set falls in
    fn classify(&self, ctx: &ClassifyContext) -> MatchesClass {
        if ctx.num_traces == 0 {
            MatchesClass::Unmapped
        } else if ctx.num_traces == 1 {
            MatchesClass::Unique
        } else if ctx.num_ties > 1 {
            MatchesClass::Tie
        } else if ctx.score_gap().is_some_and(|gap| gap > ctx.mismatch_delta) {
            MatchesClass::Ambiguous
        } else {
            MatchesClass::Mmaps
        }
    }

    /// MAPQ for the primary trace of a match set
    fn mapq(&self, class: MatchesClass, confidence: f64) -> u8;
}

/// Default policy.
///
/// Unique reads are trusted by identity and by how many strata past the
/// best one the search was complete. Multi-mapping reads are trusted by the
/// score gap to the runner-up, measured in mismatches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreGapClassifier {
    /// Complete strata past the best distance needed for full confidence
    pub unique_strata_window: u64,
    /// Mismatches of score gap needed for full confidence
    pub ambiguous_gap_window: f64,
    pub mapq_unique_max: u8,
    pub mapq_ambiguous_max: u8,
    pub mapq_mmaps_max: u8,
    pub mapq_ties_max: u8,
}

impl Default for ScoreGapClassifier {
    fn default() -> Self {
        Self {
            unique_strata_window: 2,
            ambiguous_gap_window: 6.0,
            mapq_unique_max: MAPQ_MAX,
            mapq_ambiguous_max: 40,
            mapq_mmaps_max: 20,
            mapq_ties_max: 3,
        }
    }
}

impl ScoreGapClassifier {
    fn identity(ctx: &ClassifyContext) -> f64 {
        if ctx.max_score <= 0 {
            return 0.0;
        }
        (ctx.best_score as f64 / ctx.max_score as f64).clamp(0.0, 1.0)
    }

    fn gap_confidence(&self, ctx: &ClassifyContext) -> f64 {
        let gap = ctx.score_gap().unwrap_or(0).max(0) as f64;
        (gap / ctx.mismatch_delta as f64 / self.ambiguous_gap_window).clamp(0.0, 1.0)
    }
}

impl MatchClassifier for ScoreGapClassifier {
    fn classify_unique(&self, ctx: &ClassifyContext) -> f64 {
        let strata = ctx
            .max_complete_stratum
            .saturating_sub(ctx.best_distance)
            .min(self.unique_strata_window);
        let completeness = (strata + 1) as f64 / (self.unique_strata_window + 1) as f64;
        completeness * Self::identity(ctx)
    }

    fn classify_ambiguous(&self, ctx: &ClassifyContext) -> f64 {
        self.gap_confidence(ctx) * Self::identity(ctx)
    }

    fn classify_mmaps(&self, ctx: &ClassifyContext) -> f64 {
        let crowd = ((ctx.num_traces.max(1)) as f64).ln() + 1.0;
        self.gap_confidence(ctx) * Self::identity(ctx) / crowd
    }

    fn classify_ties(&self, ctx: &ClassifyContext) -> f64 {
        1.0 / ctx.num_ties.max(1) as f64
    }

    fn mapq(&self, class: MatchesClass, confidence: f64) -> u8 {
        let cap = match class {
            MatchesClass::Unmapped => return 0,
            MatchesClass::Unique => self.mapq_unique_max,
            MatchesClass::Ambiguous => self.mapq_ambiguous_max,
            MatchesClass::Mmaps => self.mapq_mmaps_max,
            MatchesClass::Tie => self.mapq_ties_max,
        };
        let error = (1.0 - confidence.clamp(0.0, 1.0)).max(1e-6);
        let mapq = (-10.0 * error.log10() + 0.499) as i32;
        mapq.clamp(0, cap as i32) as u8
    }
}

/// Classify a match set and write MAPQ scores into its traces.
///
/// Traces tied with the best score share the class MAPQ; every other trace
/// is secondary and gets 0.
pub fn score_matches(
    matches: &mut Matches,
    classifier: &dyn MatchClassifier,
    penalties: &SwgPenalties,
    read_length: u64,
) -> MatchesClass {
    let Some(ctx) = ClassifyContext::from_matches(
        matches,
        matches.max_complete_stratum,
        penalties,
        read_length,
    ) else {
        return MatchesClass::Unmapped;
    };
    let class = classifier.classify(&ctx);
    let confidence = match class {
        MatchesClass::Unmapped => 0.0,
        MatchesClass::Unique => classifier.classify_unique(&ctx),
        MatchesClass::Ambiguous => classifier.classify_ambiguous(&ctx),
        MatchesClass::Mmaps => classifier.classify_mmaps(&ctx),
        MatchesClass::Tie => classifier.classify_ties(&ctx),
    };
    let mapq = classifier.mapq(class, confidence);
    for trace in matches.match_traces_mut() {
        trace.mapq_score = if trace.swg_score == ctx.best_score { mapq } else { 0 };
    }
    log::trace!(
        "classify: {:?} confidence {:.3} mapq {} ({} traces)",
        class,
        confidence,
        mapq,
        ctx.num_traces
    );
    class
}
