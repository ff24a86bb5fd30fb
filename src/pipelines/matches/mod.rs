//! Match sets: storage, scaffolding, classification and selection.

pub mod classify;
pub mod counters;
pub mod scaffold;
pub mod select;
pub mod store;

pub use classify::{MatchClassifier, MatchesClass, ScoreGapClassifier};
pub use counters::MatchesCounters;
pub use scaffold::{MatchScaffold, ScaffoldType};
pub use select::{SelectParameters, SelectStages};
pub use store::{MatchTrace, Matches};
