//! Candidate handling between the index search and the match store.
//!
//! - `interval_set`: SA intervals produced by the search
//! - `candidates`: undecoded candidates, composition into regions, verified set
//! - `verify`: CPU verification and realignment
//! - `batch`: the same through a BPM batch buffer

pub mod batch;
pub mod candidates;
pub mod interval_set;
pub mod verify;

pub use candidates::{CandidateLocator, FilteringCandidates, TextPositionLocator};
pub use interval_set::IntervalSet;
pub use verify::{ReadKeys, VerifyContext, VerifyStats};
