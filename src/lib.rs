//! Candidate verification and alignment core for short-read mapping.
//!
//! Candidates proposed by an index search are filtered with k-mer and
//! bit-parallel Myers bounds, aligned with Smith-Waterman-Gotoh, and
//! collected into a deduplicated match set that is classified and capped
//! for reporting. Filtering can run on the CPU or through a batched BPM
//! device (see [`compute`]).

pub mod compute;
pub mod core;
pub mod defaults;
pub mod error;
pub mod pipelines;

pub use error::{Error, Result};
