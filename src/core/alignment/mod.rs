//! Core alignment kernels - verification filters and DP aligners.
//!
//! These modules are agnostic to where candidates come from. They operate on
//! encoded byte sequences (see [`crate::core::dna`]) and reuse per-thread
//! buffers from [`workspace`].

pub mod bpm;
pub mod cigar;
pub mod edit_distance;
pub mod kmer_filter;
pub mod swg;
pub mod tiles;
pub mod types;
pub mod workspace; // Thread-local buffer pools for allocation reuse
