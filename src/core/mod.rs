//! Core reusable components for candidate verification.
//!
//! Nothing in here knows about reads, candidates or match sets. The
//! `pipelines` layer wires these kernels together.

pub mod alignment;
pub mod dna;
pub mod text;
