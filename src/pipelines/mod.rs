//! Pipeline layer: wires the core kernels into per-read verification.
//!
//! - `search_params`: configuration and per-read thresholds
//! - `filtering`: candidates from the index search and their verification
//! - `matches`: match store, scaffolding, classification and selection
//! - `mapper`: per-read driver and fan-out across reads

pub mod filtering;
pub mod mapper;
pub mod matches;
pub mod search_params;
