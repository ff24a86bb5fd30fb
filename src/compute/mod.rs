//! # Heterogeneous Compute Abstraction Layer
//!
//! Routes BPM candidate verification either to the CPU path (one kernel call
//! per candidate) or to a batched accelerator that verifies many
//! (pattern, candidate) pairs per round-trip.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    HETEROGENEOUS COMPUTE ENTRY POINT                    │
//! │                                                                         │
//! │  • Cpu            - per-candidate BPM, always available                 │
//! │  • BpmAccelerator - batched BPM through `BpmBatchBuffer`                │
//! │                                                                         │
//! │  The accelerator is a capability: `open_bpm_device` hands out either    │
//! │  a working device or `UnsupportedBpmDevice`, whose every call fails     │
//! │  with `Error::AcceleratorUnavailable`. Callers compile the same way     │
//! │  in both builds.                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod bpm_buffer;
pub mod device;

use crate::error::Result;
use bpm_buffer::{BpmAlignmentResult, BpmBatch};
use std::sync::Arc;

/// Compute backend for candidate verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeBackend {
    /// Verify each candidate on the calling thread.
    #[default]
    Cpu,

    /// Verify candidates in batches through a BPM device.
    ///
    /// Only effective when the crate is built with the `accelerator`
    /// feature; otherwise it resolves to `Cpu`.
    BpmAccelerator,
}

impl ComputeBackend {
    /// Returns the effective backend to use for computation.
    pub fn effective_backend(&self) -> ComputeBackend {
        match self {
            ComputeBackend::Cpu => ComputeBackend::Cpu,
            ComputeBackend::BpmAccelerator => {
                if accelerator_linked() {
                    ComputeBackend::BpmAccelerator
                } else {
                    log::debug!("BPM accelerator requested but not built in, falling back to CPU");
                    ComputeBackend::Cpu
                }
            }
        }
    }

    pub fn is_accelerated(&self) -> bool {
        matches!(self.effective_backend(), ComputeBackend::BpmAccelerator)
    }
}

/// True if the host-emulated BPM device is linked into this build
#[inline]
pub const fn accelerator_linked() -> bool {
    cfg!(feature = "accelerator")
}

/// Detect the optimal compute backend for the current system.
///
/// Batching only pays off when there are cores to spread a batch over.
pub fn detect_optimal_backend() -> ComputeBackend {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    if accelerator_linked() && cores > 1 {
        ComputeBackend::BpmAccelerator
    } else {
        ComputeBackend::Cpu
    }
}

/// Returns a human-readable description of the compute backend.
pub fn backend_description(backend: ComputeBackend) -> &'static str {
    match backend {
        ComputeBackend::Cpu => "CPU (per-candidate BPM)",
        ComputeBackend::BpmAccelerator if accelerator_linked() => "BPM accelerator (host-emulated)",
        ComputeBackend::BpmAccelerator => "BPM accelerator (not built - using CPU fallback)",
    }
}

// ============================================================================
// DEVICE CAPABILITY
// ============================================================================

/// Capacity of one device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpmDeviceLimits {
    pub max_peq_entries: u64,
    pub max_queries: u64,
    pub max_candidates: u64,
}

impl BpmDeviceLimits {
    /// Bytes of one packed PEQ entry (5 symbols x 128 bits)
    pub const PEQ_ENTRY_BYTES: u64 = 80;
    /// Bytes of one query descriptor
    pub const QUERY_INFO_BYTES: u64 = 16;
    /// Bytes of one candidate descriptor plus its result slot
    pub const CANDIDATE_BYTES: u64 = 40;

    /// Split a device buffer of `buffer_size` bytes assuming queries of
    /// `average_query_length` bases with `candidates_per_query` candidates.
    pub fn from_buffer_size(
        buffer_size: u64,
        average_query_length: u64,
        candidates_per_query: u64,
    ) -> Self {
        let entries_per_query = average_query_length.div_ceil(bpm_buffer::BPM_ENTRY_LENGTH).max(1);
        let bytes_per_query = entries_per_query * Self::PEQ_ENTRY_BYTES
            + Self::QUERY_INFO_BYTES
            + candidates_per_query * Self::CANDIDATE_BYTES;
        let max_queries = buffer_size / bytes_per_query.max(1);
        Self {
            max_peq_entries: max_queries * entries_per_query,
            max_queries,
            max_candidates: max_queries * candidates_per_query,
        }
    }

    pub const fn none() -> Self {
        Self {
            max_peq_entries: 0,
            max_queries: 0,
            max_candidates: 0,
        }
    }
}

impl Default for BpmDeviceLimits {
    /// 4 MiB buffer, 150bp reads, 20 candidates per read
    fn default() -> Self {
        Self::from_buffer_size(4 << 20, 150, 20)
    }
}

/// A device able to run the packed BPM kernel.
///
/// `submit` hands the batch over without blocking; `collect` blocks until
/// the results of that batch are back and returns the batch storage for
/// reuse. One `collect` per `submit`.
pub trait BpmDevice: Send {
    fn limits(&self) -> BpmDeviceLimits;
    fn is_available(&self) -> bool;
    fn submit(&mut self, batch: BpmBatch) -> Result<()>;
    fn collect(&mut self) -> Result<(BpmBatch, Vec<BpmAlignmentResult>)>;
}

/// Open a BPM device for `backend` over the encoded reference `text`.
pub fn open_bpm_device(
    backend: ComputeBackend,
    text: Arc<Vec<u8>>,
    limits: BpmDeviceLimits,
) -> Box<dyn BpmDevice> {
    match backend.effective_backend() {
        #[cfg(feature = "accelerator")]
        ComputeBackend::BpmAccelerator => {
            log::info!(
                "BPM device: {} (peq entries {}, queries {}, candidates {})",
                backend_description(backend),
                limits.max_peq_entries,
                limits.max_queries,
                limits.max_candidates
            );
            Box::new(device::HostBpmDevice::new(text, limits))
        }
        _ => {
            if backend == ComputeBackend::BpmAccelerator {
                log::warn!("BPM accelerator unavailable; batched verification disabled");
            }
            drop(text);
            Box::new(device::UnsupportedBpmDevice)
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
