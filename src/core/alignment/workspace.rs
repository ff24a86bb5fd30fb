//! Thread-local workspace for reusable allocations
//!
//! Per-thread buffer pools for the verification kernels. Every candidate of
//! every read runs the same handful of kernels, so the DP matrices, BPM state
//! vectors and k-mer tables are sized once per thread and reused.
//!
//! Only leaf kernels enter the workspace, and none of them calls another
//! kernel while holding it, so the `RefCell` is never borrowed twice.

use std::cell::RefCell;

/// Maximum expected read length for pre-allocation
const MAX_READ_LEN: usize = 512;

/// Expected candidate text length (read + both error flanks)
const MAX_TEXT_LEN: usize = 1024;

// Thread-local workspace for alignment buffers
thread_local! {
    static WORKSPACE: RefCell<AlignmentWorkspace> = RefCell::new(AlignmentWorkspace::new());
}

/// Reusable buffers for the verification kernels
pub struct AlignmentWorkspace {
    /// Full edit-distance matrix, row-major `(key_len + 1) x (text_len + 1)`
    pub dp_matrix: Vec<u32>,

    // ========================================================================
    // SWG buffers
    // ========================================================================
    /// Best-score matrix H
    pub swg_h: Vec<i32>,
    /// Gap-in-key matrix E (deletions)
    pub swg_e: Vec<i32>,
    /// Gap-in-text matrix F (insertions)
    pub swg_f: Vec<i32>,

    // ========================================================================
    // BPM buffers
    // ========================================================================
    /// Positive vertical deltas, one word per 64 key bases
    pub bpm_pv: Vec<u64>,
    /// Negative vertical deltas
    pub bpm_mv: Vec<u64>,

    /// k-mer occurrence table for the counting filter
    pub kmer_counts: Vec<u32>,
}

impl AlignmentWorkspace {
    /// Create a new workspace with pre-allocated buffers
    pub fn new() -> Self {
        Self {
            dp_matrix: Vec::with_capacity((MAX_READ_LEN + 1) * (MAX_TEXT_LEN + 1)),
            swg_h: Vec::with_capacity((MAX_READ_LEN + 1) * (MAX_TEXT_LEN + 1)),
            swg_e: Vec::with_capacity((MAX_READ_LEN + 1) * (MAX_TEXT_LEN + 1)),
            swg_f: Vec::with_capacity((MAX_READ_LEN + 1) * (MAX_TEXT_LEN + 1)),
            bpm_pv: Vec::with_capacity(MAX_READ_LEN.div_ceil(64)),
            bpm_mv: Vec::with_capacity(MAX_READ_LEN.div_ceil(64)),
            kmer_counts: Vec::new(),
        }
    }

    /// Size the edit-distance matrix for a `rows x cols` problem
    #[inline]
    pub fn ensure_dp_matrix(&mut self, rows: usize, cols: usize) -> &mut [u32] {
        let len = rows * cols;
        if self.dp_matrix.len() < len {
            self.dp_matrix.resize(len, 0);
        }
        &mut self.dp_matrix[..len]
    }

    /// Size the three SWG matrices for a `rows x cols` problem
    pub fn ensure_swg_matrices(
        &mut self,
        rows: usize,
        cols: usize,
    ) -> (&mut [i32], &mut [i32], &mut [i32]) {
        let len = rows * cols;
        if self.swg_h.len() < len {
            self.swg_h.resize(len, 0);
            self.swg_e.resize(len, 0);
            self.swg_f.resize(len, 0);
        }
        (
            &mut self.swg_h[..len],
            &mut self.swg_e[..len],
            &mut self.swg_f[..len],
        )
    }

    /// BPM state vectors initialised for a fresh scan (Pv all ones, Mv zero)
    pub fn ensure_bpm_state(&mut self, words: usize) -> (&mut [u64], &mut [u64]) {
        if self.bpm_pv.len() < words {
            self.bpm_pv.resize(words, 0);
            self.bpm_mv.resize(words, 0);
        }
        self.bpm_pv[..words].fill(u64::MAX);
        self.bpm_mv[..words].fill(0);
        (&mut self.bpm_pv[..words], &mut self.bpm_mv[..words])
    }

    /// Zeroed k-mer table with `size` slots
    pub fn ensure_kmer_counts(&mut self, size: usize) -> &mut [u32] {
        if self.kmer_counts.len() < size {
            self.kmer_counts.resize(size, 0);
        }
        self.kmer_counts[..size].fill(0);
        &mut self.kmer_counts[..size]
    }

    /// Release oversized buffers after an unusually long read (keeps capacity
    /// of the default shapes)
    pub fn shrink(&mut self) {
        let dp = (MAX_READ_LEN + 1) * (MAX_TEXT_LEN + 1);
        for v in [&mut self.swg_h, &mut self.swg_e, &mut self.swg_f] {
            v.truncate(dp);
            v.shrink_to(dp);
        }
        self.dp_matrix.truncate(dp);
        self.dp_matrix.shrink_to(dp);
    }
}

impl Default for AlignmentWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a closure with the thread-local workspace
///
/// # Example
/// ```ignore
/// use crate::core::alignment::workspace::with_workspace;
///
/// with_workspace(|ws| {
///     let dp = ws.ensure_dp_matrix(key.len() + 1, text.len() + 1);
///     // fill dp ...
/// });
/// ```
pub fn with_workspace<F, R>(f: F) -> R
where
    F: FnOnce(&mut AlignmentWorkspace) -> R,
{
    WORKSPACE.with(|ws| f(&mut ws.borrow_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bpm_state_reset() {
        with_workspace(|ws| {
            let (pv, mv) = ws.ensure_bpm_state(3);
            pv[0] = 7;
            mv[1] = 9;
            let (pv, mv) = ws.ensure_bpm_state(3);
            assert!(pv.iter().all(|&w| w == u64::MAX));
            assert!(mv.iter().all(|&w| w == 0));
        });
    }

    #[test]
    fn test_kmer_table_zeroed() {
        with_workspace(|ws| {
            ws.ensure_kmer_counts(16)[3] = 5;
            assert!(ws.ensure_kmer_counts(16).iter().all(|&c| c == 0));
        });
    }
}
