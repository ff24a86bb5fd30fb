//! Batch buffer for the BPM accelerator.
//!
//! Many (pattern, candidate) pairs are packed into one [`BpmBatch`], sent to a
//! [`BpmDevice`] in a single round-trip, and the per-candidate
//! `(distance, end_column)` results are read back by buffer position.
//!
//! ## Packing
//!
//! A pattern is stored as 128-bit PEQ entries, each holding four 32-bit
//! sub-entries per symbol. Unused tail bits are all ones so they never count
//! as errors. A long pattern is split into chunks of `entries_per_chunk`
//! entries (enough to hold `max_error` bases) and every chunk is verified on
//! its own, so one candidate of a pattern with `c` chunks takes `c` slots.
//!
//! ## Protocol
//!
//! ```text
//! Filling --send--> InFlight --receive--> Received --clear--> Filling
//!    ^                                                  |
//!    +------------------------- clear ------------------+
//! ```
//!
//! Appends are only legal while `Filling`; results only after `receive`.

use super::{BpmDevice, BpmDeviceLimits};
use crate::core::alignment::bpm::{BpmPattern, BPM_WORD_LENGTH};
use crate::core::dna::DNA_RANGE;
use crate::error::{Error, Result};

/// Bases covered by one PEQ entry
pub const BPM_ENTRY_LENGTH: u64 = 128;
/// 32-bit sub-entries per entry
pub const BPM_NUM_SUBENTRIES: usize = 4;
pub const BPM_SUBENTRY_LENGTH: usize = 32;
/// Symbols with a PEQ bitmap (A, C, G, T, N)
pub const BPM_ALPHABET_SIZE: usize = DNA_RANGE;

/// One 128-base PEQ entry, `bitmap[symbol][subentry]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BpmPeqEntry {
    pub bitmap: [[u32; BPM_NUM_SUBENTRIES]; BPM_ALPHABET_SIZE],
}

/// Where one query chunk lives in the PEQ array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpmQueryInfo {
    pub pos_entry: u64,
    pub size: u64,
}

/// One candidate slot: which query chunk to run against which text span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpmCandidateInfo {
    pub query: u64,
    pub position: u64,
    pub size: u64,
}

/// Device result for one candidate slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BpmAlignmentResult {
    pub score: u64,
    pub column: u64,
}

/// The data shipped to the device
#[derive(Debug, Clone, Default)]
pub struct BpmBatch {
    pub peq_entries: Vec<BpmPeqEntry>,
    pub queries: Vec<BpmQueryInfo>,
    pub candidates: Vec<BpmCandidateInfo>,
}

impl BpmBatch {
    pub fn clear(&mut self) {
        self.peq_entries.clear();
        self.queries.clear();
        self.candidates.clear();
    }

    /// Rebuild the word-major 64-bit PEQ table of one query chunk
    /// (the layout [`crate::core::alignment::bpm::bpm_compute`] expects).
    pub fn unpack_query(&self, query: &BpmQueryInfo) -> Vec<u64> {
        let num_entries = query.size.div_ceil(BPM_ENTRY_LENGTH).max(1) as usize;
        let words_per_entry = BPM_ENTRY_LENGTH as usize / BPM_WORD_LENGTH;
        let mut peq = vec![u64::MAX; num_entries * words_per_entry * DNA_RANGE];
        let first = query.pos_entry as usize;
        for (e, entry) in self.peq_entries[first..first + num_entries].iter().enumerate() {
            for half in 0..words_per_entry {
                let word = e * words_per_entry + half;
                for symbol in 0..DNA_RANGE {
                    let lo = entry.bitmap[symbol][2 * half] as u64;
                    let hi = entry.bitmap[symbol][2 * half + 1] as u64;
                    peq[word * DNA_RANGE + symbol] = lo | (hi << BPM_SUBENTRY_LENGTH);
                }
            }
        }
        peq
    }
}

/// Device dimensions of one compiled pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpmChunkLayout {
    pub pattern_length: u64,
    pub num_entries: u64,
    pub entries_per_chunk: u64,
    pub num_chunks: u64,
}

impl BpmChunkLayout {
    /// Bases of key covered by chunk `chunk`
    pub fn chunk_span(&self, chunk: u64) -> (u64, u64) {
        let chunk_bases = self.entries_per_chunk * BPM_ENTRY_LENGTH;
        let begin = (chunk * chunk_bases).min(self.pattern_length);
        let end = ((chunk + 1) * chunk_bases).min(self.pattern_length);
        (begin, end)
    }
}

/// Size a pattern for the device: entries needed, entries per error chunk,
/// and number of chunks.
pub fn compile(pattern: &BpmPattern, max_error: u64) -> BpmChunkLayout {
    let pattern_length = pattern.pattern_length() as u64;
    let num_entries = pattern_length.div_ceil(BPM_ENTRY_LENGTH).max(1);
    let entries_per_chunk = max_error.div_ceil(BPM_ENTRY_LENGTH).max(1);
    BpmChunkLayout {
        pattern_length,
        num_entries,
        entries_per_chunk,
        num_chunks: num_entries.div_ceil(entries_per_chunk),
    }
}

/// Totals accumulated by [`BpmBatchBuffer::compute_dimensions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BpmBatchDimensions {
    pub total_entries: u64,
    pub total_query_chunks: u64,
    pub total_candidate_chunks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Filling,
    InFlight,
    Received,
}

impl BufferState {
    fn as_str(self) -> &'static str {
        match self {
            BufferState::Filling => "filling",
            BufferState::InFlight => "in flight",
            BufferState::Received => "received",
        }
    }
}

/// Batch buffer bound to one device
pub struct BpmBatchBuffer {
    device: Box<dyn BpmDevice>,
    limits: BpmDeviceLimits,
    available: bool,
    /// `None` while the batch is on the device
    batch: Option<BpmBatch>,
    results: Vec<BpmAlignmentResult>,
    state: BufferState,
    num_peq_entries: u64,
    num_queries: u64,
    num_candidates: u64,
    pattern_id: u64,
}

impl BpmBatchBuffer {
    pub fn new(device: Box<dyn BpmDevice>) -> Self {
        let available = device.is_available();
        let limits = if available {
            device.limits()
        } else {
            BpmDeviceLimits::none()
        };
        Self {
            device,
            limits,
            available,
            batch: Some(BpmBatch::default()),
            results: Vec::new(),
            state: BufferState::Filling,
            num_peq_entries: 0,
            num_queries: 0,
            num_candidates: 0,
            pattern_id: 0,
        }
    }

    #[inline]
    fn check_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(Error::AcceleratorUnavailable)
        }
    }

    fn expect_state(&self, expected: BufferState, operation: &'static str) -> Result<()> {
        self.check_available()?;
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidBufferState {
                operation,
                state: self.state.as_str(),
            })
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    // ------------------------------------------------------------------------
    // Occupancy & limits
    // ------------------------------------------------------------------------

    pub fn get_max_candidates(&self) -> u64 {
        self.limits.max_candidates
    }

    pub fn get_max_queries(&self) -> u64 {
        self.limits.max_queries
    }

    pub fn get_max_peq_entries(&self) -> u64 {
        self.limits.max_peq_entries
    }

    pub fn get_num_candidates(&self) -> u64 {
        self.num_candidates
    }

    pub fn get_num_queries(&self) -> u64 {
        self.num_queries
    }

    pub fn get_num_peq_entries(&self) -> u64 {
        self.num_peq_entries
    }

    pub fn is_empty(&self) -> bool {
        self.num_candidates == 0 && self.num_queries == 0
    }

    /// Add what `layout` with `total_candidates` candidates would need to
    /// `dims`. Never touches the buffer.
    pub fn compute_dimensions(
        &self,
        layout: &BpmChunkLayout,
        total_candidates: u64,
        dims: &mut BpmBatchDimensions,
    ) {
        dims.total_entries += layout.num_entries;
        dims.total_query_chunks += layout.num_chunks;
        dims.total_candidate_chunks += layout.num_chunks * total_candidates;
    }

    /// `Ok(false)` asks the caller to flush and retry. An item that could not
    /// fit even an empty buffer is a configuration error.
    pub fn fits_in_buffer(
        &self,
        total_entries: u64,
        total_query_chunks: u64,
        total_candidate_chunks: u64,
    ) -> Result<bool> {
        self.check_available()?;
        let limits = &self.limits;
        if total_entries > limits.max_peq_entries {
            return Err(Error::PatternTooLarge {
                entries: total_entries,
                max: limits.max_peq_entries,
            });
        }
        if total_query_chunks > limits.max_queries {
            return Err(Error::TooManyQueryChunks {
                chunks: total_query_chunks,
                max: limits.max_queries,
            });
        }
        if total_candidate_chunks > limits.max_candidates {
            return Err(Error::TooManyCandidates {
                candidates: total_candidate_chunks,
                max: limits.max_candidates,
            });
        }
        Ok(self.num_queries + total_query_chunks <= limits.max_queries
            && self.num_peq_entries + total_entries <= limits.max_peq_entries
            && self.num_candidates + total_candidate_chunks <= limits.max_candidates)
    }

    // ------------------------------------------------------------------------
    // Packing
    // ------------------------------------------------------------------------

    /// Append a pattern's PEQ entries and chunk descriptors. Returns the
    /// pattern id later candidates refer to.
    pub fn add_pattern(&mut self, pattern: &BpmPattern, layout: &BpmChunkLayout) -> Result<u64> {
        self.expect_state(BufferState::Filling, "add a pattern")?;
        if self.num_queries + layout.num_chunks > self.limits.max_queries
            || self.num_peq_entries + layout.num_entries > self.limits.max_peq_entries
        {
            return Err(Error::BufferOverflow("pattern does not fit"));
        }
        let batch = self
            .batch
            .as_mut()
            .ok_or(Error::InvalidBufferState {
                operation: "add a pattern",
                state: "detached",
            })?;

        self.pattern_id = self.num_queries;
        for chunk in 0..layout.num_chunks {
            let (begin, end) = layout.chunk_span(chunk);
            batch.queries.push(BpmQueryInfo {
                pos_entry: self.num_peq_entries + chunk * layout.entries_per_chunk,
                size: end - begin,
            });
        }

        // 64-bit words map onto two consecutive 32-bit sub-entries
        let peq = pattern.peq();
        let words = layout.num_entries as usize * (BPM_ENTRY_LENGTH as usize / BPM_WORD_LENGTH);
        let mut entry = BpmPeqEntry::default();
        for w in 0..words {
            let sub = (w % 2) * 2;
            for symbol in 0..BPM_ALPHABET_SIZE {
                let word = if w < pattern.num_words() {
                    peq[w * DNA_RANGE + symbol]
                } else {
                    u64::MAX
                };
                entry.bitmap[symbol][sub] = word as u32;
                entry.bitmap[symbol][sub + 1] = (word >> BPM_SUBENTRY_LENGTH) as u32;
            }
            if sub + 2 == BPM_NUM_SUBENTRIES {
                batch.peq_entries.push(entry);
            }
        }

        self.num_queries += layout.num_chunks;
        self.num_peq_entries += layout.num_entries;
        log::trace!(
            "bpm buffer: pattern {} ({} bases, {} entries, {} chunks)",
            self.pattern_id,
            layout.pattern_length,
            layout.num_entries,
            layout.num_chunks
        );
        Ok(self.pattern_id)
    }

    /// Append one candidate slot for chunk `pattern_chunk` of the last added
    /// pattern. Returns its buffer position.
    pub fn add_candidate(
        &mut self,
        candidate_text_position: u64,
        candidate_length: u64,
        pattern_chunk: u64,
    ) -> Result<u64> {
        self.expect_state(BufferState::Filling, "add a candidate")?;
        if self.num_candidates + 1 > self.limits.max_candidates {
            return Err(Error::BufferOverflow("candidate does not fit"));
        }
        let query = self.pattern_id + pattern_chunk;
        if query >= self.num_queries {
            return Err(Error::InvalidParameter(format!(
                "candidate refers to query chunk {} but only {} are packed",
                query, self.num_queries
            )));
        }
        let batch = self
            .batch
            .as_mut()
            .ok_or(Error::InvalidBufferState {
                operation: "add a candidate",
                state: "detached",
            })?;
        batch.candidates.push(BpmCandidateInfo {
            query,
            position: candidate_text_position,
            size: candidate_length,
        });
        let buffer_pos = self.num_candidates;
        self.num_candidates += 1;
        Ok(buffer_pos)
    }

    /// Text span of the candidate at `buffer_pos`
    pub fn get_candidate(&self, buffer_pos: u64) -> Result<(u64, u64)> {
        self.check_available()?;
        if self.state == BufferState::InFlight {
            return Err(Error::InvalidBufferState {
                operation: "read a candidate",
                state: self.state.as_str(),
            });
        }
        self.batch
            .as_ref()
            .and_then(|b| b.candidates.get(buffer_pos as usize))
            .map(|c| (c.position, c.size))
            .ok_or_else(|| Error::InvalidParameter(format!("no candidate at {}", buffer_pos)))
    }

    /// `(distance, end_column)` of the candidate at `buffer_pos`
    pub fn get_candidate_result(&self, buffer_pos: u64) -> Result<(u64, u64)> {
        self.expect_state(BufferState::Received, "read results")?;
        self.results
            .get(buffer_pos as usize)
            .map(|r| (r.score, r.column))
            .ok_or_else(|| Error::InvalidParameter(format!("no result at {}", buffer_pos)))
    }

    // ------------------------------------------------------------------------
    // Send / receive
    // ------------------------------------------------------------------------

    pub fn send(&mut self) -> Result<()> {
        self.expect_state(BufferState::Filling, "send")?;
        let batch = self.batch.take().ok_or(Error::InvalidBufferState {
            operation: "send",
            state: "detached",
        })?;
        log::debug!(
            "bpm buffer: send {} entries / {} queries / {} candidates",
            self.num_peq_entries,
            self.num_queries,
            self.num_candidates
        );
        if let Err(err) = self.device.submit(batch) {
            self.batch = Some(BpmBatch::default());
            self.reset_counters();
            return Err(err);
        }
        self.state = BufferState::InFlight;
        Ok(())
    }

    /// Block until the device hands the batch back
    pub fn receive(&mut self) -> Result<()> {
        self.expect_state(BufferState::InFlight, "receive")?;
        let (batch, results) = match self.device.collect() {
            Ok(collected) => collected,
            Err(err) => {
                self.recover(BpmBatch::default());
                return Err(err);
            }
        };
        if results.len() != batch.candidates.len() {
            let err = Error::Device(format!(
                "device returned {} results for {} candidates",
                results.len(),
                batch.candidates.len()
            ));
            self.recover(batch);
            return Err(err);
        }
        self.batch = Some(batch);
        self.results = results;
        self.state = BufferState::Received;
        Ok(())
    }

    /// Reset for the next generation. Illegal while a batch is in flight.
    pub fn clear(&mut self) -> Result<()> {
        self.check_available()?;
        if self.state == BufferState::InFlight {
            return Err(Error::InvalidBufferState {
                operation: "clear",
                state: self.state.as_str(),
            });
        }
        if let Some(batch) = self.batch.as_mut() {
            batch.clear();
        }
        self.results.clear();
        self.reset_counters();
        self.state = BufferState::Filling;
        Ok(())
    }

    /// Drop a failed generation and start filling again
    fn recover(&mut self, mut batch: BpmBatch) {
        log::warn!(
            "bpm buffer: dropping batch of {} candidates after device failure",
            self.num_candidates
        );
        batch.clear();
        self.batch = Some(batch);
        self.results.clear();
        self.reset_counters();
        self.state = BufferState::Filling;
    }

    fn reset_counters(&mut self) {
        self.num_peq_entries = 0;
        self.num_queries = 0;
        self.num_candidates = 0;
        self.pattern_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::device::UnsupportedBpmDevice;
    use crate::core::dna::encode_sequence;

    #[test]
    fn test_compile_dimensions() {
        let pattern = BpmPattern::compile(&vec![0u8; 300]);
        let layout = compile(&pattern, 12);
        assert_eq!(layout.num_entries, 3);
        assert_eq!(layout.entries_per_chunk, 1);
        assert_eq!(layout.num_chunks, 3);
        assert_eq!(layout.chunk_span(2), (256, 300));

        let layout = compile(&pattern, 200);
        assert_eq!(layout.entries_per_chunk, 2);
        assert_eq!(layout.num_chunks, 2);
        assert_eq!(layout.chunk_span(0), (0, 256));
        assert_eq!(layout.chunk_span(1), (256, 300));

        let layout = compile(&pattern, 0);
        assert_eq!(layout.entries_per_chunk, 1);
    }

    #[test]
    fn test_pack_unpack_roundtrip_peq() {
        let key = encode_sequence(b"ACGTNACGTTTGCA");
        let pattern = BpmPattern::compile(&key);
        let layout = compile(&pattern, 4);
        let mut batch = BpmBatch::default();
        // Pack by hand through a buffer-less path
        let words = 2;
        let mut entry = BpmPeqEntry::default();
        for w in 0..words {
            for s in 0..DNA_RANGE {
                let word = if w == 0 { pattern.peq()[s] } else { u64::MAX };
                entry.bitmap[s][w * 2] = word as u32;
                entry.bitmap[s][w * 2 + 1] = (word >> 32) as u32;
            }
        }
        batch.peq_entries.push(entry);
        let query = BpmQueryInfo {
            pos_entry: 0,
            size: layout.pattern_length,
        };
        let peq = batch.unpack_query(&query);
        assert_eq!(&peq[..DNA_RANGE], &pattern.peq()[..DNA_RANGE]);
        assert!(peq[DNA_RANGE..].iter().all(|&w| w == u64::MAX));
    }

    #[test]
    fn test_unavailable_device_fails_every_call() {
        let mut buffer = BpmBatchBuffer::new(Box::new(UnsupportedBpmDevice));
        let pattern = BpmPattern::compile(&encode_sequence(b"ACGT"));
        let layout = compile(&pattern, 1);
        assert_eq!(buffer.get_max_queries(), 0);
        assert!(matches!(buffer.fits_in_buffer(1, 1, 1), Err(Error::AcceleratorUnavailable)));
        assert!(matches!(buffer.add_pattern(&pattern, &layout), Err(Error::AcceleratorUnavailable)));
        assert!(matches!(buffer.add_candidate(0, 4, 0), Err(Error::AcceleratorUnavailable)));
        assert!(matches!(buffer.send(), Err(Error::AcceleratorUnavailable)));
        assert!(matches!(buffer.receive(), Err(Error::AcceleratorUnavailable)));
        assert!(matches!(buffer.clear(), Err(Error::AcceleratorUnavailable)));
    }

    /// Hands back the batch with no results, then fails outright
    #[derive(Default)]
    struct FaultyDevice {
        pending: Option<BpmBatch>,
        collects: usize,
    }

    impl BpmDevice for FaultyDevice {
        fn limits(&self) -> BpmDeviceLimits {
            BpmDeviceLimits::default()
        }

        fn is_available(&self) -> bool {
            true
        }

        fn submit(&mut self, batch: BpmBatch) -> Result<()> {
            self.pending = Some(batch);
            Ok(())
        }

        fn collect(&mut self) -> Result<(BpmBatch, Vec<BpmAlignmentResult>)> {
            self.collects += 1;
            let batch = self.pending.take().unwrap_or_default();
            if self.collects == 1 {
                Ok((batch, Vec::new()))
            } else {
                Err(Error::Device("lost".to_string()))
            }
        }
    }

    fn fill_and_send(buffer: &mut BpmBatchBuffer) {
        let pattern = BpmPattern::compile(&encode_sequence(b"ACGTACGT"));
        let layout = compile(&pattern, 2);
        buffer.add_pattern(&pattern, &layout).unwrap();
        buffer.add_candidate(0, 12, 0).unwrap();
        buffer.send().unwrap();
        assert_eq!(buffer.state(), BufferState::InFlight);
    }

    #[test]
    fn test_failed_receive_leaves_buffer_reusable() {
        let mut buffer = BpmBatchBuffer::new(Box::new(FaultyDevice::default()));

        fill_and_send(&mut buffer);
        assert!(matches!(buffer.receive(), Err(Error::Device(_))));
        assert_eq!(buffer.state(), BufferState::Filling);
        assert!(buffer.is_empty());
        buffer.clear().unwrap();

        fill_and_send(&mut buffer);
        assert!(matches!(buffer.receive(), Err(Error::Device(_))));
        assert_eq!(buffer.state(), BufferState::Filling);
        assert_eq!(buffer.get_num_candidates(), 0);
        assert!(matches!(buffer.get_candidate_result(0), Err(Error::InvalidBufferState { .. })));
        buffer.clear().unwrap();
        fill_and_send(&mut buffer);
    }
}
