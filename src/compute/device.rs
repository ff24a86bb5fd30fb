//! BPM device implementations.
//!
//! [`HostBpmDevice`] runs the packed kernel on a dedicated worker thread that
//! owns a shared copy of the encoded reference, the way a real device keeps
//! the index resident. Batches travel over `crossbeam-channel` and the
//! candidates of a batch are verified in parallel with rayon.
//!
//! [`UnsupportedBpmDevice`] is what builds without the accelerator get.

use super::bpm_buffer::{BpmAlignmentResult, BpmBatch};
use super::{BpmDevice, BpmDeviceLimits};
use crate::error::{Error, Result};
#[cfg(feature = "accelerator")]
pub use host::HostBpmDevice;

/// Stand-in device: every operation fails with `AcceleratorUnavailable`
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBpmDevice;

impl BpmDevice for UnsupportedBpmDevice {
    fn limits(&self) -> BpmDeviceLimits {
        BpmDeviceLimits::none()
    }

    fn is_available(&self) -> bool {
        false
    }

    fn submit(&mut self, _batch: BpmBatch) -> Result<()> {
        Err(Error::AcceleratorUnavailable)
    }

    fn collect(&mut self) -> Result<(BpmBatch, Vec<BpmAlignmentResult>)> {
        Err(Error::AcceleratorUnavailable)
    }
}

/// Run the packed kernel over a whole batch against `text`.
///
/// Each query chunk is unpacked once; candidate spans are clamped to the text.
pub fn execute_batch(batch: &BpmBatch, text: &[u8]) -> Vec<BpmAlignmentResult> {
    use crate::core::alignment::bpm::bpm_compute;
    use rayon::prelude::*;

    let peqs: Vec<Vec<u64>> = batch
        .queries
        .par_iter()
        .map(|query| batch.unpack_query(query))
        .collect();

    batch
        .candidates
        .par_iter()
        .map(|candidate| {
            let query = &batch.queries[candidate.query as usize];
            let begin = (candidate.position as usize).min(text.len());
            let end = (candidate.position.saturating_add(candidate.size) as usize).min(text.len());
            let (score, column) = bpm_compute(
                &peqs[candidate.query as usize],
                query.size as usize,
                &text[begin..end],
                u64::MAX,
            );
            BpmAlignmentResult { score, column }
        })
        .collect()
}

#[cfg(feature = "accelerator")]
mod host {
    use super::*;
    use crossbeam_channel::{bounded, Receiver, Sender};
    use std::sync::Arc;
    use std::thread::JoinHandle;

    type BatchOutcome = (BpmBatch, Vec<BpmAlignmentResult>);

    /// Host-emulated BPM device
    pub struct HostBpmDevice {
        limits: BpmDeviceLimits,
        submit_tx: Option<Sender<BpmBatch>>,
        result_rx: Receiver<BatchOutcome>,
        worker: Option<JoinHandle<()>>,
        in_flight: bool,
    }

    impl HostBpmDevice {
        pub fn new(text: Arc<Vec<u8>>, limits: BpmDeviceLimits) -> Self {
            let (submit_tx, submit_rx) = bounded::<BpmBatch>(1);
            let (result_tx, result_rx) = bounded::<BatchOutcome>(1);
            let worker = std::thread::Builder::new()
                .name("bpm-device".to_string())
                .spawn(move || {
                    for batch in submit_rx.iter() {
                        let results = execute_batch(&batch, &text);
                        log::trace!("bpm device: {} candidates verified", results.len());
                        if result_tx.send((batch, results)).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| log::warn!("bpm device: cannot spawn worker: {}", e))
                .ok();
            Self {
                limits,
                submit_tx: Some(submit_tx),
                result_rx,
                worker,
                in_flight: false,
            }
        }
    }

    impl BpmDevice for HostBpmDevice {
        fn limits(&self) -> BpmDeviceLimits {
            self.limits
        }

        fn is_available(&self) -> bool {
            self.worker.is_some()
        }

        fn submit(&mut self, batch: BpmBatch) -> Result<()> {
            if self.in_flight {
                return Err(Error::Device("a batch is already in flight".to_string()));
            }
            let tx = self
                .submit_tx
                .as_ref()
                .ok_or(Error::AcceleratorUnavailable)?;
            tx.send(batch)
                .map_err(|_| Error::Device("device worker stopped".to_string()))?;
            self.in_flight = true;
            Ok(())
        }

        fn collect(&mut self) -> Result<(BpmBatch, Vec<BpmAlignmentResult>)> {
            if !self.in_flight {
                return Err(Error::Device("no batch in flight".to_string()));
            }
            let outcome = self
                .result_rx
                .recv()
                .map_err(|_| Error::Device("device worker stopped".to_string()))?;
            self.in_flight = false;
            Ok(outcome)
        }
    }

    impl Drop for HostBpmDevice {
        fn drop(&mut self) {
            // Closing the channel ends the worker loop
            self.submit_tx.take();
            if let Some(worker) = self.worker.take() {
                if self.in_flight {
                    let _ = self.result_rx.recv();
                }
                let _ = worker.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::bpm_buffer::{BpmCandidateInfo, BpmPeqEntry, BpmQueryInfo};

    #[test]
    fn test_unsupported_device() {
        let mut device = UnsupportedBpmDevice;
        assert!(!device.is_available());
        assert_eq!(device.limits(), BpmDeviceLimits::none());
        assert!(matches!(device.submit(BpmBatch::default()), Err(Error::AcceleratorUnavailable)));
        assert!(matches!(device.collect(), Err(Error::AcceleratorUnavailable)));
    }

    #[test]
    fn test_execute_batch_clamps_span() {
        // Pattern "AC": A at bit 0, C at bit 1, everything else padded
        let mut entry = BpmPeqEntry::default();
        for symbol in 0..5 {
            entry.bitmap[symbol] = [!0b11, u32::MAX, u32::MAX, u32::MAX];
        }
        entry.bitmap[0][0] |= 0b01;
        entry.bitmap[1][0] |= 0b10;
        let batch = BpmBatch {
            peq_entries: vec![entry],
            queries: vec![BpmQueryInfo { pos_entry: 0, size: 2 }],
            candidates: vec![
                BpmCandidateInfo { query: 0, position: 2, size: 10 },
                BpmCandidateInfo { query: 0, position: 0, size: 2 },
            ],
        };
        let text = [3u8, 3, 0, 1];
        let results = execute_batch(&batch, &text);
        assert_eq!(results[0], BpmAlignmentResult { score: 0, column: 1 });
        assert_eq!(results[1].score, 2);
    }
}
