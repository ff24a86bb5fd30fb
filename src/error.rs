//! Error type shared by the verification core.
//!
//! Filtering outcomes (a candidate failing its bound, a tile running out of
//! error budget, a batch buffer being full) are ordinary values and never show
//! up here. This enum only carries configuration errors and broken call
//! protocols.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no alignment exists between key and text")]
    Unaligned,

    #[error("pattern needs {entries} PEQ entries but the device buffer holds at most {max}")]
    PatternTooLarge { entries: u64, max: u64 },

    #[error("pattern needs {chunks} query chunks but the device buffer holds at most {max}")]
    TooManyQueryChunks { chunks: u64, max: u64 },

    #[error("candidate set needs {candidates} slots but the device buffer holds at most {max}")]
    TooManyCandidates { candidates: u64, max: u64 },

    #[error("batch buffer overflow: {0}")]
    BufferOverflow(&'static str),

    #[error("cannot {operation} while the batch buffer is {state}")]
    InvalidBufferState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("BPM accelerator is not available in this build")]
    AcceleratorUnavailable,

    #[error("accelerator device failure: {0}")]
    Device(String),

    #[error("Matches. CIGAR length cannot be zero")]
    CigarZeroLength,

    #[error("replacement alphabet contains no DNA symbols")]
    EmptyReplacementAlphabet,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
