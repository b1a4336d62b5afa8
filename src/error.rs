//! Error types for construction-time and I/O failures.
//!
//! In-band protocol outcomes (rejected update, ACK timeout, retrieve miss,
//! ...) are not errors here — they are `bool`/`Option` return values, per the
//! coordinator and replica APIs. `Error` only covers failures that cannot be
//! expressed as a domain outcome: invalid replica construction parameters
//! and I/O failures in the batch-experiment harness.

use thiserror::Error;

/// Errors raised outside the in-band protocol outcomes.
#[derive(Error, Debug)]
pub enum Error {
    /// A replica was constructed with an out-of-range `failure_prob`.
    #[error("failure_prob must be in [0, 1], got {0}")]
    InvalidFailureProb(f64),

    /// A replica was constructed with a non-positive trust weight.
    #[error("weight must be positive, got {0}")]
    InvalidWeight(u32),

    /// A replica was constructed with an inverted recovery delay range.
    #[error("recovery_delay_min ({min}) must be <= recovery_delay_max ({max})")]
    InvalidRecoveryDelayRange { min: u64, max: u64 },

    /// Writing the batch-experiment harness output failed.
    #[error("failed to write harness results to {path}: {source}")]
    HarnessWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for `quorumfs` construction and harness operations.
pub type Result<T> = std::result::Result<T, Error>;
