//! Replicated single-artifact file store with best-effort consensus over
//! unreliable replicas.
//!
//! Thin orchestration over a handful of focused modules: each module owns
//! one concern (artifact, replica, coordinator, driver, harness) and
//! `lib.rs` just wires them together for the two binaries.

pub mod artifact;
pub mod clock;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod harness;
pub mod replica;
pub mod rng;

pub use artifact::Artifact;
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{Coordinator, LongRetryConfig, RestoreConfig, RestoredArtifact, UpdateConfig};
pub use driver::DriverConfig;
pub use error::{Error, Result};
pub use harness::{HarnessConfig, HarnessResult};
pub use replica::Replica;
