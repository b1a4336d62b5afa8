//! Replica state machine: a `READY`/`DOWN` node backed by a per-replica
//! seeded [`rand_chacha::ChaCha8Rng`] and an explicit `now_ms` argument
//! sourced from a [`crate::clock::Clock`], rather than an implicit
//! wall-clock read or process-global randomness.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::artifact::Artifact;
use crate::error::{Error, Result};
use crate::rng::{default_seed, rng_for_seed};

/// Fixed probability that [`Replica::retrieve`] simulates a read failure,
/// independent of `operational` state.
const RETRIEVE_FAILURE_PROB: f64 = 0.2;

/// The sender identity accepted by [`Replica::store`] and
/// [`Replica::update`]. Anything else is rejected as unauthorized.
pub const CLIENT_SENDER: &str = "client";

/// Operational state of a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Down { recovery_at_ms: u64 },
}

/// Acknowledgement returned by [`Replica::send_ack`].
///
/// Always a non-empty record when invoked: the model relies on `update`
/// having returned `true` immediately before a caller asks for an ACK, it
/// never reports success/failure itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub status: AckStatus,
    pub server_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Received,
}

/// Response to [`Replica::retrieve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveResponse {
    pub server_id: u64,
    pub version: u64,
    pub content: Vec<u8>,
    pub name: String,
}

/// A single in-process replica node holding at most one artifact.
#[derive(Debug)]
pub struct Replica {
    id: u64,
    weight: u32,
    failure_prob: f64,
    recovery_delay_min: u64,
    recovery_delay_max: u64,
    stored: Option<Artifact>,
    state: State,
    rng: ChaCha8Rng,
}

impl Replica {
    /// Creates a new operational replica with no stored artifact, seeded
    /// deterministically from `id` (two replicas built with the same id and
    /// no explicit seed draw the same sequence; use
    /// [`Replica::with_seed`] for independent streams).
    pub fn new(
        id: u64,
        weight: u32,
        failure_prob: f64,
        recovery_delay_min: u64,
        recovery_delay_max: u64,
    ) -> Result<Self> {
        Self::with_seed(
            id,
            weight,
            failure_prob,
            recovery_delay_min,
            recovery_delay_max,
            default_seed(id),
        )
    }

    /// Creates a new operational replica with an explicit RNG seed.
    pub fn with_seed(
        id: u64,
        weight: u32,
        failure_prob: f64,
        recovery_delay_min: u64,
        recovery_delay_max: u64,
        seed: u64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&failure_prob) {
            return Err(Error::InvalidFailureProb(failure_prob));
        }
        if weight == 0 {
            return Err(Error::InvalidWeight(weight));
        }
        if recovery_delay_min > recovery_delay_max {
            return Err(Error::InvalidRecoveryDelayRange {
                min: recovery_delay_min,
                max: recovery_delay_max,
            });
        }
        Ok(Self {
            id,
            weight,
            failure_prob,
            recovery_delay_min,
            recovery_delay_max,
            stored: None,
            state: State::Ready,
            rng: rng_for_seed(seed),
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self.state, State::Ready)
    }

    /// The currently stored artifact's version, if any.
    #[must_use]
    pub fn stored_version(&self) -> Option<u64> {
        self.stored.as_ref().map(Artifact::version)
    }

    #[must_use]
    pub fn stored(&self) -> Option<&Artifact> {
        self.stored.as_ref()
    }

    /// Cluster-bootstrapping primitive: sets `stored` unconditionally (no
    /// version check), rejecting only an unauthorized sender or an invalid
    /// artifact. Returns whether the store took effect.
    pub fn store(&mut self, artifact: &Artifact, sender: &str) -> bool {
        if sender != CLIENT_SENDER {
            debug!(replica = self.id, "store rejected: unauthorized sender");
            return false;
        }
        let (ok, reason) = artifact.validate_default();
        if !ok {
            debug!(replica = self.id, reason, "store rejected: invalid artifact");
            return false;
        }
        debug!(
            replica = self.id,
            version = artifact.version(),
            hash = artifact.hash(),
            "artifact stored"
        );
        self.stored = Some(artifact.clone());
        true
    }

    /// Attempts to apply an update, checking preconditions in order:
    /// recovery, sender, validation, version, then the failure draw.
    pub fn update(&mut self, artifact: &Artifact, now_ms: u64, sender: &str) -> bool {
        if let State::Down { recovery_at_ms } = self.state {
            if now_ms >= recovery_at_ms {
                debug!(replica = self.id, "recovered and operational");
                self.state = State::Ready;
            } else {
                debug!(replica = self.id, "not operational");
                return false;
            }
        }

        if sender != CLIENT_SENDER {
            debug!(replica = self.id, "update rejected: unauthorized sender");
            return false;
        }

        let (ok, reason) = artifact.validate_default();
        if !ok {
            debug!(replica = self.id, reason, "update rejected: invalid artifact");
            return false;
        }

        if let Some(current) = &self.stored {
            if artifact.version() <= current.version() {
                debug!(
                    replica = self.id,
                    received = artifact.version(),
                    current = current.version(),
                    "update rejected: version not newer than current"
                );
                return false;
            }
        }

        if self.rng.r#gen::<f64>() < self.failure_prob {
            let delay = if self.recovery_delay_min == self.recovery_delay_max {
                self.recovery_delay_min
            } else {
                self.rng
                    .gen_range(self.recovery_delay_min..=self.recovery_delay_max)
            };
            let recovery_at_ms = now_ms + delay;
            warn!(
                replica = self.id,
                recovery_at_ms, "failed to apply the update, going down"
            );
            self.state = State::Down { recovery_at_ms };
            return false;
        }

        debug!(
            replica = self.id,
            version = artifact.version(),
            hash = artifact.hash(),
            "artifact updated successfully"
        );
        self.stored = Some(artifact.clone());
        true
    }

    /// Returns a non-empty acknowledgement. Carries identity only — callers
    /// rely on `update` having returned `true` beforehand.
    ///
    /// `Option`-typed even though this model always yields `Some` the
    /// moment it's invoked, so the coordinator's bounded poll-and-wait
    /// around this call also works against a tightened implementation that
    /// ties the ACK to the last `update` outcome instead.
    #[must_use]
    pub fn send_ack(&self) -> Option<Ack> {
        debug!(replica = self.id, "ack sent");
        Some(Ack {
            status: AckStatus::Received,
            server_id: self.id,
        })
    }

    /// Attempts to read back the stored artifact. Independent of
    /// `operational` state: a replica that is `DOWN` can still answer
    /// `retrieve`.
    pub fn retrieve(&mut self) -> Option<RetrieveResponse> {
        if self.rng.r#gen::<f64>() < RETRIEVE_FAILURE_PROB {
            debug!(replica = self.id, "simulated retrieve failure");
            return None;
        }
        match &self.stored {
            Some(artifact) => Some(RetrieveResponse {
                server_id: self.id,
                version: artifact.version(),
                content: artifact.content().to_vec(),
                name: artifact.name().to_string(),
            }),
            None => {
                debug!(replica = self.id, "no artifact available");
                None
            }
        }
    }
}
