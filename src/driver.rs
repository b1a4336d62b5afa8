//! External driving logic: bootstrap, the update loop, and restore.
//!
//! Plays the role of a client driving the coordinator: create the first
//! artifact, push it to every replica, then repeatedly push new versions
//! with a randomized delay between them, interleaving long-retry recovery
//! passes, and finally restore.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::artifact::Artifact;
use crate::clock::Clock;
use crate::coordinator::{Coordinator, LongRetryConfig, RestoredArtifact, UpdateConfig};
use crate::replica::CLIENT_SENDER;

/// Tuning for [`run_updates`]'s inter-update pacing.
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    pub update_count: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            update_count: 5,
            min_delay_ms: 10,
            max_delay_ms: 30,
        }
    }
}

/// Builds the first version of an artifact, ready to be bootstrapped onto
/// every replica before any consensus round runs.
pub fn create_initial_artifact(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Artifact {
    Artifact::initial(name, content)
}

/// Bootstraps `artifact` onto every replica directly, bypassing the update
/// protocol's retry/ack machinery (there is nothing to reconcile yet).
/// Returns the number of replicas that accepted the store.
pub fn distribute<C: Clock>(coordinator: &mut Coordinator<C>, artifact: &Artifact) -> usize {
    let mut accepted = 0;
    for replica in coordinator.replicas_mut() {
        if replica.store(artifact, CLIENT_SENDER) {
            accepted += 1;
        }
    }
    info!(accepted, total = coordinator.replicas().len(), "initial distribution complete");
    accepted
}

/// Drives `config.update_count` successive versions of `artifact` through
/// the update protocol, waiting a random delay (drawn from `rng`) between
/// rounds and running a long-retry pass after every update.
///
/// Returns the final artifact version reached.
pub fn run_updates<C: Clock>(
    coordinator: &mut Coordinator<C>,
    mut artifact: Artifact,
    driver_config: &DriverConfig,
    update_config: &UpdateConfig,
    long_retry_config: &LongRetryConfig,
    rng: &mut ChaCha8Rng,
) -> Artifact {
    for round in 0..driver_config.update_count {
        let delay = if driver_config.min_delay_ms == driver_config.max_delay_ms {
            driver_config.min_delay_ms
        } else {
            rng.gen_range(driver_config.min_delay_ms..=driver_config.max_delay_ms)
        };
        std::thread::sleep(std::time::Duration::from_millis(delay));

        artifact = artifact.next_version(format!("Updated content for version {}.", artifact.version() + 1));
        let ok = coordinator.update_consensus(&artifact, update_config);
        info!(round, version = artifact.version(), ok, "update round complete");

        coordinator.retry_unresponsive(&artifact, long_retry_config);
    }
    artifact
}

/// Runs the restore protocol once and returns what was recovered, if
/// anything.
pub fn restore<C: Clock>(
    coordinator: &mut Coordinator<C>,
    restore_config: &crate::coordinator::RestoreConfig,
) -> Option<RestoredArtifact> {
    coordinator.restore_consensus(restore_config)
}
