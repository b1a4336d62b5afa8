//! Batch-experiment harness.
//!
//! Runs a named configuration across several independent sessions,
//! computes the fraction that restored the correct final artifact
//! (`restore_accuracy`), and writes one semicolon-separated results row
//! per configuration, with a fixed column contract: `Config; retry_limit;
//! retry_period_ms; ack_timeout_ms; failure_probs; recovery_delays;
//! weights; restore_accuracy`.

use std::io::Write as _;
use std::path::Path;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::clock::SystemClock;
use crate::coordinator::{Coordinator, LongRetryConfig, RestoreConfig, UpdateConfig};
use crate::driver::{self, DriverConfig};
use crate::error::{Error, Result};
use crate::replica::Replica;
use crate::rng::rng_for_seed;

/// Per-replica parameters for one harness configuration. Position `i`
/// describes replica `i`; all three vectors must be the same length.
#[derive(Debug, Clone)]
pub struct ReplicaProfile {
    pub weight: u32,
    pub failure_prob: f64,
    pub recovery_delay_min: u64,
    pub recovery_delay_max: u64,
}

/// One named cluster/protocol configuration to sweep.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub name: String,
    pub replicas: Vec<ReplicaProfile>,
    pub update: UpdateConfig,
    pub long_retry: LongRetryConfig,
    pub restore: RestoreConfig,
    pub driver: DriverConfig,
    pub sessions: u32,
}

/// Outcome of running one [`HarnessConfig`] `sessions` times.
#[derive(Debug, Clone)]
pub struct HarnessResult {
    pub config_name: String,
    pub retry_limit: u32,
    pub retry_period_ms: u64,
    pub ack_timeout_ms: u64,
    pub failure_probs: Vec<f64>,
    pub recovery_delays: Vec<(u64, u64)>,
    pub weights: Vec<u32>,
    pub restore_accuracy: f64,
}

/// Runs one session (bootstrap, updates, restore) and reports whether the
/// restored artifact matches the final driven version.
fn run_session(config: &HarnessConfig, session_seed: u64) -> bool {
    let mut rng: ChaCha8Rng = rng_for_seed(session_seed);

    let replicas: Vec<Replica> = config
        .replicas
        .iter()
        .enumerate()
        .map(|(i, profile)| {
            let replica_seed = rng.r#gen::<u64>();
            Replica::with_seed(
                i as u64,
                profile.weight,
                profile.failure_prob,
                profile.recovery_delay_min,
                profile.recovery_delay_max,
                replica_seed,
            )
            .expect("harness configs are validated before use")
        })
        .collect();

    let mut coordinator = Coordinator::new(replicas, SystemClock::new());
    let initial = driver::create_initial_artifact("initial_file.txt", "This is the initial content.");
    driver::distribute(&mut coordinator, &initial);

    let final_artifact = driver::run_updates(
        &mut coordinator,
        initial,
        &config.driver,
        &config.update,
        &config.long_retry,
        &mut rng,
    );

    match driver::restore(&mut coordinator, &config.restore) {
        Some(restored) => {
            restored.version == final_artifact.version() && restored.content == final_artifact.content()
        }
        None => false,
    }
}

/// Runs `config.sessions` independent sessions and summarizes the result.
///
/// `base_seed` seeds each session deterministically (`base_seed + session
/// index`), so a harness run is reproducible given the same seed.
#[must_use]
pub fn run_config(config: &HarnessConfig, base_seed: u64) -> HarnessResult {
    info!(config = config.name, sessions = config.sessions, "running harness config");

    let mut successes = 0u32;
    for session in 0..config.sessions {
        if run_session(config, base_seed.wrapping_add(u64::from(session))) {
            successes += 1;
        }
    }

    let restore_accuracy = f64::from(successes) / f64::from(config.sessions.max(1));

    HarnessResult {
        config_name: config.name.clone(),
        retry_limit: config.update.retry_limit,
        retry_period_ms: config.update.retry_period_ms,
        ack_timeout_ms: config.update.ack_timeout_ms,
        failure_probs: config.replicas.iter().map(|r| r.failure_prob).collect(),
        recovery_delays: config
            .replicas
            .iter()
            .map(|r| (r.recovery_delay_min, r.recovery_delay_max))
            .collect(),
        weights: config.replicas.iter().map(|r| r.weight).collect(),
        restore_accuracy,
    }
}

/// Runs every config in `configs` and writes one semicolon-separated row
/// per result to `path`, in the fixed column order above.
pub fn write_results(path: impl AsRef<Path>, results: &[HarnessResult]) -> Result<()> {
    let path = path.as_ref();
    let mut out = String::new();
    out.push_str("Config;retry_limit;retry_period_ms;ack_timeout_ms;failure_probs;recovery_delays;weights;restore_accuracy\n");
    for result in results {
        out.push_str(&format!(
            "{};{};{};{};{};{};{};{:.4}\n",
            result.config_name,
            result.retry_limit,
            result.retry_period_ms,
            result.ack_timeout_ms,
            format_floats(&result.failure_probs),
            format_ranges(&result.recovery_delays),
            format_u32s(&result.weights),
            result.restore_accuracy,
        ));
    }

    std::fs::File::create(path)
        .and_then(|mut file| file.write_all(out.as_bytes()))
        .map_err(|source| Error::HarnessWrite {
            path: path.display().to_string(),
            source,
        })
}

fn format_floats(values: &[f64]) -> String {
    values.iter().map(|v| format!("{v:.2}")).collect::<Vec<_>>().join(",")
}

fn format_u32s(values: &[u32]) -> String {
    values.iter().map(u32::to_string).collect::<Vec<_>>().join(",")
}

/// Builds one [`HarnessConfig`] from the per-replica profiles and shared
/// update/restore knobs (retry_limit and retry_period_ms are shared
/// between the update and restore phases).
fn named(
    name: &str,
    retry_limit: u32,
    retry_period_ms: u64,
    ack_timeout_ms: u64,
    profiles: Vec<ReplicaProfile>,
) -> HarnessConfig {
    HarnessConfig {
        name: name.to_string(),
        replicas: profiles,
        update: UpdateConfig {
            ack_timeout_ms,
            retry_limit,
            retry_period_ms,
        },
        long_retry: LongRetryConfig::default(),
        restore: RestoreConfig {
            retry_limit,
            retry_period_ms,
        },
        driver: DriverConfig {
            update_count: 5,
            ..DriverConfig::default()
        },
        sessions: 100,
    }
}

fn p(weight: u32, failure_prob: f64, recovery_delay_min: u64, recovery_delay_max: u64) -> ReplicaProfile {
    ReplicaProfile {
        weight,
        failure_prob,
        recovery_delay_min,
        recovery_delay_max,
    }
}

/// Eight named configurations spanning stress, retry-tuning, reliability,
/// and weighted-fallback cases, 100 sessions each.
#[must_use]
pub fn default_named_configs() -> Vec<HarnessConfig> {
    vec![
        named(
            "Stress_test",
            1,
            5,
            2,
            vec![p(10, 0.4, 30, 50), p(5, 0.5, 40, 60), p(2, 0.6, 50, 70)],
        ),
        named(
            "Higher_retry",
            5,
            20,
            10,
            vec![p(10, 0.4, 30, 50), p(5, 0.5, 40, 60), p(2, 0.6, 50, 70)],
        ),
        named(
            "Low_retry_High_failure",
            3,
            10,
            5,
            vec![p(10, 0.2, 15, 25), p(7, 0.3, 20, 30), p(2, 0.5, 25, 35)],
        ),
        named(
            "High_retry_Medium_failure",
            5,
            20,
            10,
            vec![p(10, 0.1, 5, 15), p(7, 0.2, 15, 25), p(2, 0.3, 20, 30)],
        ),
        named(
            "Reliable",
            3,
            10,
            5,
            vec![p(10, 0.05, 5, 15), p(9, 0.1, 8, 18), p(8, 0.1, 10, 20)],
        ),
        named(
            "Low_retry_Low_failure",
            1,
            5,
            2,
            vec![p(10, 0.05, 10, 25), p(9, 0.1, 12, 30), p(8, 0.1, 15, 35)],
        ),
        named(
            "High_Retry_High_Latency",
            6,
            20,
            12,
            vec![p(10, 0.1, 30, 60), p(7, 0.2, 25, 55), p(5, 0.3, 20, 50)],
        ),
        named(
            "Weight_fallback_test",
            3,
            10,
            6,
            vec![p(10, 0.1, 10, 25), p(3, 0.5, 10, 20), p(2, 0.5, 10, 20)],
        ),
    ]
}

fn format_ranges(values: &[(u64, u64)]) -> String {
    values
        .iter()
        .map(|(min, max)| format!("{min}-{max}"))
        .collect::<Vec<_>>()
        .join(",")
}
