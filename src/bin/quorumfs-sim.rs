//! Single-session driver CLI.
//!
//! Bootstraps a small replica cluster, drives a sequence of updates, and
//! attempts a restore, printing the outcome.

use clap::Parser;

use quorumfs::clock::SystemClock;
use quorumfs::coordinator::{Coordinator, LongRetryConfig, RestoreConfig, UpdateConfig};
use quorumfs::driver::{self, DriverConfig};
use quorumfs::replica::Replica;

/// Run one simulated session of the replicated file store.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Number of replicas to simulate (weights and failure probabilities
    /// are synthesized if not all overridden below).
    #[arg(long, default_value_t = 3)]
    replicas: u32,

    /// Probability a replica fails to apply a given update.
    #[arg(long, default_value_t = 0.1)]
    failure_prob: f64,

    /// Number of sequential updates to drive after the initial artifact.
    #[arg(long, default_value_t = 5)]
    updates: u32,

    /// Per-replica retry budget during the update protocol.
    #[arg(long, default_value_t = 3)]
    retry_limit: u32,

    /// Milliseconds between outer-loop retry passes.
    #[arg(long, default_value_t = 10)]
    retry_period_ms: u64,

    /// Milliseconds to wait for a replica's acknowledgement.
    #[arg(long, default_value_t = 5)]
    ack_timeout_ms: u64,

    /// Seed for the session's randomness (replica RNGs, inter-update
    /// delay draws).
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let replicas: Vec<Replica> = (0..args.replicas)
        .map(|i| {
            let weight = args.replicas - i;
            Replica::with_seed(
                u64::from(i),
                weight,
                args.failure_prob,
                10,
                30,
                args.seed.wrapping_add(u64::from(i)),
            )
            .expect("CLI-provided parameters should be valid; see --help")
        })
        .collect();

    let mut coordinator = Coordinator::new(replicas, SystemClock::new());
    let initial = driver::create_initial_artifact("initial_file.txt", "This is the initial content.");
    driver::distribute(&mut coordinator, &initial);

    let update_config = UpdateConfig {
        ack_timeout_ms: args.ack_timeout_ms,
        retry_limit: args.retry_limit,
        retry_period_ms: args.retry_period_ms,
    };
    let driver_config = DriverConfig {
        update_count: args.updates,
        ..DriverConfig::default()
    };
    let mut rng = quorumfs::rng::rng_for_seed(args.seed);

    let final_artifact = driver::run_updates(
        &mut coordinator,
        initial,
        &driver_config,
        &update_config,
        &LongRetryConfig::default(),
        &mut rng,
    );

    let restore_config = RestoreConfig {
        retry_limit: args.retry_limit,
        retry_period_ms: args.retry_period_ms,
    };
    match driver::restore(&mut coordinator, &restore_config) {
        Some(restored) => {
            let matches = restored.version == final_artifact.version();
            println!(
                "restored version {} ({} bytes), expected version {}, {}",
                restored.version,
                restored.content.len(),
                final_artifact.version(),
                if matches { "match" } else { "MISMATCH" }
            );
        }
        None => println!("restore failed: no replica produced a usable response"),
    }
}
