//! Demonstrates running the eight named sweep configurations directly
//! against the library, without going through the `quorumfs-sweep` binary.
//! Useful as a quick smoke check when iterating on `harness::default_named_configs`.

use quorumfs::harness;

fn main() {
    tracing_subscriber::fmt::init();

    for config in harness::default_named_configs() {
        let result = harness::run_config(&config, 7);
        println!(
            "{:<28} retry_limit={:<2} restore_accuracy={:.2}",
            result.config_name, result.retry_limit, result.restore_accuracy
        );
    }
}
