//! Per-replica seeded randomness.
//!
//! Failure draws, recovery-delay draws, and retrieve-failure draws are
//! seedable per replica rather than pulled from a process-global stream,
//! so that tests are reproducible.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Derives a deterministic default seed for a replica from its id.
///
/// Used when a caller constructs a replica without an explicit seed; two
/// replicas with the same id and no explicit seed draw the same sequence,
/// which is intentional for reproducible default runs and is overridden by
/// passing an explicit seed for anything that needs independent streams.
#[must_use]
pub fn default_seed(replica_id: u64) -> u64 {
    // A fixed odd multiplier spreads adjacent ids across the seed space
    // instead of handing ChaCha8 near-identical seeds for ids 0, 1, 2, ...
    replica_id.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ 0xD1B5_4A32_D192_ED03
}

/// Creates a seeded RNG for a replica.
#[must_use]
pub fn rng_for_seed(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}
