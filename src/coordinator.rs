//! The consensus coordinator: update propagation, long-retry recovery, and
//! restore reconciliation.
//!
//! Two invariants shape the outer-loop structure below (see `DESIGN.md`
//! for the full rationale):
//!
//! 1. `update_consensus` success requires every replica to have ACKed, not
//!    merely that the `remaining` set ended up empty — a naive loop can
//!    conflate "everyone is unresponsive" with "everyone succeeded"
//!    because both empty `remaining`. A `retry_limit` of zero must return
//!    `false` with everyone unresponsive, which only holds once that
//!    conflation is resolved.
//! 2. A replica that exhausts its retry budget is guaranteed to land in
//!    `unresponsive` before the call returns, by re-checking the budget at
//!    the top of the next outer-loop pass rather than only at the very
//!    end.

use std::collections::HashMap;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::clock::Clock;
use crate::replica::{Replica, RetrieveResponse, CLIENT_SENDER};

/// Tuning parameters for [`Coordinator::update_consensus`].
#[derive(Debug, Clone, Copy)]
pub struct UpdateConfig {
    pub ack_timeout_ms: u64,
    pub retry_limit: u32,
    pub retry_period_ms: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 2,
            retry_limit: 3,
            retry_period_ms: 5,
        }
    }
}

/// Tuning parameters for [`Coordinator::retry_unresponsive`].
#[derive(Debug, Clone, Copy)]
pub struct LongRetryConfig {
    pub long_retry_limit: u32,
    pub retry_interval_s: f64,
}

impl Default for LongRetryConfig {
    fn default() -> Self {
        Self {
            long_retry_limit: 5,
            retry_interval_s: 0.02,
        }
    }
}

/// Tuning parameters for [`Coordinator::restore_consensus`].
#[derive(Debug, Clone, Copy)]
pub struct RestoreConfig {
    pub retry_limit: u32,
    pub retry_period_ms: u64,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            retry_limit: 2,
            retry_period_ms: 5,
        }
    }
}

/// Result of a successful [`Coordinator::restore_consensus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredArtifact {
    pub version: u64,
    pub content: Vec<u8>,
    pub file_name: String,
}

/// Owns the replica set and drives the update and restore protocols.
pub struct Coordinator<C: Clock> {
    replicas: Vec<Replica>,
    unresponsive: HashSet<usize>,
    unavailable: HashSet<usize>,
    clock: C,
}

impl<C: Clock> Coordinator<C> {
    /// Creates a coordinator over `replicas`, in the given (stable) order.
    pub fn new(replicas: Vec<Replica>, clock: C) -> Self {
        Self {
            replicas,
            unresponsive: HashSet::new(),
            unavailable: HashSet::new(),
            clock,
        }
    }

    #[must_use]
    pub fn replicas(&self) -> &[Replica] {
        &self.replicas
    }

    pub fn replicas_mut(&mut self) -> &mut [Replica] {
        &mut self.replicas
    }

    /// IDs of replicas that exceeded their retry budget during the most
    /// recent `update_consensus` or `restore_consensus` call.
    pub fn unresponsive_ids(&self) -> Vec<u64> {
        self.ids_of(&self.unresponsive)
    }

    /// IDs of replicas promoted out of `unresponsive` after long-retry
    /// exhaustion; considered permanently out for the rest of the session.
    pub fn unavailable_ids(&self) -> Vec<u64> {
        self.ids_of(&self.unavailable)
    }

    fn ids_of(&self, indices: &HashSet<usize>) -> Vec<u64> {
        let mut ids: Vec<u64> = indices.iter().map(|&idx| self.replicas[idx].id()).collect();
        ids.sort_unstable();
        ids
    }

    /// Validates an artifact the same way a replica would.
    #[must_use]
    pub fn validate(&self, artifact: &Artifact) -> bool {
        let (ok, reason) = artifact.validate_default();
        if !ok {
            debug!(reason, "coordinator: validation failed");
        }
        ok
    }

    /// Drives every replica to ACK `artifact`, retrying per-replica up to
    /// `config.retry_limit` times, sleeping `config.retry_period_ms`
    /// between outer-loop passes. Returns `true` iff every replica ACKed.
    ///
    /// `now_ms` is captured once, before the outer loop starts, and reused
    /// for every replica and every pass — matching the single
    /// `current_time_ms` reading an update call makes upstream. A replica
    /// that goes DOWN partway through this call cannot recover until a
    /// later `update_consensus` or `retry_unresponsive` call reads a fresh
    /// clock value.
    pub fn update_consensus(&mut self, artifact: &Artifact, config: &UpdateConfig) -> bool {
        info!(
            name = artifact.name(),
            version = artifact.version(),
            "starting update consensus"
        );

        let now_ms = self.clock.now_ms();
        let n = self.replicas.len();
        let mut remaining: Vec<usize> = (0..n).collect();
        let mut retries = vec![0u32; n];
        let mut any_unresponsive = false;

        loop {
            let mut next_remaining = Vec::with_capacity(remaining.len());

            for &idx in &remaining {
                if retries[idx] >= config.retry_limit {
                    warn!(
                        replica = self.replicas[idx].id(),
                        "retry budget exhausted, marking unresponsive"
                    );
                    self.unresponsive.insert(idx);
                    any_unresponsive = true;
                    continue;
                }

                let applied = self.replicas[idx].update(artifact, now_ms, CLIENT_SENDER);

                if applied && self.await_ack(idx, config.ack_timeout_ms) {
                    debug!(replica = self.replicas[idx].id(), "ack received");
                    continue;
                }

                retries[idx] += 1;
                next_remaining.push(idx);
            }

            remaining = next_remaining;
            if remaining.is_empty() {
                break;
            }

            debug!(
                remaining = remaining.len(),
                retry_period_ms = config.retry_period_ms,
                "waiting before next retry pass"
            );
            std::thread::sleep(Duration::from_millis(config.retry_period_ms));
        }

        let success = remaining.is_empty() && !any_unresponsive;
        if success {
            info!("update consensus: all replicas acked");
        } else {
            info!(
                unresponsive = self.unresponsive.len(),
                "update consensus: some replicas did not ack"
            );
        }
        success
    }

    /// Waits up to `ack_timeout_ms` (polling roughly every millisecond) for
    /// `replicas[idx].send_ack()` to yield a non-empty record.
    fn await_ack(&self, idx: usize, ack_timeout_ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(ack_timeout_ms);
        loop {
            if self.replicas[idx].send_ack().is_some() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Periodically retries replicas that exhausted their update-phase
    /// retry budget. Replicas still unresponsive after `long_retry_limit`
    /// rounds are moved into `unavailable` for the rest of the session.
    pub fn retry_unresponsive(&mut self, artifact: &Artifact, config: &LongRetryConfig) {
        let mut round = 0;
        while !self.unresponsive.is_empty() && round < config.long_retry_limit {
            let snapshot: Vec<usize> = self.unresponsive.iter().copied().collect();
            info!(round, count = snapshot.len(), "long-retry round");

            for idx in snapshot {
                let now_ms = self.clock.now_ms();
                if self.replicas[idx].update(artifact, now_ms, CLIENT_SENDER)
                    && self.replicas[idx].send_ack().is_some()
                {
                    info!(replica = self.replicas[idx].id(), "recovered via long retry");
                    self.unresponsive.remove(&idx);
                }
            }

            round += 1;
            if !self.unresponsive.is_empty() {
                std::thread::sleep(Duration::from_secs_f64(config.retry_interval_s));
            }
        }

        if !self.unresponsive.is_empty() {
            warn!(
                count = self.unresponsive.len(),
                "long-retry exhausted, moving remaining replicas to unavailable"
            );
            for idx in self.unresponsive.drain() {
                self.unavailable.insert(idx);
            }
        }
    }

    /// Collects up to `config.retry_limit` rounds of `retrieve()` responses
    /// and reconciles them by content hash (majority rule, then weighted
    /// fallback). Returns `None` if no replica ever responded.
    pub fn restore_consensus(&mut self, config: &RestoreConfig) -> Option<RestoredArtifact> {
        info!("starting restore consensus");

        let n = self.replicas.len();
        // Replicas already in `unavailable` are permanently out for this
        // session (§3) — skip them rather than let a `retrieve()` miss
        // re-insert them into `unresponsive`, which would violate
        // `unresponsive ∩ unavailable = ∅`.
        let mut remaining: Vec<usize> = (0..n).filter(|idx| !self.unavailable.contains(idx)).collect();
        let mut retries = vec![0u32; n];
        let mut collected: Vec<(u32, RetrieveResponse)> = Vec::new();

        for round in 0..config.retry_limit {
            if remaining.is_empty() {
                break;
            }
            debug!(round, remaining = remaining.len(), "restore collection round");

            let mut next_remaining = Vec::with_capacity(remaining.len());
            for &idx in &remaining {
                match self.replicas[idx].retrieve() {
                    Some(response) => collected.push((self.replicas[idx].weight(), response)),
                    None => {
                        retries[idx] += 1;
                        if retries[idx] >= config.retry_limit {
                            warn!(
                                replica = self.replicas[idx].id(),
                                "marking unresponsive during restore"
                            );
                            self.unresponsive.insert(idx);
                        } else {
                            next_remaining.push(idx);
                        }
                    }
                }
            }

            remaining = next_remaining;
            if !remaining.is_empty() {
                std::thread::sleep(Duration::from_millis(config.retry_period_ms));
            }
        }

        if collected.is_empty() {
            info!("restore consensus: no responses collected");
            return None;
        }

        // total_servers is snapshotted here, at the end of collection, not
        // re-evaluated per group.
        let total_servers = self.replicas.len() - self.unresponsive.len();
        reconcile(collected, total_servers)
    }
}

/// One content-hash group accumulated during reconciliation.
struct Group {
    total_weight: u64,
    count: usize,
    representative: RetrieveResponse,
}

/// Groups responses by content hash, applies majority rule, and falls back
/// to the highest-summed-weight group.
///
/// Grouping preserves first-seen order so that tie-breaks ("first in
/// iteration order wins") are deterministic.
fn reconcile(collected: Vec<(u32, RetrieveResponse)>, total_servers: usize) -> Option<RestoredArtifact> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();

    for (weight, response) in collected {
        let hash = Artifact::new(response.name.clone(), response.content.clone(), response.version)
            .hash()
            .to_string();

        match groups.get_mut(&hash) {
            Some(group) => {
                group.total_weight += u64::from(weight);
                group.count += 1;
            }
            None => {
                order.push(hash.clone());
                groups.insert(
                    hash,
                    Group {
                        total_weight: u64::from(weight),
                        count: 1,
                        representative: response,
                    },
                );
            }
        }
    }

    // Majority rule: first group (in first-seen order) whose response count
    // strictly exceeds half of the currently-eligible replica count.
    for hash in &order {
        let group = &groups[hash];
        if total_servers > 0 && group.count * 2 > total_servers {
            info!(hash, count = group.count, total_servers, "restore: majority rule selected group");
            return Some(to_restored(&group.representative));
        }
    }

    // Weighted fallback: largest summed weight, ties broken by first-seen
    // order (the `for hash in &order` scan visits ties in that order and
    // only replaces on a strictly greater weight).
    let mut best: Option<&str> = None;
    let mut best_weight = 0u64;
    for hash in &order {
        let group = &groups[hash];
        if best.is_none() || group.total_weight > best_weight {
            best = Some(hash);
            best_weight = group.total_weight;
        }
    }

    best.map(|hash| {
        let group = &groups[hash];
        info!(
            hash,
            total_weight = group.total_weight,
            "restore: weighted fallback selected group"
        );
        to_restored(&group.representative)
    })
}

fn to_restored(response: &RetrieveResponse) -> RestoredArtifact {
    RestoredArtifact {
        version: response.version,
        content: response.content.clone(),
        file_name: response.name.clone(),
    }
}


#[cfg(test)]
mod reconcile_properties {
    use super::*;
    use proptest::prelude::*;

    fn content_for(idx: u8) -> Vec<u8> {
        vec![b'A' + idx]
    }

    prop_compose! {
        fn responses()(entries in prop::collection::vec((0u8..4, 1u32..20), 2..9))
            -> Vec<(u32, RetrieveResponse)> {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (content_idx, weight))| {
                    (
                        weight,
                        RetrieveResponse {
                            server_id: i as u64,
                            version: 1,
                            content: content_for(content_idx),
                            name: "f.txt".into(),
                        },
                    )
                })
                .collect()
        }
    }

    proptest! {
        /// A content group with a strict majority of respondents always
        /// wins, regardless of how weight is distributed among the rest.
        #[test]
        fn majority_group_wins_regardless_of_weight(collected in responses()) {
            let total = collected.len();
            let mut counts: HashMap<Vec<u8>, usize> = HashMap::new();
            for (_, response) in &collected {
                *counts.entry(response.content.clone()).or_insert(0) += 1;
            }
            let majority = counts.iter().find(|(_, &count)| count * 2 > total);

            let restored = reconcile(collected, total).unwrap();

            if let Some((content, _)) = majority {
                prop_assert_eq!(&restored.content, content);
            }
        }

        /// When no group holds a strict majority, the winner is always one
        /// of the groups with maximal summed weight.
        #[test]
        fn no_majority_winner_has_maximal_weight(collected in responses()) {
            let total = collected.len();
            let mut counts: HashMap<Vec<u8>, usize> = HashMap::new();
            let mut weights: HashMap<Vec<u8>, u64> = HashMap::new();
            for (weight, response) in &collected {
                *counts.entry(response.content.clone()).or_insert(0) += 1;
                *weights.entry(response.content.clone()).or_insert(0) += u64::from(*weight);
            }
            let has_majority = counts.values().any(|&count| count * 2 > total);

            let restored = reconcile(collected, total).unwrap();

            if !has_majority {
                let max_weight = weights.values().copied().max().unwrap();
                prop_assert_eq!(weights[&restored.content], max_weight);
            }
        }
    }
}
