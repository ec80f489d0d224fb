//! Immutable lookup structure built from a ring descriptor.
//!
//! A snapshot is rebuilt wholesale on every membership change and never
//! mutated afterwards, so any number of readers can walk it concurrently.
//!
//! # Layout
//!
//! ```text
//! tokens: [  12,   90,  301,  777, ...]   sorted ascending
//! owners: [   2,    0,    2,    1, ...]   index into `instances`
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::desc::RingDesc;
use crate::error::{Error, Result};
use crate::member::{InstanceDesc, InstanceState};
use crate::operation::{should_extend_replica_set, Operation};
use crate::token::{distance, TOKEN_SPACE};

/// Sorted token index over one version of the ring.
#[derive(Clone, Debug, Default)]
pub struct RingSnapshot {
    desc: RingDesc,
    instances: Vec<InstanceDesc>,
    tokens: Vec<u32>,
    owners: Vec<usize>,
    zones: Vec<String>,
}

impl RingSnapshot {
    /// Build the token index. LEFT members stay in the descriptor but are left
    /// out of the snapshot. If two members claim the same token, the first one in id order
    /// keeps it until the lifecycler of the other one resolves the conflict.
    pub fn build(desc: RingDesc) -> Self {
        let instances: Vec<InstanceDesc> = desc
            .instances
            .values()
            .filter(|i| i.state != InstanceState::Left)
            .cloned()
            .collect();

        let mut pairs: Vec<(u32, usize)> = instances
            .iter()
            .enumerate()
            .flat_map(|(idx, i)| i.tokens.iter().map(move |t| (*t, idx)))
            .collect();
        pairs.sort_unstable();
        pairs.dedup_by_key(|(token, _)| *token);

        let (tokens, owners) = pairs.into_iter().unzip();

        let zones: BTreeSet<String> = instances
            .iter()
            .filter(|i| !i.zone.is_empty())
            .map(|i| i.zone.clone())
            .collect();

        Self {
            desc,
            instances,
            tokens,
            owners,
            zones: zones.into_iter().collect(),
        }
    }

    pub fn desc(&self) -> &RingDesc {
        &self.desc
    }

    pub fn instances(&self) -> &[InstanceDesc] {
        &self.instances
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn zones(&self) -> &[String] {
        &self.zones
    }

    pub fn instances_count(&self) -> usize {
        self.instances.len()
    }

    pub fn zones_count(&self) -> usize {
        self.zones.len()
    }

    pub fn has_instance(&self, id: &str) -> bool {
        self.desc.instance(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Walk the ring clockwise from `key` and collect candidate owners.
    ///
    /// # Algorithm
    ///
    /// 1. Start at the first token `>= key`, wrapping to index 0.
    /// 2. Skip members already collected (a member owns many tokens).
    /// 3. With `zone_aware`, skip members whose zone is already represented.
    /// 4. Stop after `rf` members, plus one for every member whose state
    ///    extends the replica set for `op`, or after a full turn.
    ///
    /// Health filtering is left to the replication strategy.
    ///
    /// # Performance
    /// - **Time**: O(log t + t) worst case, O(log t + rf * v) typically
    ///   (t = tokens, v = tokens per member)
    pub fn walk(&self, key: u32, op: Operation, rf: usize, zone_aware: bool) -> Result<Vec<InstanceDesc>> {
        if self.tokens.is_empty() {
            return Err(Error::EmptyRing);
        }

        let start = self.tokens.partition_point(|t| *t < key) % self.tokens.len();
        let mut wanted = rf;
        let mut picked: Vec<InstanceDesc> = Vec::with_capacity(rf);
        let mut seen: HashSet<usize> = HashSet::with_capacity(rf);
        let mut seen_zones: HashSet<&str> = HashSet::with_capacity(rf);

        for step in 0..self.tokens.len() {
            if picked.len() >= wanted {
                break;
            }
            let owner = self.owners[(start + step) % self.tokens.len()];
            if seen.contains(&owner) {
                continue;
            }
            let instance = &self.instances[owner];
            if zone_aware && !instance.zone.is_empty() && !seen_zones.insert(instance.zone.as_str()) {
                continue;
            }
            seen.insert(owner);
            if should_extend_replica_set(instance.state, op) {
                wanted += 1;
            }
            picked.push(instance.clone());
        }

        Ok(picked)
    }

    /// Fraction of the token space each member is primary owner of.
    ///
    /// A token owns the range from the previous token (exclusive) up to itself.
    pub fn ownership(&self) -> BTreeMap<String, f64> {
        let mut owned: BTreeMap<String, f64> = self
            .instances
            .iter()
            .map(|i| (i.id.clone(), 0.0))
            .collect();
        let n = self.tokens.len();
        for idx in 0..n {
            // With a single token prev == token, and the distance is a full turn.
            let prev = self.tokens[(idx + n - 1) % n];
            let span = distance(prev, self.tokens[idx]) as f64;
            let id = &self.instances[self.owners[idx]].id;
            *owned.entry(id.clone()).or_default() += span / TOKEN_SPACE;
        }
        owned
    }
}
