//! The ring descriptor: the whole membership as one versioned value.
//!
//! Every member reads and CAS-writes this value through the membership store.
//! Each member only ever writes its own entry, except for the forget path,
//! where any observer may delete an entry whose heartbeat is too old.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::member::{InstanceDesc, InstanceState};
use crate::token::generate_tokens;

/// All members of the ring keyed by instance id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingDesc {
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceDesc>,
}

impl RingDesc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `desc.id`.
    pub fn add_instance(&mut self, desc: InstanceDesc) -> &mut InstanceDesc {
        match self.instances.entry(desc.id.clone()) {
            Entry::Occupied(mut entry) => {
                entry.insert(desc);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(desc),
        }
    }

    pub fn remove_instance(&mut self, id: &str) -> Option<InstanceDesc> {
        self.instances.remove(id)
    }

    pub fn instance(&self, id: &str) -> Option<&InstanceDesc> {
        self.instances.get(id)
    }

    pub fn instance_mut(&mut self, id: &str) -> Option<&mut InstanceDesc> {
        self.instances.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Tokens held by members that still count (everything but LEFT).
    pub fn taken_tokens(&self) -> HashSet<u32> {
        self.instances
            .values()
            .filter(|i| i.state != InstanceState::Left)
            .flat_map(|i| i.tokens.iter().copied())
            .collect()
    }

    /// Tokens of `id` that some other counting member also owns.
    pub fn token_conflicts(&self, id: &str) -> Vec<u32> {
        let Some(own) = self.instances.get(id) else {
            return Vec::new();
        };
        let others: HashSet<u32> = self
            .instances
            .values()
            .filter(|i| i.id != id && i.state != InstanceState::Left)
            .flat_map(|i| i.tokens.iter().copied())
            .collect();
        own.tokens.iter().copied().filter(|t| others.contains(t)).collect()
    }

    /// Regenerate the tokens of `id` that collide with a member that has
    /// precedence over it. Precedence goes to the earlier registration, then to
    /// the smaller id. Returns the number of replaced tokens.
    pub fn resolve_token_conflicts<R: Rng + ?Sized>(&mut self, id: &str, rng: &mut R) -> usize {
        let Some(own) = self.instances.get(id) else {
            return 0;
        };
        let own_rank = (own.registered_timestamp, own.id.clone());

        let mut winners: HashMap<u32, (i64, String)> = HashMap::new();
        for other in self.instances.values() {
            if other.id == id || other.state == InstanceState::Left {
                continue;
            }
            let rank = (other.registered_timestamp, other.id.clone());
            for token in &other.tokens {
                winners
                    .entry(*token)
                    .and_modify(|best| {
                        if rank < *best {
                            *best = rank.clone();
                        }
                    })
                    .or_insert_with(|| rank.clone());
            }
        }

        let losing: HashSet<u32> = own
            .tokens
            .iter()
            .copied()
            .filter(|t| winners.get(t).is_some_and(|rank| *rank < own_rank))
            .collect();
        if losing.is_empty() {
            return 0;
        }

        let mut taken = self.taken_tokens();
        taken.extend(losing.iter().copied());
        let replacements = generate_tokens(rng, losing.len(), &taken);

        if let Some(own) = self.instances.get_mut(id) {
            own.tokens.retain(|t| !losing.contains(t));
            own.tokens.extend(replacements);
            own.tokens.sort_unstable();
        }
        losing.len()
    }

    /// Remove every member, except `keep`, whose last heartbeat is older than
    /// `threshold`. Returns the ids removed.
    pub fn forget_stale(&mut self, now: i64, threshold: Duration, keep: &str) -> Vec<String> {
        let threshold = threshold.as_secs() as i64;
        let stale: Vec<String> = self
            .instances
            .values()
            .filter(|i| i.id != keep && now.saturating_sub(i.timestamp) > threshold)
            .map(|i| i.id.clone())
            .collect();
        for id in &stale {
            self.instances.remove(id);
        }
        stale
    }

    /// Number of members in each lifecycle state.
    pub fn instances_by_state(&self) -> BTreeMap<InstanceState, usize> {
        let mut counts: BTreeMap<InstanceState, usize> =
            InstanceState::ALL.iter().map(|s| (*s, 0)).collect();
        for instance in self.instances.values() {
            *counts.entry(instance.state).or_default() += 1;
        }
        counts
    }
}
