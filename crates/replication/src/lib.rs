//! Replica selection and quorum execution on top of the ring.
//!
//! This crate provides:
//! - [`Ring`]: the atomically swapped ring snapshot and its lookups
//! - Replication strategies deciding which replicas a request goes to
//! - [`ReplicationSet`] and its quorum executor
//! - Change notifications and ring-backed service discovery

pub mod config;
pub mod discovery;
pub mod replication_set;
pub mod ring;
pub mod strategy;
pub mod subscribe;

pub use config::RingConfig;
pub use discovery::RingServiceDiscovery;
pub use replication_set::{has_replication_set_changed, QuorumError, ReplicationSet};
pub use ring::{ReadRing, Ring};
pub use strategy::{DefaultReplicationStrategy, IgnoreUnhealthyInstancesReplicationStrategy, ReplicationStrategy};
pub use subscribe::ReplicationSetWatcher;
