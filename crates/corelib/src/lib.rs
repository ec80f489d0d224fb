//! Core data model of the replication ring.
//!
//! This crate provides the synchronous building blocks:
//! - Member descriptors and their lifecycle states
//! - The ring descriptor stored in the membership store
//! - Token generation and key partitioning
//! - Per-operation health policy
//! - The immutable ring snapshot and its ring walk

pub mod desc;
pub mod error;
pub mod member;
pub mod operation;
pub mod partitioner;
pub mod snapshot;
pub mod token;

pub use desc::RingDesc;
pub use error::{Error, Result};
pub use member::{unix_now, InstanceDesc, InstanceState};
pub use operation::Operation;
pub use partitioner::Partitioner;
pub use snapshot::RingSnapshot;
