//! Membership store for the replication ring.
//!
//! This crate provides:
//! - The [`KvClient`] compare-and-swap contract with per-key watches
//! - [`InMemoryClient`], a single-process implementation
//! - Value codecs and a typed CAS loop with backoff

pub mod backoff;
pub mod cas;
pub mod client;
pub mod codec;
pub mod error;
pub mod memory;

pub use backoff::{Backoff, BackoffConfig};
pub use cas::{cas_loop, get_typed};
pub use client::{KvClient, Versioned};
pub use codec::Codec;
pub use error::{Error, Result};
pub use memory::InMemoryClient;
