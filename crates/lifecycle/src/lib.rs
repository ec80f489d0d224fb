//! Membership lifecycle of one ring member.
//!
//! The [`Lifecycler`] registers an instance in the shared ring, keeps its
//! heartbeat fresh, moves it through JOINING, ACTIVE, LEAVING and LEFT, and
//! removes members that stopped heartbeating.

pub mod config;
pub mod delegate;
pub mod error;
pub mod lifecycler;

pub use config::LifecyclerConfig;
pub use delegate::{FlushTransferer, NoopFlushTransferer};
pub use error::{Error, Result};
pub use lifecycler::Lifecycler;
