//! Error types for the core library.

use crate::member::InstanceState;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The ring holds no usable tokens.
    #[error("empty ring")]
    EmptyRing,

    /// Not enough healthy instances left after filtering to reach quorum.
    #[error(
        "at least {required} live replicas required{}, could only find {found}",
        zone_suffix(.zone_aware)
    )]
    TooManyUnhealthy {
        required: usize,
        found: usize,
        zone_aware: bool,
    },

    /// No instance with this id is registered in the ring.
    #[error("instance {0} not found in the ring")]
    InstanceNotFound(String),

    /// A lifecycle transition that the state machine does not allow.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: InstanceState,
        to: InstanceState,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

fn zone_suffix(zone_aware: &bool) -> &'static str {
    if *zone_aware {
        " across different availability zones"
    } else {
        ""
    }
}

impl Error {
    /// True for errors caused by the current cluster health rather than by
    /// the request itself; callers map these to a retryable response.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::EmptyRing | Error::TooManyUnhealthy { .. })
    }
}
