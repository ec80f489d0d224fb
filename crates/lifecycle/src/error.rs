//! Error types for the lifecycler.

/// Result type alias for the lifecycler.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Ring(#[from] corelib::Error),

    #[error("membership store error: {0}")]
    Store(#[from] kv::Error),

    /// The ring write went through but our own entry is missing from it.
    #[error("instance {0} is not registered in the ring")]
    NotRegistered(String),
}
