//! Error types for the membership store.

/// Result type alias for the membership store.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by membership store clients.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The backing store failed.
    #[error("store error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}
