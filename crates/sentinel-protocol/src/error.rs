//! Error types for decoding and feeding events.

use thiserror::Error;

/// Errors raised at the edges of the system (decoding, feeds).
///
/// The aggregation engine itself never fails; these only describe input that
/// could not be turned into an event in the first place.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("unknown direction: {0}")]
    UnknownDirection(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("feed closed")]
    FeedClosed,
}

impl From<serde_json::Error> for SentinelError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for SentinelError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// Convenience result type for decoding and feed operations.
pub type SentinelResult<T> = Result<T, SentinelError>;
