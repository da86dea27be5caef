use thiserror::Error;

/// Errors raised by the history store (§4.6).
#[derive(Debug, Error)]
pub enum Error {
    /// The in-memory ring is configured `drop-newest` and is at capacity.
    #[error("history ring for {key} is full (capacity {capacity})")]
    Overflow { key: String, capacity: usize },

    /// `replay(strict_sequence=true)` observed a non-contiguous sequence.
    #[error("sequence gap for {key}: expected {expected}, got {actual}")]
    SequenceGap {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// A non-admin principal queried history without a `room` scope.
    #[error("history queries require a room scope for non-admin principals")]
    ScopeRequired,

    #[error("durable backend error: {0}")]
    Durable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
