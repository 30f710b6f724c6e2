//! Error types shared by every TideKv component.

use thiserror::Error;

/// Result type alias using [`TideError`].
pub type Result<T> = std::result::Result<T, TideError>;

/// Unified error type for TideKv operations.
#[derive(Debug, Error)]
pub enum TideError {
    /// An underlying filesystem operation failed. Not retried by the engine;
    /// retry policy, if any, belongs to the caller.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk bytes could not be read back as a well-formed record. During
    /// startup replay corruption is recovered by truncation and never
    /// surfaces; on a direct read it is fatal to that read.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The pool, log, or engine has begun or completed shutdown.
    #[error("store is closed")]
    Closed,

    /// The value does not fit the record format's 16-bit length field.
    #[error("value of {0} bytes exceeds the record size limit")]
    ValueTooLarge(usize),
}
