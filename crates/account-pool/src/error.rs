//! Error types for pool operations

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no account available: {0}")]
    NoAccountAvailable(String),

    #[error("capacity exhausted: no account has {required} bytes of remaining quota")]
    CapacityExhausted { required: u64 },

    #[error("account not found: {0}")]
    NotFound(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
