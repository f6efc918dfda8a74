use thiserror::Error;

/// Errors that can occur when interacting with the idempotency store.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// The caller's lease on a key expired (or was taken over) before it
    /// could seal the key. The work itself may still be valid; callers
    /// treat this as a retryable condition.
    #[error("Lease on key '{key}' was lost before completion")]
    LostLease { key: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for idempotency store operations.
pub type Result<T> = std::result::Result<T, IdempotencyError>;
