//! Saga error types.

use thiserror::Error;

/// Errors that can escape saga processing.
///
/// `RetryLater` and `LostLease` are recoverable dispositions, not failures:
/// the outbox worker branches on the variant to pick the re-queue delay and
/// decide whether the attempt counts. Everything else indicates that the
/// processing round itself could not run to quiescence.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step hit a transient conflict; re-dispatch shortly without
    /// counting the attempt.
    #[error("Transient conflict: {0}")]
    RetryLater(String),

    /// A step's lease expired mid-work; re-dispatch after a moderate delay.
    #[error("Lease lost: {0}")]
    LostLease(String),

    /// Processing was aborted by a shutdown signal. The persisted snapshot
    /// is consistent; the message should be re-queued for another worker.
    #[error("Processing cancelled by shutdown")]
    Cancelled,

    /// The stored snapshot's data type does not match the requested one.
    #[error("Saga data type mismatch: stored '{stored}', requested '{requested}'")]
    DataTypeMismatch { stored: String, requested: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An outbox store error occurred.
    #[error("Outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),

    /// The snapshot payload could not be (de)serialized; the snapshot is
    /// corrupt.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;
