//! Step contract for saga participants.

use async_trait::async_trait;
use common::Shutdown;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// How a step execution or compensation failed.
#[derive(Debug, Error)]
pub enum StepError {
    /// A transient conflict (e.g. the step lock is held by another worker).
    /// The saga is re-dispatched shortly; the cursor does not move.
    #[error("Transient conflict: {0}")]
    RetryLater(String),

    /// The step's lease expired during the work. Re-execution is safe
    /// because the effect sits behind a domain idempotency key.
    #[error("Lease lost: {0}")]
    LostLease(String),

    /// A permanent failure. During execution this triggers reverse
    /// compensation; during compensation it is recorded and the remaining
    /// earlier steps are still compensated.
    #[error("{0}")]
    Failed(String),
}

/// Saga payload persisted alongside the snapshot.
///
/// The discriminator ties a stored snapshot to the step list assembled for
/// its saga type at the composition root.
pub trait SagaData: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Discriminator stored in the snapshot's `data_type` column.
    fn data_type() -> &'static str;
}

/// One forward action of a saga and its semantic undo.
///
/// Both directions must be idempotent: the outbox delivers at least once, so
/// a step can observe its own previous attempt. The usual recipe combines a
/// technical step-lock key (claimed from the idempotency store with a lease
/// of at least twice the expected execution time) with a domain idempotency
/// key passed to the effectful collaborator, so the effect stays safe even
/// across a step-lock expiry.
#[async_trait]
pub trait SagaStep<TData>: Send + Sync {
    /// Step name used in lock keys, logs and error messages.
    fn name(&self) -> &'static str;

    /// Performs the step's effect.
    async fn execute(&self, data: &TData, cancel: &Shutdown) -> Result<(), StepError>;

    /// Semantically undoes a previous (possibly partial) execution.
    async fn compensate(&self, data: &TData, cancel: &Shutdown) -> Result<(), StepError>;
}
