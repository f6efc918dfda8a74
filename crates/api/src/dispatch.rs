//! Outbox dispatch: routes messages to the saga engine.
//!
//! This is the composition root for saga types: for each message the
//! dispatcher assembles the step list with the stores wired in and hands the
//! rehydrated instance to the coordinator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::Shutdown;
use idempotency::IdempotencyStore;
use ledger::{LedgerService, LedgerStore};
use outbox::{DispatchError, OutboxDispatcher, OutboxMessage};
use saga::{
    START_SAGA_MESSAGE_TYPE, SagaCoordinator, SagaError, SagaRepository, saga_id_from_payload,
};
use transfer::{TransferData, transfer_steps};

/// Dispatches `StartSaga` messages for money transfer sagas.
///
/// Unknown message types and references to missing sagas are logged and
/// reported as handled so the message is finalized instead of looping.
pub struct StartSagaDispatcher<R, I, L> {
    repository: R,
    locks: I,
    ledger: Arc<LedgerService<L>>,
    step_lease: Duration,
}

impl<R: Clone, I: Clone, L> Clone for StartSagaDispatcher<R, I, L> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            locks: self.locks.clone(),
            ledger: self.ledger.clone(),
            step_lease: self.step_lease,
        }
    }
}

impl<R, I, L> StartSagaDispatcher<R, I, L> {
    /// Creates the dispatcher with its collaborators wired in.
    pub fn new(repository: R, locks: I, ledger: Arc<LedgerService<L>>, step_lease: Duration) -> Self {
        Self {
            repository,
            locks,
            ledger,
            step_lease,
        }
    }
}

fn map_saga_error(error: SagaError) -> DispatchError {
    match error {
        SagaError::RetryLater(reason) => DispatchError::RetryLater(reason),
        SagaError::LostLease(reason) => DispatchError::LostLease(reason),
        // Shutdown is not a failure; hand the message to another worker soon.
        SagaError::Cancelled => DispatchError::RetryLater("shutdown in progress".to_string()),
        other => DispatchError::Other(other.to_string()),
    }
}

#[async_trait]
impl<R, I, L> OutboxDispatcher for StartSagaDispatcher<R, I, L>
where
    R: SagaRepository<TransferData> + Clone,
    I: IdempotencyStore + Clone + 'static,
    L: LedgerStore + 'static,
{
    async fn dispatch(
        &self,
        message: &OutboxMessage,
        cancel: &Shutdown,
    ) -> Result<(), DispatchError> {
        if message.message_type != START_SAGA_MESSAGE_TYPE {
            tracing::warn!(
                id = %message.id,
                message_type = %message.message_type,
                "unknown outbox message type, marking processed"
            );
            return Ok(());
        }

        let Some(saga_id) = saga_id_from_payload(&message.payload) else {
            tracing::warn!(id = %message.id, "malformed StartSaga payload, marking processed");
            return Ok(());
        };

        // Step locks are claimed in the name of the worker that holds the
        // outbox lease for this message.
        let owner = message
            .locked_by
            .clone()
            .unwrap_or_else(|| "outbox-dispatcher".to_string());

        let steps = transfer_steps(
            self.locks.clone(),
            self.ledger.clone(),
            owner,
            self.step_lease,
        );

        let mut instance = match self.repository.load(saga_id, steps).await {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                tracing::warn!(%saga_id, "saga not found for StartSaga message, marking processed");
                return Ok(());
            }
            Err(error) => return Err(map_saga_error(error)),
        };

        let coordinator = SagaCoordinator::new(self.repository.clone());
        coordinator
            .process(&mut instance, cancel)
            .await
            .map_err(map_saga_error)
    }
}
