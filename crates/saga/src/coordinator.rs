//! Saga coordinator: drives one saga to quiescence.

use common::Shutdown;

use crate::Result;
use crate::SagaError;
use crate::instance::SagaInstance;
use crate::repository::SagaRepository;
use crate::state::SagaState;
use crate::step::{SagaData, StepError};

/// Drives a saga instance forward step by step and runs reverse-order
/// compensation when a step fails permanently.
///
/// The coordinator owns no cross-request state; exclusivity comes from the
/// outbox lease of whichever worker invoked it. The snapshot is saved after
/// every cursor change and state transition, so a crash at any point resumes
/// from a consistent position.
pub struct SagaCoordinator<R> {
    repository: R,
}

impl<R> SagaCoordinator<R> {
    /// Creates a new coordinator over the given repository.
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Processes the saga until it reaches a terminal state or a
    /// recoverable condition forces a hand-back to the outbox.
    ///
    /// `RetryLater` and `LostLease` are propagated unchanged after saving,
    /// so the worker can re-queue with the matching delay. Cancellation
    /// aborts between steps without mutating state further.
    #[tracing::instrument(skip_all, fields(saga_id = %instance.id(), state = %instance.state()))]
    pub async fn process<TData: SagaData>(
        &self,
        instance: &mut SagaInstance<TData>,
        cancel: &Shutdown,
    ) -> Result<()>
    where
        R: SagaRepository<TData>,
    {
        if instance.state().is_terminal() {
            return Ok(());
        }

        // A saga persisted mid-compensation resumes there directly.
        if matches!(
            instance.state(),
            SagaState::Compensating | SagaState::Failed
        ) {
            return self.compensate(instance, cancel).await;
        }

        if instance.state() == SagaState::Created {
            instance.mark_running();
            self.repository.save(instance).await?;
        }

        while !instance.state().is_terminal() {
            if cancel.is_cancelled() {
                return Err(SagaError::Cancelled);
            }

            let Some(step) = instance.current_step() else {
                instance.complete();
                self.repository.save(instance).await?;
                break;
            };

            match step.execute(instance.data(), cancel).await {
                Ok(()) => {
                    instance.advance();
                    self.repository.save(instance).await?;
                    tracing::debug!(step = step.name(), cursor = instance.cursor(), "step done");
                }
                Err(StepError::RetryLater(reason)) => {
                    self.repository.save(instance).await?;
                    return Err(SagaError::RetryLater(reason));
                }
                Err(StepError::LostLease(reason)) => {
                    self.repository.save(instance).await?;
                    return Err(SagaError::LostLease(reason));
                }
                Err(StepError::Failed(reason)) => {
                    tracing::warn!(step = step.name(), %reason, "step failed, compensating");
                    instance.fail(format!("Step '{}' failed: {}", step.name(), reason));
                    return self.compensate(instance, cancel).await;
                }
            }
        }

        metrics::counter!("sagas_completed").increment(1);
        tracing::info!("saga completed");
        Ok(())
    }

    /// Compensates every executed step in reverse order.
    ///
    /// A permanent compensation failure is recorded and the loop continues
    /// with the earlier steps: undoing as much as possible minimizes
    /// residual side effects, and `FatalError` at the end flags the saga
    /// for manual review.
    async fn compensate<TData: SagaData>(
        &self,
        instance: &mut SagaInstance<TData>,
        cancel: &Shutdown,
    ) -> Result<()>
    where
        R: SagaRepository<TData>,
    {
        if matches!(instance.state(), SagaState::Failed | SagaState::Running) {
            instance.mark_compensating();
            self.repository.save(instance).await?;
        }

        let mut compensation_failed = false;

        for (index, step) in instance.executed_steps_reverse() {
            if cancel.is_cancelled() {
                return Err(SagaError::Cancelled);
            }

            match step.compensate(instance.data(), cancel).await {
                Ok(()) => {
                    tracing::debug!(step = step.name(), index, "step compensated");
                }
                Err(StepError::RetryLater(reason)) => {
                    self.repository.save(instance).await?;
                    return Err(SagaError::RetryLater(reason));
                }
                Err(StepError::LostLease(reason)) => {
                    self.repository.save(instance).await?;
                    return Err(SagaError::LostLease(reason));
                }
                Err(StepError::Failed(reason)) => {
                    tracing::error!(step = step.name(), index, %reason, "compensation failed");
                    instance.record_error(format!(
                        "COMPENSATION FAILED: step '{}': {}",
                        step.name(),
                        reason
                    ));
                    compensation_failed = true;
                }
            }
        }

        if compensation_failed {
            instance.mark_fatal("Manual review required");
            metrics::counter!("sagas_fatal").increment(1);
        } else {
            instance.mark_compensated();
            metrics::counter!("sagas_compensated").increment(1);
        }
        self.repository.save(instance).await?;

        tracing::info!(state = %instance.state(), "compensation finished");
        Ok(())
    }
}
