//! Transfer saga steps.
//!
//! Both steps follow the same recipe: claim a technical step lock from the
//! idempotency store (lease well above the expected execution time), perform
//! the ledger effect under a separate domain key so the effect stays safe
//! across a lock expiry, then seal the lock. The lock is never released on
//! failure; expiry handles that.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::Shutdown;
use idempotency::{ClaimOutcome, IdempotencyError, IdempotencyStore};
use ledger::{LedgerError, LedgerOutcome, LedgerService, LedgerStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use saga::{SagaStep, StepError};

use crate::data::TransferData;

/// Name of the sender debit step.
pub const DEBIT_SENDER: &str = "DebitSender";

/// Name of the receiver credit step.
pub const CREDIT_RECEIVER: &str = "CreditReceiver";

/// Transfers above this amount are refused outright.
pub const AML_LIMIT: Decimal = dec!(100000);

fn step_lock_key(step_name: &str, data: &TransferData) -> String {
    format!("{}_Step_Lock_{}", step_name, data.saga_id)
}

fn lock_error(error: IdempotencyError) -> StepError {
    match error {
        IdempotencyError::LostLease { key } => {
            StepError::LostLease(format!("step lock '{key}' expired"))
        }
        other => StepError::Failed(other.to_string()),
    }
}

fn ledger_error(error: LedgerError) -> StepError {
    StepError::Failed(error.to_string())
}

/// Claims the step lock, translating the outcome into the step taxonomy.
/// Returns `Ok(false)` when the step already ran to completion.
async fn claim_step_lock<I: IdempotencyStore>(
    locks: &I,
    lock_key: &str,
    owner: &str,
    lease: Duration,
) -> Result<bool, StepError> {
    match locks
        .try_claim(lock_key, owner, lease)
        .await
        .map_err(lock_error)?
    {
        ClaimOutcome::Acquired => Ok(true),
        ClaimOutcome::AlreadyConsumed => Ok(false),
        ClaimOutcome::LockedByOther => Err(StepError::RetryLater(format!(
            "step lock '{lock_key}' held by another worker"
        ))),
    }
}

/// Debits the sender's account.
pub struct DebitSenderStep<I, L> {
    locks: I,
    ledger: Arc<LedgerService<L>>,
    owner_id: String,
    step_lease: Duration,
}

impl<I, L> DebitSenderStep<I, L> {
    /// Creates the step with its collaborators wired in.
    pub fn new(
        locks: I,
        ledger: Arc<LedgerService<L>>,
        owner_id: impl Into<String>,
        step_lease: Duration,
    ) -> Self {
        Self {
            locks,
            ledger,
            owner_id: owner_id.into(),
            step_lease,
        }
    }
}

#[async_trait]
impl<I, L> SagaStep<TransferData> for DebitSenderStep<I, L>
where
    I: IdempotencyStore,
    L: LedgerStore,
{
    fn name(&self) -> &'static str {
        DEBIT_SENDER
    }

    #[tracing::instrument(skip_all, fields(saga_id = %data.saga_id))]
    async fn execute(&self, data: &TransferData, _cancel: &Shutdown) -> Result<(), StepError> {
        let lock_key = step_lock_key(DEBIT_SENDER, data);
        if !claim_step_lock(&self.locks, &lock_key, &self.owner_id, self.step_lease).await? {
            return Ok(());
        }

        let outcome = self
            .ledger
            .try_debit(data.from_user_id, data.amount, &data.debit_key())
            .await
            .map_err(ledger_error)?;

        match outcome {
            LedgerOutcome::Success | LedgerOutcome::IdempotentSuccess => {}
            LedgerOutcome::Conflict => {
                return Err(StepError::RetryLater(format!(
                    "ledger conflict on '{}'",
                    data.debit_key()
                )));
            }
            LedgerOutcome::Rejected => {
                return Err(StepError::Failed(format!(
                    "debit of {} from {} rejected",
                    data.amount, data.from_user_id
                )));
            }
        }

        self.locks
            .complete(&lock_key, &self.owner_id)
            .await
            .map_err(lock_error)
    }

    #[tracing::instrument(skip_all, fields(saga_id = %data.saga_id))]
    async fn compensate(&self, data: &TransferData, _cancel: &Shutdown) -> Result<(), StepError> {
        // No step lock here: the ledger's tombstone semantics make the
        // compensation safe under every arrival order and any retry count.
        let outcome = self
            .ledger
            .try_compensate_debit(data.from_user_id, data.amount, &data.debit_key())
            .await
            .map_err(ledger_error)?;

        match outcome {
            LedgerOutcome::Success | LedgerOutcome::IdempotentSuccess => Ok(()),
            LedgerOutcome::Conflict => Err(StepError::RetryLater(format!(
                "compensation conflict on '{}'",
                data.debit_key()
            ))),
            LedgerOutcome::Rejected => Err(StepError::Failed(format!(
                "compensation of '{}' rejected",
                data.debit_key()
            ))),
        }
    }
}

/// Credits the receiver's account, after a business-rule screen.
pub struct CreditReceiverStep<I, L> {
    locks: I,
    ledger: Arc<LedgerService<L>>,
    owner_id: String,
    step_lease: Duration,
}

impl<I, L> CreditReceiverStep<I, L> {
    /// Creates the step with its collaborators wired in.
    pub fn new(
        locks: I,
        ledger: Arc<LedgerService<L>>,
        owner_id: impl Into<String>,
        step_lease: Duration,
    ) -> Self {
        Self {
            locks,
            ledger,
            owner_id: owner_id.into(),
            step_lease,
        }
    }
}

#[async_trait]
impl<I, L> SagaStep<TransferData> for CreditReceiverStep<I, L>
where
    I: IdempotencyStore,
    L: LedgerStore,
{
    fn name(&self) -> &'static str {
        CREDIT_RECEIVER
    }

    #[tracing::instrument(skip_all, fields(saga_id = %data.saga_id))]
    async fn execute(&self, data: &TransferData, _cancel: &Shutdown) -> Result<(), StepError> {
        // Business screen before any effect or lock.
        if data.amount > AML_LIMIT {
            return Err(StepError::Failed(format!(
                "amount {} exceeds the anti-money-laundering limit {}",
                data.amount, AML_LIMIT
            )));
        }

        let lock_key = step_lock_key(CREDIT_RECEIVER, data);
        if !claim_step_lock(&self.locks, &lock_key, &self.owner_id, self.step_lease).await? {
            return Ok(());
        }

        let outcome = self
            .ledger
            .try_credit(data.to_user_id, data.amount, &data.credit_key())
            .await
            .map_err(ledger_error)?;

        match outcome {
            LedgerOutcome::Success | LedgerOutcome::IdempotentSuccess => {}
            LedgerOutcome::Conflict => {
                return Err(StepError::RetryLater(format!(
                    "ledger conflict on '{}'",
                    data.credit_key()
                )));
            }
            LedgerOutcome::Rejected => {
                return Err(StepError::Failed(format!(
                    "credit of {} to {} rejected",
                    data.amount, data.to_user_id
                )));
            }
        }

        self.locks
            .complete(&lock_key, &self.owner_id)
            .await
            .map_err(lock_error)
    }

    async fn compensate(&self, data: &TransferData, _cancel: &Shutdown) -> Result<(), StepError> {
        // The credit is the terminal step of the transfer: compensation can
        // only be requested before its effect applied, so there is nothing
        // to undo.
        tracing::debug!(saga_id = %data.saga_id, "credit compensation is a no-op");
        Ok(())
    }
}
