//! Money transfer saga: debit the sender, credit the receiver.
//!
//! The concrete use case exercising the saga engine. Step effects go through
//! the ledger under per-saga idempotency keys; step executions are guarded
//! by step locks from the idempotency store.

pub mod data;
pub mod steps;

use std::sync::Arc;
use std::time::Duration;

use idempotency::IdempotencyStore;
use ledger::{LedgerService, LedgerStore};
use saga::StepList;

pub use data::TransferData;
pub use steps::{AML_LIMIT, CREDIT_RECEIVER, CreditReceiverStep, DEBIT_SENDER, DebitSenderStep};

/// Assembles the transfer step list with its collaborators wired in.
///
/// Called at the composition root per dispatch; `owner_id` identifies the
/// worker claiming step locks.
pub fn transfer_steps<I, L>(
    locks: I,
    ledger: Arc<LedgerService<L>>,
    owner_id: impl Into<String>,
    step_lease: Duration,
) -> StepList<TransferData>
where
    I: IdempotencyStore + Clone + 'static,
    L: LedgerStore + 'static,
{
    let owner_id = owner_id.into();
    vec![
        Arc::new(DebitSenderStep::new(
            locks.clone(),
            ledger.clone(),
            owner_id.clone(),
            step_lease,
        )),
        Arc::new(CreditReceiverStep::new(locks, ledger, owner_id, step_lease)),
    ]
}
