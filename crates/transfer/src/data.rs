//! Transfer saga payload.

use common::{AccountId, SagaId};
use rust_decimal::Decimal;
use saga::SagaData;
use serde::{Deserialize, Serialize};

/// Payload of a money transfer saga: debit the sender, credit the receiver.
///
/// Carries its own saga ID so steps can derive stable lock and idempotency
/// keys from the payload alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferData {
    pub saga_id: SagaId,
    pub from_user_id: AccountId,
    pub to_user_id: AccountId,
    pub amount: Decimal,
}

impl TransferData {
    /// Creates the payload for a new transfer saga.
    pub fn new(saga_id: SagaId, from_user_id: AccountId, to_user_id: AccountId, amount: Decimal) -> Self {
        Self {
            saga_id,
            from_user_id,
            to_user_id,
            amount,
        }
    }

    /// Domain idempotency key of the sender debit.
    pub fn debit_key(&self) -> String {
        format!("Debit_{}", self.saga_id)
    }

    /// Domain idempotency key of the receiver credit.
    pub fn credit_key(&self) -> String {
        format!("Credit_{}", self.saga_id)
    }
}

impl SagaData for TransferData {
    fn data_type() -> &'static str {
        "MoneyTransfer"
    }
}
