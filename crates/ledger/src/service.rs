//! Idempotent debit/credit operations with refund and tombstone semantics.

use common::AccountId;
use rust_decimal::Decimal;

use crate::{
    EntryType, NewLedgerEntry, Result,
    store::{InsertOutcome, LedgerStore},
};

/// How many times a compensation attempt re-reads and retries before giving
/// up with `Conflict`. Each loop only repeats on a lost insert race, so the
/// budget is a liveness bound, not a correctness one.
const COMPENSATION_ATTEMPTS: usize = 5;

/// Outcome of an idempotent ledger operation.
///
/// Every operation takes an idempotency key and behaves identically on the
/// first call and any replay with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The effect was applied by this call.
    Success,
    /// The effect had already been applied under this key.
    IdempotentSuccess,
    /// The key is occupied by an incompatible entry; retrying later may
    /// resolve the race.
    Conflict,
    /// The operation is permanently refused (overdraft, or a tombstoned key).
    Rejected,
}

/// Ledger operations generic over the backing store.
pub struct LedgerService<S> {
    store: S,
    overdraft_limit: Decimal,
}

impl<S: LedgerStore> LedgerService<S> {
    /// Creates a new ledger service.
    ///
    /// `overdraft_limit` is the lowest balance a debit may leave behind
    /// (typically negative).
    pub fn new(store: S, overdraft_limit: Decimal) -> Self {
        Self {
            store,
            overdraft_limit,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Debits `account_id` by `amount` under the idempotency key `key`.
    ///
    /// A replayed debit returns `IdempotentSuccess`; a tombstoned key
    /// returns `Rejected` (the debit must never apply after compensation
    /// decided there was nothing to refund); an overdraft returns
    /// `Rejected`.
    #[tracing::instrument(skip(self))]
    pub async fn try_debit(
        &self,
        account_id: AccountId,
        amount: Decimal,
        key: &str,
    ) -> Result<LedgerOutcome> {
        let amount = amount.abs();

        if let Some(outcome) = self.classify_debit_key(key).await? {
            return Ok(outcome);
        }

        let balance = self.store.balance(account_id).await?;
        if balance - amount < self.overdraft_limit {
            tracing::info!(%account_id, %amount, %balance, "debit rejected: overdraft");
            return Ok(LedgerOutcome::Rejected);
        }

        match self
            .store
            .insert(NewLedgerEntry::debit(account_id, amount, key))
            .await?
        {
            InsertOutcome::Inserted => Ok(LedgerOutcome::Success),
            InsertOutcome::DuplicateReference => {
                // Lost a race on the key; re-read and classify what won.
                match self.classify_debit_key(key).await? {
                    Some(outcome) => Ok(outcome),
                    None => Ok(LedgerOutcome::Conflict),
                }
            }
        }
    }

    /// Credits `account_id` by `amount` under the idempotency key `key`.
    ///
    /// Same shape as [`try_debit`] without the balance check; a credit under
    /// a tombstoned key is a `Conflict`.
    ///
    /// [`try_debit`]: LedgerService::try_debit
    #[tracing::instrument(skip(self))]
    pub async fn try_credit(
        &self,
        account_id: AccountId,
        amount: Decimal,
        key: &str,
    ) -> Result<LedgerOutcome> {
        let amount = amount.abs();

        if let Some(outcome) = self.classify_credit_key(key).await? {
            return Ok(outcome);
        }

        match self
            .store
            .insert(NewLedgerEntry::credit(account_id, amount, key))
            .await?
        {
            InsertOutcome::Inserted => Ok(LedgerOutcome::Success),
            InsertOutcome::DuplicateReference => {
                match self.classify_credit_key(key).await? {
                    Some(outcome) => Ok(outcome),
                    None => Ok(LedgerOutcome::Conflict),
                }
            }
        }
    }

    /// Compensates a debit made (or about to be made) under `original_key`.
    ///
    /// Safe against every arrival order of debit and compensation:
    /// - debit already applied → refund it under `"Refund_" + original_key`;
    /// - nothing applied yet → occupy `original_key` with a tombstone so a
    ///   delayed debit can never apply;
    /// - either insert losing a race re-reads and retries, up to a bounded
    ///   number of attempts.
    #[tracing::instrument(skip(self))]
    pub async fn try_compensate_debit(
        &self,
        account_id: AccountId,
        amount: Decimal,
        original_key: &str,
    ) -> Result<LedgerOutcome> {
        let amount = amount.abs();
        let refund_key = format!("Refund_{original_key}");

        for _ in 0..COMPENSATION_ATTEMPTS {
            match self.store.find_by_reference(original_key).await? {
                Some(entry) if entry.entry_type == EntryType::AbortMarker => {
                    return Ok(LedgerOutcome::IdempotentSuccess);
                }
                Some(entry) if entry.entry_type == EntryType::Debit => {
                    match self.store.find_by_reference(&refund_key).await? {
                        Some(refund) if refund.entry_type == EntryType::Credit => {
                            return Ok(LedgerOutcome::IdempotentSuccess);
                        }
                        Some(_) => return Ok(LedgerOutcome::Conflict),
                        None => {}
                    }

                    let refund = NewLedgerEntry::credit(account_id, amount, &refund_key)
                        .with_reason(format!("Refund of {original_key}"));
                    match self.store.insert(refund).await? {
                        InsertOutcome::Inserted => return Ok(LedgerOutcome::Success),
                        InsertOutcome::DuplicateReference => continue,
                    }
                }
                Some(_) => return Ok(LedgerOutcome::Conflict),
                None => {
                    let marker = NewLedgerEntry::abort_marker(account_id, original_key)
                        .with_reason("Compensated before debit arrived");
                    match self.store.insert(marker).await? {
                        InsertOutcome::Inserted => return Ok(LedgerOutcome::Success),
                        // A debit raced in; the next iteration refunds it.
                        InsertOutcome::DuplicateReference => continue,
                    }
                }
            }
        }

        tracing::warn!(original_key, "compensation retry budget exhausted");
        Ok(LedgerOutcome::Conflict)
    }

    /// Returns the balance of an account.
    pub async fn balance(&self, account_id: AccountId) -> Result<Decimal> {
        self.store.balance(account_id).await
    }

    async fn classify_debit_key(&self, key: &str) -> Result<Option<LedgerOutcome>> {
        Ok(self
            .store
            .find_by_reference(key)
            .await?
            .map(|entry| match entry.entry_type {
                EntryType::Debit => LedgerOutcome::IdempotentSuccess,
                EntryType::AbortMarker => LedgerOutcome::Rejected,
                _ => LedgerOutcome::Conflict,
            }))
    }

    async fn classify_credit_key(&self, key: &str) -> Result<Option<LedgerOutcome>> {
        Ok(self
            .store
            .find_by_reference(key)
            .await?
            .map(|entry| match entry.entry_type {
                EntryType::Credit => LedgerOutcome::IdempotentSuccess,
                _ => LedgerOutcome::Conflict,
            }))
    }
}
