use async_trait::async_trait;
use common::AccountId;
use rust_decimal::Decimal;

use crate::{LedgerEntry, NewLedgerEntry, Result};

/// Outcome of a [`LedgerStore::insert`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The entry was committed.
    Inserted,
    /// Another entry already occupies the reference ID. The caller re-reads
    /// by reference to classify what got there first.
    DuplicateReference,
}

/// Append-only persistence for ledger entries.
///
/// The unique constraint on `reference_id` is the last-resort serializer for
/// financial effects: two racing writers of the same reference always resolve
/// to exactly one committed row.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Finds the entry occupying `reference_id`, if any.
    async fn find_by_reference(&self, reference_id: &str) -> Result<Option<LedgerEntry>>;

    /// Computes the balance of an account as the sum of its entry amounts.
    ///
    /// Correct by definition, not scalable: a production deployment would
    /// maintain a balance row with optimistic concurrency instead.
    async fn balance(&self, account_id: AccountId) -> Result<Decimal>;

    /// Appends an entry, reporting a duplicate reference as an outcome
    /// rather than an error.
    async fn insert(&self, entry: NewLedgerEntry) -> Result<InsertOutcome>;
}
