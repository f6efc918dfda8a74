use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::AccountId;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    LedgerEntry, NewLedgerEntry, Result,
    store::{InsertOutcome, LedgerStore},
};

/// In-memory ledger store for testing.
///
/// Simulates the unique constraint on `reference_id` so races and duplicate
/// writes classify the same way as against PostgreSQL.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of entries.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns all entries for an account, in insertion order.
    pub async fn entries_for_account(&self, account_id: AccountId) -> Vec<LedgerEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_by_reference(&self, reference_id: &str) -> Result<Option<LedgerEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|e| e.reference_id == reference_id)
            .cloned())
    }

    async fn balance(&self, account_id: AccountId) -> Result<Decimal> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.amount)
            .sum())
    }

    async fn insert(&self, entry: NewLedgerEntry) -> Result<InsertOutcome> {
        let mut entries = self.entries.write().await;

        if entries.iter().any(|e| e.reference_id == entry.reference_id) {
            return Ok(InsertOutcome::DuplicateReference);
        }

        entries.push(LedgerEntry {
            id: Uuid::new_v4(),
            account_id: entry.account_id,
            amount: entry.amount,
            entry_type: entry.entry_type,
            reference_id: entry.reference_id,
            created_at: Utc::now(),
            reason: entry.reason,
        });

        Ok(InsertOutcome::Inserted)
    }
}
