//! Ledger entry model.

use chrono::{DateTime, Utc};
use common::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of a ledger entry.
///
/// Stored as a small integer. An `AbortMarker` is a tombstone: once written
/// under a reference ID, no entry of any other kind may ever exist there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Money leaving an account (negative amount).
    Debit,
    /// Money entering an account (positive amount).
    Credit,
    /// Zero-amount tombstone occupying a reference ID forever.
    AbortMarker,
}

impl EntryType {
    /// Returns the integer representation used in the database.
    pub fn as_i16(&self) -> i16 {
        match self {
            EntryType::Debit => 0,
            EntryType::Credit => 1,
            EntryType::AbortMarker => 2,
        }
    }

    /// Parses the integer representation. Returns None for unknown values.
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(EntryType::Debit),
            1 => Some(EntryType::Credit),
            2 => Some(EntryType::AbortMarker),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntryType::Debit => "Debit",
            EntryType::Credit => "Credit",
            EntryType::AbortMarker => "AbortMarker",
        };
        write!(f, "{name}")
    }
}

/// A persisted, append-only ledger entry.
///
/// The balance of an account is the sum of `amount` over its entries.
/// `reference_id` is globally unique and serves as the domain idempotency
/// key for the effect that produced the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub entry_type: EntryType,
    pub reference_id: String,
    pub created_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// A ledger entry that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub entry_type: EntryType,
    pub reference_id: String,
    pub reason: Option<String>,
}

impl NewLedgerEntry {
    /// A debit of `amount` (stored negated) referenced by `reference_id`.
    pub fn debit(account_id: AccountId, amount: Decimal, reference_id: impl Into<String>) -> Self {
        Self {
            account_id,
            amount: -amount.abs(),
            entry_type: EntryType::Debit,
            reference_id: reference_id.into(),
            reason: None,
        }
    }

    /// A credit of `amount` referenced by `reference_id`.
    pub fn credit(account_id: AccountId, amount: Decimal, reference_id: impl Into<String>) -> Self {
        Self {
            account_id,
            amount: amount.abs(),
            entry_type: EntryType::Credit,
            reference_id: reference_id.into(),
            reason: None,
        }
    }

    /// A zero-amount tombstone occupying `reference_id`.
    pub fn abort_marker(account_id: AccountId, reference_id: impl Into<String>) -> Self {
        Self {
            account_id,
            amount: Decimal::ZERO,
            entry_type: EntryType::AbortMarker,
            reference_id: reference_id.into(),
            reason: None,
        }
    }

    /// Attaches a human-readable reason to the entry.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn entry_type_integer_roundtrip() {
        for entry_type in [EntryType::Debit, EntryType::Credit, EntryType::AbortMarker] {
            assert_eq!(EntryType::from_i16(entry_type.as_i16()), Some(entry_type));
        }
        assert_eq!(EntryType::from_i16(7), None);
    }

    #[test]
    fn debit_negates_amount() {
        let entry = NewLedgerEntry::debit(AccountId::new(), dec!(100.50), "Debit_X");
        assert_eq!(entry.amount, dec!(-100.50));
        assert_eq!(entry.entry_type, EntryType::Debit);
    }

    #[test]
    fn debit_of_negative_amount_still_negates() {
        let entry = NewLedgerEntry::debit(AccountId::new(), dec!(-42), "Debit_X");
        assert_eq!(entry.amount, dec!(-42));
    }

    #[test]
    fn credit_is_positive() {
        let entry = NewLedgerEntry::credit(AccountId::new(), dec!(-100.50), "Credit_X");
        assert_eq!(entry.amount, dec!(100.50));
        assert_eq!(entry.entry_type, EntryType::Credit);
    }

    #[test]
    fn abort_marker_is_zero() {
        let entry = NewLedgerEntry::abort_marker(AccountId::new(), "Debit_X");
        assert_eq!(entry.amount, Decimal::ZERO);
        assert_eq!(entry.entry_type, EntryType::AbortMarker);
    }
}
