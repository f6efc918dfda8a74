//! Ledger-style domain service with idempotent debit/credit operations.
//!
//! Every effectful operation takes an idempotency key and is safe to replay.
//! Compensation of a debit either refunds it or, when the debit has not
//! arrived yet, occupies its key with a zero-amount tombstone so the debit
//! can never apply afterwards.

pub mod entry;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;

pub use entry::{EntryType, LedgerEntry, NewLedgerEntry};
pub use error::{LedgerError, Result};
pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use service::{LedgerOutcome, LedgerService};
pub use store::{InsertOutcome, LedgerStore};
