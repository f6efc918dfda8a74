use async_trait::async_trait;
use common::AccountId;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EntryType, LedgerEntry, LedgerError, NewLedgerEntry, Result,
    store::{InsertOutcome, LedgerStore},
};

/// PostgreSQL-backed ledger store.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: PgRow) -> Result<LedgerEntry> {
        let type_raw: i16 = row.try_get("entry_type")?;
        let entry_type = EntryType::from_i16(type_raw).ok_or_else(|| {
            LedgerError::Database(sqlx::Error::Decode(
                format!("unknown ledger entry type {type_raw}").into(),
            ))
        })?;

        Ok(LedgerEntry {
            id: row.try_get::<Uuid, _>("id")?,
            account_id: AccountId::from_uuid(row.try_get::<Uuid, _>("account_id")?),
            amount: row.try_get("amount")?,
            entry_type,
            reference_id: row.try_get("reference_id")?,
            created_at: row.try_get("created_at")?,
            reason: row.try_get("reason")?,
        })
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn find_by_reference(&self, reference_id: &str) -> Result<Option<LedgerEntry>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, account_id, amount, entry_type, reference_id, created_at, reason
            FROM ledger_entries
            WHERE reference_id = $1
            "#,
        )
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_entry).transpose()
    }

    async fn balance(&self, account_id: AccountId) -> Result<Decimal> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(amount) FROM ledger_entries WHERE account_id = $1",
        )
        .bind(account_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(balance.unwrap_or(Decimal::ZERO))
    }

    async fn insert(&self, entry: NewLedgerEntry) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, account_id, amount, entry_type, reference_id, created_at, reason)
            VALUES ($1, $2, $3, $4, $5, now(), $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.account_id.as_uuid())
        .bind(entry.amount)
        .bind(entry.entry_type.as_i16())
        .bind(&entry.reference_id)
        .bind(&entry.reason)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some("ledger_entries_reference_id_key") =>
            {
                Ok(InsertOutcome::DuplicateReference)
            }
            Err(e) => Err(LedgerError::Database(e)),
        }
    }
}
