use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::{ClaimOutcome, IdempotencyError, IdempotencyStore, Result};

/// PostgreSQL-backed idempotency store.
#[derive(Clone)]
pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    /// Creates a new PostgreSQL idempotency store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn try_claim(&self, key: &str, owner: &str, ttl: Duration) -> Result<ClaimOutcome> {
        let locked_until = Utc::now() + ttl;

        // Insert-or-takeover in one round-trip. The WHERE predicate makes the
        // update a no-op when the key is consumed or the lease is still live.
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, created_at, is_consumed, locked_by, locked_until)
            VALUES ($1, now(), FALSE, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET locked_by = EXCLUDED.locked_by, locked_until = EXCLUDED.locked_until
            WHERE idempotency_keys.is_consumed = FALSE
              AND (idempotency_keys.locked_until IS NULL OR idempotency_keys.locked_until < now())
            "#,
        )
        .bind(key)
        .bind(owner)
        .bind(locked_until)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(ClaimOutcome::Acquired);
        }

        // Diagnostic read only; the claim itself was decided atomically above.
        if self.is_consumed(key).await? {
            Ok(ClaimOutcome::AlreadyConsumed)
        } else {
            Ok(ClaimOutcome::LockedByOther)
        }
    }

    async fn complete(&self, key: &str, owner: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET is_consumed = TRUE, locked_by = NULL, locked_until = NULL
            WHERE key = $1 AND locked_by = $2 AND is_consumed = FALSE
            "#,
        )
        .bind(key)
        .bind(owner)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Zero rows: either someone already sealed the key (idempotent
        // success) or our lease expired and was taken over.
        if self.is_consumed(key).await? {
            Ok(())
        } else {
            tracing::warn!(key, owner, "lease lost before completion");
            Err(IdempotencyError::LostLease {
                key: key.to_string(),
            })
        }
    }

    async fn is_consumed(&self, key: &str) -> Result<bool> {
        let consumed: Option<bool> =
            sqlx::query_scalar("SELECT is_consumed FROM idempotency_keys WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(consumed.unwrap_or(false))
    }
}
