use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    NewOutboxMessage, OutboxMessage, Result,
    message::clip_error,
    store::OutboxStore,
};

/// PostgreSQL-backed outbox store.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Creates a new PostgreSQL outbox store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_message(row: PgRow) -> Result<OutboxMessage> {
        Ok(OutboxMessage {
            id: row.try_get::<Uuid, _>("id")?,
            message_type: row.try_get("type")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            processed_at: row.try_get("processed_at")?,
            attempt_count: row.try_get("attempt_count")?,
            last_error: row.try_get("last_error")?,
            locked_by: row.try_get("locked_by")?,
            locked_until: row.try_get("locked_until")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn enqueue(&self, message: NewOutboxMessage) -> Result<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO outbox_messages (id, type, payload, created_at, attempt_count)
            VALUES ($1, $2, $3, now(), 0)
            "#,
        )
        .bind(id)
        .bind(&message.message_type)
        .bind(&message.payload)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn scout(&self) -> Result<Option<Uuid>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM outbox_messages
            WHERE processed_at IS NULL
              AND (locked_until IS NULL OR locked_until < now())
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn claim(&self, id: Uuid, worker_id: &str, lease_ttl: Duration) -> Result<bool> {
        let locked_until = Utc::now() + lease_ttl;

        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET locked_by = $2, locked_until = $3
            WHERE id = $1
              AND processed_at IS NULL
              AND (locked_until IS NULL OR locked_until < now())
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(locked_until)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load(&self, id: Uuid) -> Result<Option<OutboxMessage>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, type, payload, created_at, processed_at, attempt_count,
                   last_error, locked_by, locked_until
            FROM outbox_messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_message).transpose()
    }

    async fn mark_processed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_messages
            SET processed_at = now(), locked_by = NULL, locked_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release(
        &self,
        id: Uuid,
        retry_at: DateTime<Utc>,
        increment_attempt: bool,
        reason: &str,
    ) -> Result<()> {
        let increment: i32 = if increment_attempt { 1 } else { 0 };

        sqlx::query(
            r#"
            UPDATE outbox_messages
            SET locked_by = NULL,
                locked_until = $2,
                attempt_count = attempt_count + $3,
                last_error = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(retry_at)
        .bind(increment)
        .bind(clip_error(reason))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
