use std::marker::PhantomData;

use async_trait::async_trait;
use common::SagaId;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::Result;
use crate::instance::SagaInstance;
use crate::repository::{
    START_SAGA_MESSAGE_TYPE, SagaRepository, StepList, start_saga_payload,
};
use crate::state::SagaState;
use crate::step::SagaData;

/// PostgreSQL-backed saga repository.
///
/// `create` writes the saga snapshot and its `StartSaga` outbox row in one
/// transaction, which is what makes acceptance durable: once the request
/// transaction commits, a worker will eventually drive the saga.
pub struct PostgresSagaRepository<TData> {
    pool: PgPool,
    _marker: PhantomData<fn() -> TData>,
}

impl<TData> Clone for PostgresSagaRepository<TData> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _marker: PhantomData,
        }
    }
}

impl<TData> PostgresSagaRepository<TData> {
    /// Creates a new PostgreSQL saga repository.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

#[async_trait]
impl<TData: SagaData> SagaRepository<TData> for PostgresSagaRepository<TData> {
    async fn create(&self, saga_id: SagaId, data: &TData) -> Result<()> {
        let data_json = serde_json::to_value(data)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sagas (id, state, current_step_index, data_json, data_type, error_log)
            VALUES ($1, $2, 0, $3, $4, '{}')
            "#,
        )
        .bind(saga_id.as_uuid())
        .bind(SagaState::Created.as_str())
        .bind(&data_json)
        .bind(TData::data_type())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO outbox_messages (id, type, payload, created_at, attempt_count)
            VALUES ($1, $2, $3, now(), 0)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(START_SAGA_MESSAGE_TYPE)
        .bind(start_saga_payload(saga_id))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(%saga_id, data_type = TData::data_type(), "saga created");
        Ok(())
    }

    async fn save(&self, instance: &SagaInstance<TData>) -> Result<()> {
        let data_json = serde_json::to_value(instance.data())?;

        sqlx::query(
            r#"
            INSERT INTO sagas (id, state, current_step_index, data_json, data_type, error_log)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                state = EXCLUDED.state,
                current_step_index = EXCLUDED.current_step_index,
                data_json = EXCLUDED.data_json,
                error_log = EXCLUDED.error_log
            "#,
        )
        .bind(instance.id().as_uuid())
        .bind(instance.state().as_str())
        .bind(instance.cursor() as i32)
        .bind(&data_json)
        .bind(TData::data_type())
        .bind(instance.error_log())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(
        &self,
        saga_id: SagaId,
        steps: StepList<TData>,
    ) -> Result<Option<SagaInstance<TData>>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT state, current_step_index, data_json, data_type, error_log
            FROM sagas
            WHERE id = $1
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stored_type: String = row.try_get("data_type")?;
        if stored_type != TData::data_type() {
            return Err(crate::SagaError::DataTypeMismatch {
                stored: stored_type,
                requested: TData::data_type().to_string(),
            });
        }

        let state_raw: String = row.try_get("state")?;
        let state = SagaState::parse(&state_raw).unwrap_or(SagaState::Failed);

        let cursor: i32 = row.try_get("current_step_index")?;
        let data_json: serde_json::Value = row.try_get("data_json")?;
        let data: TData = serde_json::from_value(data_json)?;
        let error_log: Vec<String> = row.try_get("error_log")?;

        Ok(Some(SagaInstance::rehydrate(
            saga_id,
            state,
            cursor.max(0) as usize,
            data,
            error_log,
            steps,
        )))
    }
}
