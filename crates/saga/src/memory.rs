use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;
use outbox::{InMemoryOutboxStore, NewOutboxMessage, OutboxStore};
use tokio::sync::RwLock;

use crate::Result;
use crate::instance::SagaInstance;
use crate::repository::{
    START_SAGA_MESSAGE_TYPE, SagaRepository, StepList, start_saga_payload,
};
use crate::state::SagaState;
use crate::step::SagaData;

/// A stored snapshot, kept in the same stringly shape as the database rows
/// so loading exercises the same parsing and healing paths.
#[derive(Debug, Clone)]
struct StoredSnapshot {
    state: String,
    cursor: usize,
    data_json: serde_json::Value,
    data_type: String,
    error_log: Vec<String>,
}

/// In-memory saga repository for testing.
///
/// Composes an [`InMemoryOutboxStore`] so `create` also enqueues the
/// `StartSaga` message, matching the transactional behavior of the
/// PostgreSQL implementation closely enough for single-process tests.
#[derive(Clone)]
pub struct InMemorySagaRepository {
    sagas: Arc<RwLock<HashMap<SagaId, StoredSnapshot>>>,
    outbox: InMemoryOutboxStore,
}

impl InMemorySagaRepository {
    /// Creates a repository writing `StartSaga` messages to `outbox`.
    pub fn new(outbox: InMemoryOutboxStore) -> Self {
        Self {
            sagas: Arc::new(RwLock::new(HashMap::new())),
            outbox,
        }
    }

    /// Returns the outbox store this repository enqueues into.
    pub fn outbox(&self) -> &InMemoryOutboxStore {
        &self.outbox
    }

    /// Overwrites the stored state string of a saga. Test helper for
    /// exercising the unknown-state rehydration path.
    pub async fn inject_state(&self, saga_id: SagaId, state: impl Into<String>) {
        let mut sagas = self.sagas.write().await;
        if let Some(snapshot) = sagas.get_mut(&saga_id) {
            snapshot.state = state.into();
        }
    }

    /// Returns the persisted `(state, cursor)` pair of a saga.
    pub async fn stored_state(&self, saga_id: SagaId) -> Option<(String, usize)> {
        let sagas = self.sagas.read().await;
        sagas.get(&saga_id).map(|s| (s.state.clone(), s.cursor))
    }
}

#[async_trait]
impl<TData: SagaData> SagaRepository<TData> for InMemorySagaRepository {
    async fn create(&self, saga_id: SagaId, data: &TData) -> Result<()> {
        let data_json = serde_json::to_value(data)?;

        let mut sagas = self.sagas.write().await;
        sagas.insert(
            saga_id,
            StoredSnapshot {
                state: SagaState::Created.as_str().to_string(),
                cursor: 0,
                data_json,
                data_type: TData::data_type().to_string(),
                error_log: Vec::new(),
            },
        );
        drop(sagas);

        self.outbox
            .enqueue(NewOutboxMessage::new(
                START_SAGA_MESSAGE_TYPE,
                start_saga_payload(saga_id),
            ))
            .await?;

        Ok(())
    }

    async fn save(&self, instance: &SagaInstance<TData>) -> Result<()> {
        let data_json = serde_json::to_value(instance.data())?;

        let mut sagas = self.sagas.write().await;
        sagas.insert(
            instance.id(),
            StoredSnapshot {
                state: instance.state().as_str().to_string(),
                cursor: instance.cursor(),
                data_json,
                data_type: TData::data_type().to_string(),
                error_log: instance.error_log().to_vec(),
            },
        );

        Ok(())
    }

    async fn load(
        &self,
        saga_id: SagaId,
        steps: StepList<TData>,
    ) -> Result<Option<SagaInstance<TData>>> {
        let sagas = self.sagas.read().await;
        let Some(snapshot) = sagas.get(&saga_id) else {
            return Ok(None);
        };

        if snapshot.data_type != TData::data_type() {
            return Err(crate::SagaError::DataTypeMismatch {
                stored: snapshot.data_type.clone(),
                requested: TData::data_type().to_string(),
            });
        }

        let state = SagaState::parse(&snapshot.state).unwrap_or(SagaState::Failed);
        let data: TData = serde_json::from_value(snapshot.data_json.clone())?;

        Ok(Some(SagaInstance::rehydrate(
            saga_id,
            state,
            snapshot.cursor,
            data,
            snapshot.error_log.clone(),
            steps,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SagaError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        note: String,
    }

    impl SagaData for TestData {
        fn data_type() -> &'static str {
            "TestSaga"
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct OtherData;

    impl SagaData for OtherData {
        fn data_type() -> &'static str {
            "OtherSaga"
        }
    }

    fn repository() -> InMemorySagaRepository {
        InMemorySagaRepository::new(InMemoryOutboxStore::new())
    }

    fn data() -> TestData {
        TestData {
            note: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn create_persists_snapshot_and_enqueues_start_message() {
        let repo = repository();
        let saga_id = SagaId::new();

        SagaRepository::<TestData>::create(&repo, saga_id, &data())
            .await
            .unwrap();

        let (state, cursor) = repo.stored_state(saga_id).await.unwrap();
        assert_eq!(state, "Created");
        assert_eq!(cursor, 0);

        assert_eq!(repo.outbox().pending_count().await, 1);
        let message_id = repo.outbox().scout().await.unwrap().unwrap();
        let message = repo.outbox().get(message_id).await.unwrap();
        assert_eq!(message.message_type, START_SAGA_MESSAGE_TYPE);
        assert_eq!(
            crate::repository::saga_id_from_payload(&message.payload),
            Some(saga_id)
        );
    }

    #[tokio::test]
    async fn save_load_roundtrip() {
        let repo = repository();
        let saga_id = SagaId::new();

        let mut instance = SagaInstance::new(saga_id, data(), Vec::new());
        instance.mark_running();
        instance.fail("boom");
        repo.save(&instance).await.unwrap();

        let loaded = repo
            .load(saga_id, Vec::<Arc<dyn crate::SagaStep<TestData>>>::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded.id(), saga_id);
        assert_eq!(loaded.state(), SagaState::Failed);
        assert_eq!(loaded.cursor(), 0);
        assert_eq!(loaded.error_log(), &["boom"]);
        assert_eq!(loaded.data(), &data());
    }

    #[tokio::test]
    async fn load_unknown_id_is_none() {
        let repo = repository();
        let loaded = repo
            .load(SagaId::new(), Vec::<Arc<dyn crate::SagaStep<TestData>>>::new())
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn unknown_state_rehydrates_as_failed() {
        let repo = repository();
        let saga_id = SagaId::new();
        SagaRepository::<TestData>::create(&repo, saga_id, &data())
            .await
            .unwrap();
        repo.inject_state(saga_id, "Exploded").await;

        let loaded = repo
            .load(saga_id, Vec::<Arc<dyn crate::SagaStep<TestData>>>::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded.state(), SagaState::Failed);
    }

    #[tokio::test]
    async fn mismatched_data_type_is_an_error() {
        let repo = repository();
        let saga_id = SagaId::new();
        SagaRepository::<TestData>::create(&repo, saga_id, &data())
            .await
            .unwrap();

        let result = repo
            .load(saga_id, Vec::<Arc<dyn crate::SagaStep<OtherData>>>::new())
            .await;

        assert!(matches!(result, Err(SagaError::DataTypeMismatch { .. })));
    }
}
