//! Snapshot persistence for sagas.

use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;
use serde_json::json;
use uuid::Uuid;

use crate::Result;
use crate::instance::SagaInstance;
use crate::step::{SagaData, SagaStep};

/// Outbox message type announcing a newly created saga.
pub const START_SAGA_MESSAGE_TYPE: &str = "StartSaga";

/// The step list assembled for a saga type at the composition root.
pub type StepList<TData> = Vec<Arc<dyn SagaStep<TData>>>;

/// Builds the `StartSaga` outbox payload for a saga.
pub fn start_saga_payload(saga_id: SagaId) -> serde_json::Value {
    json!({ "SagaId": saga_id })
}

/// Extracts the saga ID from a `StartSaga` payload.
pub fn saga_id_from_payload(payload: &serde_json::Value) -> Option<SagaId> {
    payload
        .get("SagaId")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .map(SagaId::from_uuid)
}

/// Stores and rehydrates saga snapshots.
///
/// The snapshot is the saga's only persistent representation; the in-memory
/// [`SagaInstance`] is rebuilt from it on every dispatch.
#[async_trait]
pub trait SagaRepository<TData: SagaData>: Send + Sync {
    /// Atomically persists a new saga snapshot (`Created`, cursor 0) and a
    /// `StartSaga` outbox row announcing it. On failure neither exists.
    async fn create(&self, saga_id: SagaId, data: &TData) -> Result<()>;

    /// Upserts the instance's snapshot. Called after every cursor change
    /// and state transition.
    async fn save(&self, instance: &SagaInstance<TData>) -> Result<()>;

    /// Loads a snapshot and rehydrates it with the given step list.
    ///
    /// Returns None for an unknown ID. An unrecognized state string
    /// rehydrates as `Failed`; a forward snapshot whose cursor has passed
    /// the step list self-heals to `Completed`. A corrupt `data_json` or a
    /// mismatched `data_type` is an error.
    async fn load(
        &self,
        saga_id: SagaId,
        steps: StepList<TData>,
    ) -> Result<Option<SagaInstance<TData>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_roundtrip() {
        let saga_id = SagaId::new();
        let payload = start_saga_payload(saga_id);
        assert_eq!(saga_id_from_payload(&payload), Some(saga_id));
    }

    #[test]
    fn payload_without_saga_id_is_none() {
        assert_eq!(saga_id_from_payload(&json!({})), None);
        assert_eq!(saga_id_from_payload(&json!({"SagaId": 42})), None);
        assert_eq!(saga_id_from_payload(&json!({"SagaId": "not-a-uuid"})), None);
    }
}
