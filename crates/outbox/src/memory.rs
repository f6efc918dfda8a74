use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    NewOutboxMessage, OutboxMessage, Result,
    message::clip_error,
    store::OutboxStore,
};

/// In-memory outbox store for testing.
///
/// Mirrors the eligibility and claim semantics of the PostgreSQL
/// implementation. A monotonic tiebreaker keeps dispatch order stable when
/// two messages are enqueued within the same clock tick.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    messages: Vec<(u64, OutboxMessage)>,
    next_seq: u64,
}

impl InMemoryOutboxStore {
    /// Creates a new empty in-memory outbox store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the message with the given ID.
    pub async fn get(&self, id: Uuid) -> Option<OutboxMessage> {
        let inner = self.inner.read().await;
        inner
            .messages
            .iter()
            .find(|(_, m)| m.id == id)
            .map(|(_, m)| m.clone())
    }

    /// Forces the lease on a message to be expired, as if its TTL had
    /// elapsed. Test helper for simulating a crashed worker.
    pub async fn expire_lease(&self, id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some((_, message)) = inner.messages.iter_mut().find(|(_, m)| m.id == id) {
            message.locked_until = Some(Utc::now() - Duration::from_secs(1));
        }
    }

    /// Returns the number of unprocessed messages.
    pub async fn pending_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner
            .messages
            .iter()
            .filter(|(_, m)| m.processed_at.is_none())
            .count()
    }
}

fn eligible(message: &OutboxMessage, now: DateTime<Utc>) -> bool {
    message.processed_at.is_none()
        && match message.locked_until {
            None => true,
            Some(until) => until < now,
        }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn enqueue(&self, message: NewOutboxMessage) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        inner.messages.push((
            seq,
            OutboxMessage {
                id,
                message_type: message.message_type,
                payload: message.payload,
                created_at: Utc::now(),
                processed_at: None,
                attempt_count: 0,
                last_error: None,
                locked_by: None,
                locked_until: None,
            },
        ));

        Ok(id)
    }

    async fn scout(&self) -> Result<Option<Uuid>> {
        let now = Utc::now();
        let inner = self.inner.read().await;

        Ok(inner
            .messages
            .iter()
            .filter(|(_, m)| eligible(m, now))
            .min_by_key(|(seq, m)| (m.created_at, *seq))
            .map(|(_, m)| m.id))
    }

    async fn claim(&self, id: Uuid, worker_id: &str, lease_ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        let Some((_, message)) = inner.messages.iter_mut().find(|(_, m)| m.id == id) else {
            return Ok(false);
        };

        if !eligible(message, now) {
            return Ok(false);
        }

        message.locked_by = Some(worker_id.to_string());
        message.locked_until = Some(now + lease_ttl);
        Ok(true)
    }

    async fn load(&self, id: Uuid) -> Result<Option<OutboxMessage>> {
        Ok(self.get(id).await)
    }

    async fn mark_processed(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some((_, message)) = inner.messages.iter_mut().find(|(_, m)| m.id == id) {
            message.processed_at = Some(Utc::now());
            message.locked_by = None;
            message.locked_until = None;
        }
        Ok(())
    }

    async fn release(
        &self,
        id: Uuid,
        retry_at: DateTime<Utc>,
        increment_attempt: bool,
        reason: &str,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some((_, message)) = inner.messages.iter_mut().find(|(_, m)| m.id == id) {
            message.locked_by = None;
            message.locked_until = Some(retry_at);
            if increment_attempt {
                message.attempt_count += 1;
            }
            message.last_error = Some(clip_error(reason));
        }
        Ok(())
    }
}
