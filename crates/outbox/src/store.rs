use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{NewOutboxMessage, OutboxMessage, Result};

/// Durable queue backing the outbox worker.
///
/// All cross-worker coordination happens through the conditional updates in
/// this trait; no in-process locks are involved.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends a message to the queue and returns its ID.
    async fn enqueue(&self, message: NewOutboxMessage) -> Result<Uuid>;

    /// Read-only probe for the oldest message that is unprocessed and whose
    /// lease is absent or expired. Returns None when the queue is drained.
    async fn scout(&self) -> Result<Option<Uuid>>;

    /// Attempts to claim `id` for `worker_id` under a lease.
    ///
    /// The update is conditional on the message still being unprocessed and
    /// unleased; returns false when another worker won the race.
    async fn claim(&self, id: Uuid, worker_id: &str, lease_ttl: Duration) -> Result<bool>;

    /// Loads a message by ID.
    async fn load(&self, id: Uuid) -> Result<Option<OutboxMessage>>;

    /// Finalizes a message: sets `processed_at` and clears the lease.
    async fn mark_processed(&self, id: Uuid) -> Result<()>;

    /// Releases a message for a later retry.
    ///
    /// Clears the holder, parks the lease until `retry_at`, records the
    /// failure reason, and increments the attempt count when asked to
    /// (transient conflicts are retried without counting).
    async fn release(
        &self,
        id: Uuid,
        retry_at: DateTime<Utc>,
        increment_attempt: bool,
        reason: &str,
    ) -> Result<()>;
}
