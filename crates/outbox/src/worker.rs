//! Long-running outbox worker: scout, claim, dispatch, finalize.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::Shutdown;
use thiserror::Error;

use crate::{OutboxMessage, Result, store::OutboxStore};

/// How a dispatch attempt failed.
///
/// The three dispositions carry distinct retry semantics and must stay
/// distinguishable without string matching; the worker's dispatch table
/// branches on the variant alone.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Transient conflict (a lock held elsewhere, an optimistic clash).
    /// Re-queued with a short delay; does not count as an attempt.
    #[error("Transient conflict: {0}")]
    RetryLater(String),

    /// A lease expired mid-work. Re-queued with a moderate delay and
    /// counted; re-execution is safe because effects are idempotent.
    #[error("Lease lost: {0}")]
    LostLease(String),

    /// Anything else. Re-queued with growing backoff and counted.
    #[error("{0}")]
    Other(String),
}

/// Handles a claimed outbox message.
///
/// Implementations own message-type routing. Unknown types and references
/// to missing entities should return `Ok(())` so the message is finalized
/// instead of looping forever.
#[async_trait]
pub trait OutboxDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        message: &OutboxMessage,
        cancel: &Shutdown,
    ) -> std::result::Result<(), DispatchError>;
}

/// Tuning knobs for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Sleep when the scout finds nothing.
    pub empty_queue_delay: Duration,
    /// Lease length for a claimed message; must exceed the longest expected
    /// dispatch duration.
    pub lease_ttl: Duration,
    /// Re-queue delay after a transient conflict.
    pub transient_conflict_delay: Duration,
    /// Re-queue delay after a lost lease.
    pub lost_lease_delay: Duration,
    /// Base of the linear backoff for other failures.
    pub error_backoff_base: Duration,
    /// Cap for the backoff.
    pub error_backoff_max: Duration,
    /// Sleep after a loop-level store error.
    pub loop_error_delay: Duration,
    /// Attempt count at which an operator-visible warning is emitted.
    pub max_attempts_before_dlq: i32,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            empty_queue_delay: Duration::from_secs(1),
            lease_ttl: Duration::from_secs(30),
            transient_conflict_delay: Duration::from_secs(2),
            lost_lease_delay: Duration::from_secs(5),
            error_backoff_base: Duration::from_secs(5),
            error_backoff_max: Duration::from_secs(60),
            loop_error_delay: Duration::from_secs(5),
            max_attempts_before_dlq: 10,
        }
    }
}

/// What a single loop iteration did. Drives the pacing decision in `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Queue drained; sleep before the next scout.
    Idle,
    /// A message was claimed and handled (finalized or released).
    Dispatched,
    /// Lost the claim race; re-scout immediately.
    Skipped,
}

/// Polls the outbox, claims one message at a time under a lease, and runs it
/// through the dispatcher.
///
/// Multiple workers are safe and expected; the conditional claim guarantees
/// at most one driver per message, and therefore per saga.
pub struct OutboxWorker<S, D> {
    worker_id: String,
    store: S,
    dispatcher: D,
    options: WorkerOptions,
}

impl<S: OutboxStore, D: OutboxDispatcher> OutboxWorker<S, D> {
    /// Creates a new worker.
    pub fn new(
        worker_id: impl Into<String>,
        store: S,
        dispatcher: D,
        options: WorkerOptions,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            store,
            dispatcher,
            options,
        }
    }

    /// Returns this worker's ID.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Runs the worker until shutdown is requested.
    #[tracing::instrument(skip(self, cancel), fields(worker_id = %self.worker_id))]
    pub async fn run(&self, mut cancel: Shutdown) {
        tracing::info!("outbox worker started");
        let dispatch_cancel = cancel.clone();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let pause = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.tick(&dispatch_cancel) => match result {
                    Ok(Tick::Idle) => Some(self.options.empty_queue_delay),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::error!(error = %e, "outbox loop error");
                        Some(self.options.loop_error_delay)
                    }
                },
            };

            if let Some(delay) = pause {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }

        tracing::info!("outbox worker stopped");
    }

    /// Performs one scout/claim/dispatch iteration.
    pub async fn tick(&self, cancel: &Shutdown) -> Result<Tick> {
        let Some(candidate) = self.store.scout().await? else {
            return Ok(Tick::Idle);
        };

        if !self
            .store
            .claim(candidate, &self.worker_id, self.options.lease_ttl)
            .await?
        {
            // Another worker won the race; no sleep, just re-scout.
            return Ok(Tick::Skipped);
        }

        let Some(message) = self.store.load(candidate).await? else {
            return Ok(Tick::Skipped);
        };

        metrics::counter!("outbox_messages_claimed").increment(1);

        match self.dispatcher.dispatch(&message, cancel).await {
            Ok(()) => {
                self.store.mark_processed(message.id).await?;
                metrics::counter!("outbox_messages_processed").increment(1);
            }
            Err(DispatchError::RetryLater(reason)) => {
                tracing::debug!(id = %message.id, %reason, "transient conflict, re-queueing");
                self.store
                    .release(
                        message.id,
                        Utc::now() + self.options.transient_conflict_delay,
                        false,
                        &reason,
                    )
                    .await?;
            }
            Err(DispatchError::LostLease(reason)) => {
                tracing::warn!(id = %message.id, %reason, "lease lost, re-queueing");
                self.store
                    .release(
                        message.id,
                        Utc::now() + self.options.lost_lease_delay,
                        true,
                        &reason,
                    )
                    .await?;
                self.warn_if_exhausted(&message, message.attempt_count + 1);
            }
            Err(DispatchError::Other(reason)) => {
                let attempts = message.attempt_count + 1;
                let backoff = self
                    .options
                    .error_backoff_base
                    .saturating_mul(attempts as u32)
                    .min(self.options.error_backoff_max);

                tracing::warn!(
                    id = %message.id,
                    %reason,
                    attempts,
                    backoff_secs = backoff.as_secs(),
                    "dispatch failed, backing off"
                );
                metrics::counter!("outbox_messages_failed").increment(1);

                self.store
                    .release(message.id, Utc::now() + backoff, true, &reason)
                    .await?;
                self.warn_if_exhausted(&message, attempts);
            }
        }

        Ok(Tick::Dispatched)
    }

    fn warn_if_exhausted(&self, message: &OutboxMessage, attempts: i32) {
        if attempts >= self.options.max_attempts_before_dlq {
            // TODO: move exhausted messages to a dead-letter table instead of
            // leaving them in the hot queue.
            tracing::warn!(
                id = %message.id,
                message_type = %message.message_type,
                attempts,
                "outbox message exceeded attempt threshold, operator attention required"
            );
            metrics::counter!("outbox_messages_exhausted").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryOutboxStore;
    use crate::message::{MAX_ERROR_LEN, NewOutboxMessage};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use common::ShutdownHandle;
    use serde_json::json;

    /// Dispatcher scripted to fail a fixed number of times before succeeding.
    struct ScriptedDispatcher {
        calls: AtomicUsize,
        script: Box<dyn Fn(usize) -> std::result::Result<(), DispatchError> + Send + Sync>,
    }

    impl ScriptedDispatcher {
        fn new(
            script: impl Fn(usize) -> std::result::Result<(), DispatchError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script: Box::new(script),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OutboxDispatcher for ScriptedDispatcher {
        async fn dispatch(
            &self,
            _message: &OutboxMessage,
            _cancel: &Shutdown,
        ) -> std::result::Result<(), DispatchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.script)(call)
        }
    }

    fn worker(
        store: InMemoryOutboxStore,
        dispatcher: Arc<ScriptedDispatcher>,
    ) -> OutboxWorker<InMemoryOutboxStore, Arc<ScriptedDispatcher>> {
        OutboxWorker::new("w1", store, dispatcher, WorkerOptions::default())
    }

    #[async_trait]
    impl OutboxDispatcher for Arc<ScriptedDispatcher> {
        async fn dispatch(
            &self,
            message: &OutboxMessage,
            cancel: &Shutdown,
        ) -> std::result::Result<(), DispatchError> {
            self.as_ref().dispatch(message, cancel).await
        }
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let store = InMemoryOutboxStore::new();
        let dispatcher = Arc::new(ScriptedDispatcher::new(|_| Ok(())));
        let worker = worker(store, dispatcher.clone());

        let tick = worker.tick(&Shutdown::never()).await.unwrap();
        assert_eq!(tick, Tick::Idle);
        assert_eq!(dispatcher.call_count(), 0);
    }

    #[tokio::test]
    async fn successful_dispatch_finalizes_message() {
        let store = InMemoryOutboxStore::new();
        let id = store
            .enqueue(NewOutboxMessage::new("StartSaga", json!({})))
            .await
            .unwrap();

        let dispatcher = Arc::new(ScriptedDispatcher::new(|_| Ok(())));
        let worker = worker(store.clone(), dispatcher.clone());

        let tick = worker.tick(&Shutdown::never()).await.unwrap();
        assert_eq!(tick, Tick::Dispatched);
        assert_eq!(dispatcher.call_count(), 1);

        let message = store.get(id).await.unwrap();
        assert!(message.processed_at.is_some());
        assert_eq!(message.locked_by, None);
        assert_eq!(message.attempt_count, 0);
    }

    #[tokio::test]
    async fn retry_later_releases_without_counting() {
        let store = InMemoryOutboxStore::new();
        let id = store
            .enqueue(NewOutboxMessage::new("StartSaga", json!({})))
            .await
            .unwrap();

        let dispatcher = Arc::new(ScriptedDispatcher::new(|_| {
            Err(DispatchError::RetryLater("lock held".to_string()))
        }));
        let worker = worker(store.clone(), dispatcher.clone());

        worker.tick(&Shutdown::never()).await.unwrap();

        let message = store.get(id).await.unwrap();
        assert!(message.processed_at.is_none());
        assert_eq!(message.attempt_count, 0);
        assert_eq!(message.last_error.as_deref(), Some("lock held"));
        assert_eq!(message.locked_by, None);
        assert!(message.locked_until.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn lost_lease_releases_and_counts() {
        let store = InMemoryOutboxStore::new();
        let id = store
            .enqueue(NewOutboxMessage::new("StartSaga", json!({})))
            .await
            .unwrap();

        let dispatcher = Arc::new(ScriptedDispatcher::new(|_| {
            Err(DispatchError::LostLease("ttl elapsed".to_string()))
        }));
        let worker = worker(store.clone(), dispatcher.clone());

        worker.tick(&Shutdown::never()).await.unwrap();

        let message = store.get(id).await.unwrap();
        assert!(message.processed_at.is_none());
        assert_eq!(message.attempt_count, 1);
        assert_eq!(message.last_error.as_deref(), Some("ttl elapsed"));
    }

    #[tokio::test]
    async fn other_errors_back_off_and_count() {
        let store = InMemoryOutboxStore::new();
        let id = store
            .enqueue(NewOutboxMessage::new("StartSaga", json!({})))
            .await
            .unwrap();

        let dispatcher = Arc::new(ScriptedDispatcher::new(|call| {
            if call < 2 {
                Err(DispatchError::Other("boom".to_string()))
            } else {
                Ok(())
            }
        }));
        let worker = worker(store.clone(), dispatcher.clone());

        worker.tick(&Shutdown::never()).await.unwrap();
        let message = store.get(id).await.unwrap();
        assert_eq!(message.attempt_count, 1);
        assert_eq!(message.last_error.as_deref(), Some("boom"));

        // Parked by the backoff; make it visible again and retry.
        store.expire_lease(id).await;
        worker.tick(&Shutdown::never()).await.unwrap();
        let message = store.get(id).await.unwrap();
        assert_eq!(message.attempt_count, 2);

        store.expire_lease(id).await;
        worker.tick(&Shutdown::never()).await.unwrap();
        let message = store.get(id).await.unwrap();
        assert!(message.processed_at.is_some());
        assert_eq!(message.attempt_count, 2);
    }

    #[tokio::test]
    async fn long_error_reasons_are_clipped() {
        let store = InMemoryOutboxStore::new();
        let id = store
            .enqueue(NewOutboxMessage::new("StartSaga", json!({})))
            .await
            .unwrap();

        let dispatcher = Arc::new(ScriptedDispatcher::new(|_| {
            Err(DispatchError::Other("e".repeat(5000)))
        }));
        let worker = worker(store.clone(), dispatcher);

        worker.tick(&Shutdown::never()).await.unwrap();

        let message = store.get(id).await.unwrap();
        assert_eq!(message.last_error.unwrap().chars().count(), MAX_ERROR_LEN);
    }

    #[tokio::test]
    async fn parked_message_is_invisible_until_retry_at() {
        let store = InMemoryOutboxStore::new();
        store
            .enqueue(NewOutboxMessage::new("StartSaga", json!({})))
            .await
            .unwrap();

        let dispatcher = Arc::new(ScriptedDispatcher::new(|_| {
            Err(DispatchError::RetryLater("busy".to_string()))
        }));
        let worker = worker(store.clone(), dispatcher.clone());

        worker.tick(&Shutdown::never()).await.unwrap();

        // The 2 s transient delay keeps it out of the next scout.
        let tick = worker.tick(&Shutdown::never()).await.unwrap();
        assert_eq!(tick, Tick::Idle);
        assert_eq!(dispatcher.call_count(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let store = InMemoryOutboxStore::new();
        let dispatcher = Arc::new(ScriptedDispatcher::new(|_| Ok(())));
        let worker = Arc::new(OutboxWorker::new(
            "w1",
            store,
            dispatcher,
            WorkerOptions::default(),
        ));

        let (handle, token) = ShutdownHandle::new();
        let task = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run(token).await })
        };

        handle.shutdown();
        task.await.unwrap();
    }
}
