use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{ClaimOutcome, IdempotencyError, IdempotencyStore, Result};

#[derive(Debug, Clone)]
struct KeyRecord {
    created_at: DateTime<Utc>,
    is_consumed: bool,
    locked_by: Option<String>,
    locked_until: Option<DateTime<Utc>>,
}

impl KeyRecord {
    fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        match self.locked_until {
            None => true,
            Some(until) => until < now,
        }
    }
}

/// In-memory idempotency store for testing.
///
/// Mirrors the claim/complete semantics of the PostgreSQL implementation,
/// including lease takeover on expiry and owner-verified sealing.
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    keys: Arc<RwLock<HashMap<String, KeyRecord>>>,
}

impl InMemoryIdempotencyStore {
    /// Creates a new empty in-memory idempotency store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the lease on `key` to be expired, as if its TTL had elapsed.
    ///
    /// Test helper for simulating a crashed holder.
    pub async fn expire_lease(&self, key: &str) {
        let mut keys = self.keys.write().await;
        if let Some(record) = keys.get_mut(key) {
            record.locked_until = Some(Utc::now() - Duration::from_secs(1));
        }
    }

    /// Returns the current lease holder of `key`, if any.
    pub async fn holder(&self, key: &str) -> Option<String> {
        let keys = self.keys.read().await;
        keys.get(key).and_then(|r| {
            if r.is_consumed || r.lease_expired(Utc::now()) {
                None
            } else {
                r.locked_by.clone()
            }
        })
    }

    /// Returns the number of keys ever claimed.
    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn try_claim(&self, key: &str, owner: &str, ttl: Duration) -> Result<ClaimOutcome> {
        let now = Utc::now();
        let mut keys = self.keys.write().await;

        match keys.get_mut(key) {
            None => {
                keys.insert(
                    key.to_string(),
                    KeyRecord {
                        created_at: now,
                        is_consumed: false,
                        locked_by: Some(owner.to_string()),
                        locked_until: Some(now + ttl),
                    },
                );
                Ok(ClaimOutcome::Acquired)
            }
            Some(record) if record.is_consumed => Ok(ClaimOutcome::AlreadyConsumed),
            Some(record) if record.lease_expired(now) => {
                record.locked_by = Some(owner.to_string());
                record.locked_until = Some(now + ttl);
                Ok(ClaimOutcome::Acquired)
            }
            Some(_) => Ok(ClaimOutcome::LockedByOther),
        }
    }

    async fn complete(&self, key: &str, owner: &str) -> Result<()> {
        let mut keys = self.keys.write().await;

        match keys.get_mut(key) {
            Some(record) if record.is_consumed => Ok(()),
            Some(record) if record.locked_by.as_deref() == Some(owner) => {
                record.is_consumed = true;
                record.locked_by = None;
                record.locked_until = None;
                Ok(())
            }
            _ => Err(IdempotencyError::LostLease {
                key: key.to_string(),
            }),
        }
    }

    async fn is_consumed(&self, key: &str) -> Result<bool> {
        let keys = self.keys.read().await;
        Ok(keys.get(key).map(|r| r.is_consumed).unwrap_or(false))
    }
}
