//! Outbox message model.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Maximum stored length of `last_error`; longer reasons are truncated.
pub const MAX_ERROR_LEN: usize = 500;

/// A durable intent record written atomically with the business state it
/// refers to.
///
/// A message is claimed by at most one worker at a time via a lease
/// (`locked_by`/`locked_until`); `processed_at` is terminal. Dispatch order
/// is `created_at` ascending among unprocessed, non-leased rows.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub message_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
}

/// An outbox message that has not been enqueued yet.
#[derive(Debug, Clone)]
pub struct NewOutboxMessage {
    pub message_type: String,
    pub payload: serde_json::Value,
}

impl NewOutboxMessage {
    /// Creates a new message of the given type.
    pub fn new(message_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
        }
    }
}

/// Clips an error reason to the storable length.
pub fn clip_error(reason: &str) -> String {
    reason.chars().take(MAX_ERROR_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_errors_are_unchanged() {
        assert_eq!(clip_error("boom"), "boom");
    }

    #[test]
    fn long_errors_are_clipped() {
        let long = "x".repeat(2 * MAX_ERROR_LEN);
        assert_eq!(clip_error(&long).chars().count(), MAX_ERROR_LEN);
    }
}
