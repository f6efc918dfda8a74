//! Transactional outbox: durable intent queue with lease-based claims.
//!
//! Requests write their intent into the outbox in the same transaction as
//! their business state; a pool of workers later claims each message under a
//! lease and dispatches it. Delivery is at-least-once across crashes; effect
//! idempotency is the dispatcher's responsibility.

pub mod error;
pub mod memory;
pub mod message;
pub mod postgres;
pub mod store;
pub mod worker;

pub use error::{OutboxError, Result};
pub use memory::InMemoryOutboxStore;
pub use message::{MAX_ERROR_LEN, NewOutboxMessage, OutboxMessage};
pub use postgres::PostgresOutboxStore;
pub use store::OutboxStore;
pub use worker::{DispatchError, OutboxDispatcher, OutboxWorker, Tick, WorkerOptions};
