//! Shared types for the saga orchestrator.

pub mod shutdown;
pub mod types;

pub use shutdown::{Shutdown, ShutdownHandle};
pub use types::{AccountId, SagaId};
