//! Saga engine: durable multi-step transactions with compensation.
//!
//! A saga is an ordered list of steps with a semantic undo for each. The
//! snapshot (state, cursor, payload, error log) is persisted after every
//! transition, steps guard their effects with idempotency keys, and a failed
//! step triggers reverse-order compensation of everything executed before
//! it. Delivery comes from the transactional outbox; this crate assumes at
//! most one driver per saga at a time (the outbox lease guarantees it).

pub mod coordinator;
pub mod error;
pub mod instance;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod state;
pub mod step;

pub use coordinator::SagaCoordinator;
pub use error::{Result, SagaError};
pub use instance::SagaInstance;
pub use memory::InMemorySagaRepository;
pub use postgres::PostgresSagaRepository;
pub use repository::{
    START_SAGA_MESSAGE_TYPE, SagaRepository, StepList, saga_id_from_payload, start_saga_payload,
};
pub use state::SagaState;
pub use step::{SagaData, SagaStep, StepError};
