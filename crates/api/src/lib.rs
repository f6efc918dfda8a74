//! HTTP acceptance API and worker wiring for the saga orchestrator.
//!
//! Accepting a transfer only persists a saga snapshot plus its `StartSaga`
//! outbox row; the worker pool drives execution asynchronously. Structured
//! logging (tracing) and Prometheus metrics are wired in here.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use idempotency::IdempotencyStore;
use ledger::LedgerStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::SagaRepository;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use transfer::TransferData;

pub use config::Config;
pub use dispatch::StartSagaDispatcher;
pub use error::ApiError;
pub use routes::transfers::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R, I, L>(
    state: Arc<AppState<R, I, L>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    R: SagaRepository<TransferData> + 'static,
    I: IdempotencyStore + Clone + 'static,
    L: LedgerStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/transfers", post(routes::transfers::create::<R, I, L>))
        .route("/transfers/{id}", get(routes::transfers::get::<R, I, L>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
