//! API server entry point: HTTP acceptance plus the outbox worker pool.

use std::sync::Arc;

use api::{AppState, Config, StartSagaDispatcher};
use common::ShutdownHandle;
use idempotency::{IdempotencyStore, InMemoryIdempotencyStore, PostgresIdempotencyStore};
use ledger::{InMemoryLedgerStore, LedgerService, LedgerStore, PostgresLedgerStore};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::{InMemoryOutboxStore, OutboxStore, OutboxWorker, PostgresOutboxStore};
use saga::{InMemorySagaRepository, PostgresSagaRepository, SagaRepository};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use transfer::TransferData;
use uuid::Uuid;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();

    // 3. Wire the stores: PostgreSQL when configured, in-memory otherwise
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(&url)
                .await
                .expect("failed to connect to database");

            let repository = PostgresSagaRepository::<TransferData>::new(pool.clone());
            repository
                .run_migrations()
                .await
                .expect("failed to run migrations");

            serve(
                repository,
                PostgresIdempotencyStore::new(pool.clone()),
                PostgresLedgerStore::new(pool.clone()),
                PostgresOutboxStore::new(pool),
                config,
                metrics_handle,
            )
            .await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            let outbox_store = InMemoryOutboxStore::new();
            let repository = InMemorySagaRepository::new(outbox_store.clone());

            serve(
                repository,
                InMemoryIdempotencyStore::new(),
                InMemoryLedgerStore::new(),
                outbox_store,
                config,
                metrics_handle,
            )
            .await;
        }
    }

    tracing::info!("server shut down gracefully");
}

/// Spawns the worker pool, serves HTTP, and coordinates graceful shutdown.
async fn serve<R, I, L, O>(
    repository: R,
    locks: I,
    ledger_store: L,
    outbox_store: O,
    config: Config,
    metrics_handle: PrometheusHandle,
) where
    R: SagaRepository<TransferData> + Clone + 'static,
    I: IdempotencyStore + Clone + 'static,
    L: LedgerStore + 'static,
    O: OutboxStore + Clone + 'static,
{
    let ledger = Arc::new(LedgerService::new(ledger_store, config.overdraft_limit));
    let (shutdown_handle, shutdown) = ShutdownHandle::new();

    // 4. Outbox worker pool
    let mut workers = Vec::new();
    for n in 0..config.worker_count {
        let dispatcher = StartSagaDispatcher::new(
            repository.clone(),
            locks.clone(),
            ledger.clone(),
            config.step_lease,
        );
        let worker = OutboxWorker::new(
            format!("worker-{n}-{}", Uuid::new_v4()),
            outbox_store.clone(),
            dispatcher,
            config.worker_options(),
        );
        let token = shutdown.clone();
        workers.push(tokio::spawn(async move { worker.run(token).await }));
    }

    // 5. HTTP server
    let state = Arc::new(AppState {
        repository,
        locks,
        ledger,
        config: config.clone(),
    });
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, workers = config.worker_count, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");

    let signal = async move {
        shutdown_signal().await;
        shutdown_handle.shutdown();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .expect("server error");

    // 6. Wait for the workers to drain
    for worker in workers {
        let _ = worker.await;
    }
}
