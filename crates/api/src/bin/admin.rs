//! Interactive admin entry point.
//!
//! Three commands: create a saga, resume one by ID (useful for sagas stuck
//! behind an expired lease), and exit. Runs against the configured
//! PostgreSQL database.

use std::sync::Arc;

use api::Config;
use common::{AccountId, SagaId, Shutdown};
use idempotency::PostgresIdempotencyStore;
use ledger::{LedgerService, PostgresLedgerStore};
use rust_decimal::Decimal;
use saga::{PostgresSagaRepository, SagaCoordinator, SagaRepository};
use sqlx::postgres::PgPoolOptions;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use transfer::{TransferData, transfer_steps};
use uuid::Uuid;

const USAGE: &str = "commands:\n  create <amount>   create a transfer saga between two fresh accounts\n  resume <saga-id>  load a saga and drive it in place\n  exit";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = Config::from_env();
    let Some(url) = config.database_url.clone() else {
        eprintln!("admin requires DATABASE_URL to be set");
        std::process::exit(1);
    };

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

    let locks = PostgresIdempotencyStore::new(pool.clone());
    let ledger = Arc::new(LedgerService::new(
        PostgresLedgerStore::new(pool),
        config.overdraft_limit,
    ));
    let coordinator = SagaCoordinator::new(repository.clone());
    let owner = format!("admin-{}", Uuid::new_v4());

    println!("{USAGE}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        use std::io::Write;
        std::io::stdout().flush().ok();

        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts.as_slice() {
            ["create", amount] => {
                let Ok(amount) = amount.parse::<Decimal>() else {
                    println!("invalid amount");
                    continue;
                };
                let saga_id = SagaId::new();
                let data =
                    TransferData::new(saga_id, AccountId::new(), AccountId::new(), amount);
                match repository.create(saga_id, &data).await {
                    Ok(()) => println!(
                        "created saga {saga_id} ({} -> {}, amount {amount})",
                        data.from_user_id, data.to_user_id
                    ),
                    Err(e) => println!("create failed: {e}"),
                }
            }
            ["resume", id] => {
                let Ok(uuid) = Uuid::parse_str(id) else {
                    println!("invalid saga id");
                    continue;
                };
                let saga_id = SagaId::from_uuid(uuid);
                let steps = transfer_steps(
                    locks.clone(),
                    ledger.clone(),
                    owner.clone(),
                    config.step_lease,
                );
                match repository.load(saga_id, steps).await {
                    Ok(Some(mut instance)) => {
                        match coordinator.process(&mut instance, &Shutdown::never()).await {
                            Ok(()) => println!("saga {saga_id} is now {}", instance.state()),
                            Err(e) => println!("processing stopped: {e}"),
                        }
                        for error in instance.error_log() {
                            println!("  error: {error}");
                        }
                    }
                    Ok(None) => println!("saga {saga_id} not found"),
                    Err(e) => println!("load failed: {e}"),
                }
            }
            ["exit"] | ["quit"] => break,
            [] => {}
            _ => println!("{USAGE}"),
        }
    }
}
