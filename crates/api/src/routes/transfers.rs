//! Transfer acceptance and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use common::{AccountId, SagaId};
use idempotency::IdempotencyStore;
use ledger::{LedgerService, LedgerStore};
use rust_decimal::Decimal;
use saga::SagaRepository;
use serde::{Deserialize, Serialize};
use transfer::{TransferData, transfer_steps};

use crate::config::Config;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<R, I, L> {
    pub repository: R,
    pub locks: I,
    pub ledger: Arc<LedgerService<L>>,
    pub config: Config,
}

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateTransferRequest {
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: Decimal,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransferAcceptedResponse {
    pub saga_id: String,
    pub status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransferStatusResponse {
    pub saga_id: String,
    pub state: String,
    pub current_step: Option<String>,
    pub errors: Vec<String>,
}

// -- Handlers --

/// POST /transfers — accept a transfer and queue its saga.
///
/// Acceptance only persists the saga and its `StartSaga` outbox row;
/// execution happens asynchronously in the worker pool, hence 202.
#[tracing::instrument(skip(state, req))]
pub async fn create<R, I, L>(
    State(state): State<Arc<AppState<R, I, L>>>,
    Json(req): Json<CreateTransferRequest>,
) -> Result<Response, ApiError>
where
    R: SagaRepository<TransferData>,
    I: Send + Sync,
    L: Send + Sync,
{
    let from = parse_account_id(&req.from_user_id, "FromUserId")?;
    let to = parse_account_id(&req.to_user_id, "ToUserId")?;

    if req.amount <= Decimal::ZERO {
        return Err(ApiError::BadRequest("Amount must be positive".to_string()));
    }

    let saga_id = SagaId::new();
    let data = TransferData::new(saga_id, from, to, req.amount);
    state.repository.create(saga_id, &data).await?;

    let body = TransferAcceptedResponse {
        saga_id: saga_id.to_string(),
        status: "Queued".to_string(),
    };

    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, format!("/transfers/{saga_id}"))],
        Json(body),
    )
        .into_response())
}

/// GET /transfers/:id — report a saga's state, current step and errors.
#[tracing::instrument(skip(state))]
pub async fn get<R, I, L>(
    State(state): State<Arc<AppState<R, I, L>>>,
    Path(id): Path<String>,
) -> Result<Json<TransferStatusResponse>, ApiError>
where
    R: SagaRepository<TransferData>,
    I: IdempotencyStore + Clone + 'static,
    L: LedgerStore + 'static,
{
    let saga_id = parse_saga_id(&id)?;

    // The step list is only needed to name the current step; status reads
    // claim no locks.
    let steps = transfer_steps(
        state.locks.clone(),
        state.ledger.clone(),
        "api-status",
        state.config.step_lease,
    );

    let instance = state
        .repository
        .load(saga_id, steps)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transfer {id} not found")))?;

    Ok(Json(TransferStatusResponse {
        saga_id: saga_id.to_string(),
        state: instance.state().to_string(),
        current_step: instance.current_step().map(|s| s.name().to_string()),
        errors: instance.error_log().to_vec(),
    }))
}

fn parse_account_id(value: &str, field: &str) -> Result<AccountId, ApiError> {
    let uuid = uuid::Uuid::parse_str(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))?;
    Ok(AccountId::from_uuid(uuid))
}

fn parse_saga_id(value: &str) -> Result<SagaId, ApiError> {
    let uuid = uuid::Uuid::parse_str(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid saga id: {e}")))?;
    Ok(SagaId::from_uuid(uuid))
}
