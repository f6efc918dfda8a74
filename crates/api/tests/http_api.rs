//! HTTP surface tests against the in-memory stores.

use std::sync::Arc;

use api::{AppState, Config};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use idempotency::InMemoryIdempotencyStore;
use ledger::{InMemoryLedgerStore, LedgerService};
use metrics_exporter_prometheus::PrometheusBuilder;
use outbox::InMemoryOutboxStore;
use rust_decimal_macros::dec;
use saga::InMemorySagaRepository;
use tower::util::ServiceExt;
use uuid::Uuid;

fn app() -> (Router, InMemorySagaRepository) {
    let outbox = InMemoryOutboxStore::new();
    let repository = InMemorySagaRepository::new(outbox);
    let config = Config::default();

    let state = Arc::new(AppState {
        repository: repository.clone(),
        locks: InMemoryIdempotencyStore::new(),
        ledger: Arc::new(LedgerService::new(
            InMemoryLedgerStore::new(),
            config.overdraft_limit,
        )),
        config,
    });

    let handle = PrometheusBuilder::new().build_recorder().handle();
    (api::create_app(state, handle), repository)
}

async fn body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn post_transfers_accepts_and_queues() {
    let (app, repository) = app();

    let request = Request::post("/transfers")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "FromUserId": Uuid::new_v4().to_string(),
                "ToUserId": Uuid::new_v4().to_string(),
                "Amount": dec!(777),
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(location.starts_with("/transfers/"));

    let body = body_json(response.into_body()).await;
    assert_eq!(body["Status"], "Queued");
    let saga_id = body["SagaId"].as_str().unwrap();
    assert_eq!(location, format!("/transfers/{saga_id}"));

    // The acceptance wrote the StartSaga outbox row.
    assert_eq!(repository.outbox().pending_count().await, 1);
}

#[tokio::test]
async fn get_transfer_reports_queued_state() {
    let (app, _repository) = app();

    let create = Request::post("/transfers")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "FromUserId": Uuid::new_v4().to_string(),
                "ToUserId": Uuid::new_v4().to_string(),
                "Amount": dec!(10),
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    let body = body_json(response.into_body()).await;
    let saga_id = body["SagaId"].as_str().unwrap().to_string();

    let get = Request::get(format!("/transfers/{saga_id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(get).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status = body_json(response.into_body()).await;
    assert_eq!(status["SagaId"], saga_id.as_str());
    assert_eq!(status["State"], "Created");
    assert_eq!(status["CurrentStep"], "DebitSender");
    assert_eq!(status["Errors"], serde_json::json!([]));
}

#[tokio::test]
async fn get_unknown_transfer_is_404() {
    let (app, _) = app();

    let request = Request::get(format!("/transfers/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_positive_amount_is_rejected() {
    let (app, repository) = app();

    let request = Request::post("/transfers")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "FromUserId": Uuid::new_v4().to_string(),
                "ToUserId": Uuid::new_v4().to_string(),
                "Amount": dec!(-5),
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(repository.outbox().pending_count().await, 0);
}

#[tokio::test]
async fn invalid_account_id_is_rejected() {
    let (app, _) = app();

    let request = Request::post("/transfers")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "FromUserId": "not-a-uuid",
                "ToUserId": Uuid::new_v4().to_string(),
                "Amount": dec!(5),
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (app, _) = app();

    let request = Request::get("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
