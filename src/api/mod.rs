//! HTTP API surface: axum router and handlers.
//!
//! Thin layer over [`Relay`] and [`Store`]; every response is JSON and
//! errors use one envelope shape (`{"error": code, "message": ...}`).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::delivery::{EnqueueError, RequestSource};
use crate::scheduler::Cadence;
use crate::service::Relay;
use crate::store::Store;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Delivery facade.
    pub relay: Relay,
    /// Persistence store.
    pub store: Arc<Store>,
}

/// Build the full router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/send-otp", post(send_otp))
        .route("/api/otp-status/{id}", get(otp_status))
        .route("/api/stats", get(stats))
        .route("/api/session/start", post(session_start))
        .route("/api/session/stop", post(session_stop))
        .route("/api/history", get(history))
        .route("/api/recipients", post(add_recipient).get(list_recipients))
        .route("/api/templates", post(add_template).get(list_templates))
        .route("/api/schedules", post(add_schedule).get(list_schedules))
        .route("/api/messages", post(send_message))
        .with_state(state)
}

/// Consistent JSON error envelope.
fn json_error(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": code, "message": message })),
    )
        .into_response()
}

fn enqueue_error_response(e: EnqueueError) -> Response {
    match e {
        EnqueueError::InvalidDestination { .. } | EnqueueError::EmptyPayload => {
            json_error(StatusCode::BAD_REQUEST, "validation", e.to_string())
        }
        EnqueueError::PayloadTooLong { .. } => {
            json_error(StatusCode::BAD_REQUEST, "validation", e.to_string())
        }
        EnqueueError::QueueFull | EnqueueError::ShuttingDown => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", e.to_string())
        }
    }
}

fn store_error_response(e: anyhow::Error) -> Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "store", e.to_string())
}

async fn health() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

#[derive(Debug, Deserialize)]
struct SendOtpRequest {
    phone_number: String,
    otp_code: String,
}

#[derive(Debug, Serialize)]
struct EnqueuedResponse {
    request_id: Uuid,
}

async fn send_otp(
    State(state): State<AppState>,
    Json(req): Json<SendOtpRequest>,
) -> Response {
    if req.otp_code.trim().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation",
            "otp_code must not be empty".to_owned(),
        );
    }
    let payload = format!("Your verification code is: {}", req.otp_code.trim());
    match state
        .relay
        .enqueue(&req.phone_number, &payload, RequestSource::AdHoc)
    {
        Ok(request_id) => {
            info!(%request_id, "OTP request accepted");
            (StatusCode::ACCEPTED, Json(EnqueuedResponse { request_id })).into_response()
        }
        Err(e) => enqueue_error_response(e),
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    request_id: Uuid,
    #[serde(flatten)]
    status: crate::service::RequestStatus,
    attempts: usize,
}

async fn otp_status(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    if let Some(status) = state.relay.status(id) {
        let attempts = state.relay.attempt_count(id).unwrap_or(0);
        return Json(StatusResponse {
            request_id: id,
            status,
            attempts,
        })
        .into_response();
    }
    // Resolved requests are pruned from the ledger once archived; the
    // history store stays the durable answer for them.
    match state.store.history_record(id).await {
        Ok(Some(record)) => match crate::service::RequestStatus::from_archived(&record.status) {
            Some(status) => Json(StatusResponse {
                request_id: id,
                status,
                attempts: usize::try_from(record.attempts).unwrap_or(0),
            })
            .into_response(),
            None => json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store",
                format!("unrecognized archived status: {}", record.status),
            ),
        },
        Ok(None) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("unknown request id: {id}"),
        ),
        Err(e) => store_error_response(e),
    }
}

async fn stats(State(state): State<AppState>) -> Response {
    Json(state.relay.runtime_stats()).into_response()
}

async fn session_start(State(state): State<AppState>) -> Response {
    match state.relay.start_session().await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => json_error(StatusCode::BAD_GATEWAY, "session", e.to_string()),
    }
}

async fn session_stop(State(state): State<AppState>) -> Response {
    state.relay.stop_session().await;
    Json(serde_json::json!({ "success": true })).into_response()
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

async fn history(State(state): State<AppState>, Query(q): Query<HistoryQuery>) -> Response {
    let limit = q.limit.unwrap_or(50).min(500);
    match state.store.recent_history(limit).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct AddRecipientRequest {
    name: String,
    phone: String,
}

async fn add_recipient(
    State(state): State<AppState>,
    Json(req): Json<AddRecipientRequest>,
) -> Response {
    if req.name.trim().is_empty() || req.phone.trim().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation",
            "name and phone are required".to_owned(),
        );
    }
    match state.store.add_recipient(&req.name, &req.phone).await {
        Ok(recipient) => (StatusCode::CREATED, Json(recipient)).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn list_recipients(State(state): State<AppState>) -> Response {
    match state.store.list_recipients().await {
        Ok(recipients) => Json(recipients).into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct AddTemplateRequest {
    name: String,
    content: String,
}

async fn add_template(
    State(state): State<AppState>,
    Json(req): Json<AddTemplateRequest>,
) -> Response {
    if req.name.trim().is_empty() || req.content.trim().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation",
            "name and content are required".to_owned(),
        );
    }
    match state.store.add_template(&req.name, &req.content).await {
        Ok(template) => (StatusCode::CREATED, Json(template)).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn list_templates(State(state): State<AppState>) -> Response {
    match state.store.list_templates().await {
        Ok(templates) => Json(templates).into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct AddScheduleRequest {
    recipient_id: Uuid,
    template_id: Uuid,
    cadence: Cadence,
}

async fn add_schedule(
    State(state): State<AppState>,
    Json(req): Json<AddScheduleRequest>,
) -> Response {
    match state
        .store
        .add_schedule(req.recipient_id, req.template_id, req.cadence)
        .await
    {
        Ok(schedule) => (StatusCode::CREATED, Json(schedule)).into_response(),
        Err(e) => json_error(StatusCode::BAD_REQUEST, "validation", e.to_string()),
    }
}

async fn list_schedules(State(state): State<AppState>) -> Response {
    match state.store.list_schedules().await {
        Ok(schedules) => Json(schedules).into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    recipient_id: Uuid,
    template_id: Uuid,
}

async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    let recipient = match state.store.get_recipient(req.recipient_id).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "validation",
                format!("unknown recipient: {}", req.recipient_id),
            )
        }
        Err(e) => return store_error_response(e),
    };
    let template = match state.store.get_template(req.template_id).await {
        Ok(Some(t)) => t,
        Ok(None) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "validation",
                format!("unknown template: {}", req.template_id),
            )
        }
        Err(e) => return store_error_response(e),
    };

    let payload = template.render(&recipient.name);
    match state
        .relay
        .enqueue(&recipient.phone, &payload, RequestSource::AdHoc)
    {
        Ok(request_id) => {
            (StatusCode::ACCEPTED, Json(EnqueuedResponse { request_id })).into_response()
        }
        Err(e) => enqueue_error_response(e),
    }
}
