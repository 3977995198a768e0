//! HTTP request handlers

use super::types::{
    ChatFailureResponse, ChatRequest, ChatResponse, ErrorResponse, FlowQuery, PublishFlowRequest,
    PublishFlowResponse,
};
use super::AppState;
use crate::db::PublishedFlow;
use crate::engine::{OutboundMessage, SessionState};
use crate::runtime::{TurnError, TurnErrorKind, TurnRequest, GENERIC_FAILURE};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Turn requests
        .route("/api/chat", post(chat))
        .route("/api/sessions/:id", get(get_session))
        // Flow publishing
        .route("/api/flows", post(publish_flow))
        .route("/api/flows/:id", get(get_flow))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Turns
// ============================================================

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let request = TurnRequest {
        session_id: req.session_id,
        flow_id: req.flow_id,
        version: req.version,
        inbound: req.inbound_payload,
        client: req.client,
    };
    let reply = state
        .runtime
        .handle_turn(request)
        .await
        .map_err(AppError::Turn)?;

    Ok(Json(ChatResponse {
        session_id: reply.session_id,
        output: reply.output,
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionState>, AppError> {
    Ok(Json(state.runtime.get_session(&id).await?))
}

// ============================================================
// Flows
// ============================================================

async fn publish_flow(
    State(state): State<AppState>,
    Json(req): Json<PublishFlowRequest>,
) -> Result<(StatusCode, Json<PublishFlowResponse>), AppError> {
    let outcome = state
        .runtime
        .publish_flow(req.flow_id, req.definition)
        .await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(PublishFlowResponse {
            flow_id: outcome.flow.flow_id,
            version: outcome.flow.version,
            checksum: outcome.flow.checksum,
            created: outcome.created,
            warnings: outcome.warnings,
        }),
    ))
}

async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FlowQuery>,
) -> Result<Json<PublishedFlow>, AppError> {
    Ok(Json(state.runtime.get_flow(&id, query.version).await?))
}

async fn get_version() -> &'static str {
    concat!("chatflow ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    /// A failed turn; the end user gets the generic failure message
    Turn(TurnError),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<TurnError> for AppError {
    fn from(e: TurnError) -> Self {
        match e.kind {
            TurnErrorKind::BadRequest => AppError::BadRequest(e.message),
            TurnErrorKind::NotFound => AppError::NotFound(e.message),
            TurnErrorKind::Conflict => AppError::Conflict(e.message),
            TurnErrorKind::GraphIntegrity | TurnErrorKind::Script | TurnErrorKind::Storage => {
                AppError::Internal(e.message)
            }
        }
    }
}

fn status_for(kind: TurnErrorKind) -> StatusCode {
    match kind {
        TurnErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        TurnErrorKind::NotFound => StatusCode::NOT_FOUND,
        TurnErrorKind::Conflict => StatusCode::CONFLICT,
        TurnErrorKind::GraphIntegrity | TurnErrorKind::Script | TurnErrorKind::Storage => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Turn(e) => {
                tracing::warn!(kind = ?e.kind, error = %e.message, "Turn request failed");
                let body = Json(ChatFailureResponse {
                    error: e.kind,
                    messages: vec![OutboundMessage::text(GENERIC_FAILURE.to_string())],
                    waiting_for: e.waiting_for,
                });
                return (status_for(e.kind), body).into_response();
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
