//! REST endpoints for conversation turns and session snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::FlowError;
use crate::flow::{TurnCoordinator, TurnRequest};
use crate::session::SessionStore;

/// Shared state for the flow routes.
#[derive(Clone)]
pub struct FlowRouteState {
    pub coordinator: Arc<TurnCoordinator>,
}

/// Shared state for the admin routes.
#[derive(Clone)]
pub struct AdminRouteState {
    pub store: Arc<SessionStore>,
}

#[derive(Debug, Deserialize)]
struct TurnBody {
    user_id: String,
    text: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn flow_error_response(err: &FlowError) -> Response {
    let status = match err {
        FlowError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
        FlowError::AgentInvocation(_) => StatusCode::BAD_GATEWAY,
        FlowError::TurnAborted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.user_message())
}

/// POST /api/sessions/{session_id}/turns
///
/// Runs one turn. The turn runs in its own task, so a client that hangs up
/// mid-turn does not cancel the commit.
async fn post_turn(
    State(state): State<FlowRouteState>,
    Path(session_id): Path<String>,
    Json(body): Json<TurnBody>,
) -> Response {
    if body.user_id.trim().is_empty() || body.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "user_id and text are required");
    }

    let request = TurnRequest {
        session_id: session_id.clone(),
        user_id: body.user_id,
        text: body.text,
        metadata: body.metadata,
    };
    let coordinator = Arc::clone(&state.coordinator);
    let task = tokio::spawn(async move { coordinator.handle_turn(request).await });

    let result = match task.await {
        Ok(result) => result,
        Err(e) => Err(FlowError::TurnAborted {
            session_id,
            reason: e.to_string(),
        }),
    };

    match result {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Turn failed");
            flow_error_response(&e)
        }
    }
}

/// GET /api/sessions/{session_id}
///
/// Shared-context snapshot, or 404 if the session is not live.
async fn get_session(
    State(state): State<FlowRouteState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.coordinator.store().read_shared(&session_id).await {
        Ok(shared) => Json(shared).into_response(),
        Err(e) => flow_error_response(&e),
    }
}

/// POST /admin/sessions/reset
async fn reset_sessions(State(state): State<AdminRouteState>) -> impl IntoResponse {
    let cleared = state.store.reset_all().await;
    Json(json!({ "cleared": cleared }))
}

/// Build the end-user routes.
pub fn flow_routes(state: FlowRouteState) -> Router {
    Router::new()
        .route("/api/sessions/{session_id}", get(get_session))
        .route("/api/sessions/{session_id}/turns", post(post_turn))
        .with_state(state)
}

/// Build the administrative routes. Mount only when explicitly enabled.
pub fn admin_routes(state: AdminRouteState) -> Router {
    Router::new()
        .route("/admin/sessions/reset", post(reset_sessions))
        .with_state(state)
}
