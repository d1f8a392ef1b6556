use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use hrdesk_agent::AgentRuntime;

#[derive(Clone)]
pub struct HealthState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub index: HealthCheck,
    pub checked_at: String,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { runtime })
}

/// Liveness plus a view of the policy index. An empty index is reported
/// but does not fail the check: the conversational surface still answers,
/// it just falls back for policy questions.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let index = state.runtime.index();
    let document_count = index.document_ids().len();
    let chunk_count = index.chunk_count();

    let index_check = if chunk_count == 0 {
        HealthCheck { status: "empty", detail: "no policy documents indexed yet".to_string() }
    } else {
        HealthCheck {
            status: "ready",
            detail: format!("{document_count} document(s), {chunk_count} chunk(s) indexed"),
        }
    };

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "hrdesk-server runtime initialized".to_string(),
        },
        index: index_check,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
