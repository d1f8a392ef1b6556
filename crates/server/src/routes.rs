//! Conversation and document administration endpoints.
//!
//! JSON API:
//! - `POST   /api/v1/turn`                    — run one conversational turn
//! - `DELETE /api/v1/sessions/{session_id}`   — end a session, dropping its state
//! - `POST   /api/v1/documents`               — ingest or re-ingest a policy document (admin)
//! - `DELETE /api/v1/documents/{document_id}` — remove a document from the index (admin)

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::info;

use hrdesk_agent::{AgentRuntime, TurnReply};
use hrdesk_core::domain::session::{Principal, Role, SessionId};
use hrdesk_rag::{DocumentMetadata, SourceDocument};

#[derive(Clone)]
pub struct ApiState {
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Deserialize)]
pub struct PrincipalPayload {
    pub employee_id: String,
    pub name: String,
    pub role: Role,
    pub token: String,
}

impl PrincipalPayload {
    fn into_principal(self) -> Principal {
        Principal {
            employee_id: self.employee_id,
            display_name: self.name,
            role: self.role,
            token: SecretString::from(self.token),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub session_id: String,
    pub principal: PrincipalPayload,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub principal: PrincipalPayload,
    pub document_id: String,
    pub policy_id: String,
    pub version: u32,
    pub effective_date: NaiveDate,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub document_id: String,
    pub chunk_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub principal: PrincipalPayload,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub document_id: String,
    pub removed_chunks: usize,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/api/v1/turn", post(handle_turn))
        .route("/api/v1/sessions/{session_id}", delete(end_session))
        .route("/api/v1/documents", post(ingest_document))
        .route("/api/v1/documents/{document_id}", delete(remove_document))
        .with_state(ApiState { runtime })
}

pub async fn handle_turn(
    State(state): State<ApiState>,
    Json(request): Json<TurnRequest>,
) -> Json<TurnReply> {
    let session_id = SessionId(request.session_id);
    let principal = request.principal.into_principal();
    let reply = state.runtime.handle_turn(&session_id, &principal, &request.message).await;
    Json(reply)
}

pub async fn end_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if state.runtime.end_session(&SessionId(session_id)) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn ingest_document(
    State(state): State<ApiState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, (StatusCode, Json<ApiError>)> {
    require_admin(&request.principal)?;

    let document_id = request.document_id.clone();
    let document = SourceDocument {
        document_id: request.document_id,
        text: request.text,
        metadata: DocumentMetadata {
            policy_id: request.policy_id,
            version: request.version,
            effective_date: request.effective_date,
        },
    };

    let chunk_count = state.runtime.index().ingest(document).await.map_err(|error| {
        (StatusCode::UNPROCESSABLE_ENTITY, Json(ApiError { error: error.to_string() }))
    })?;

    info!(
        event_name = "api.document_ingested",
        document_id = %document_id,
        chunk_count,
        "policy document ingested via api"
    );
    Ok(Json(IngestResponse { document_id, chunk_count }))
}

pub async fn remove_document(
    State(state): State<ApiState>,
    Path(document_id): Path<String>,
    Json(request): Json<RemoveRequest>,
) -> Result<Json<RemoveResponse>, (StatusCode, Json<ApiError>)> {
    require_admin(&request.principal)?;

    let removed_chunks = state.runtime.index().remove(&document_id);
    if removed_chunks == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError { error: format!("document `{document_id}` is not indexed") }),
        ));
    }
    Ok(Json(RemoveResponse { document_id, removed_chunks }))
}

fn require_admin(principal: &PrincipalPayload) -> Result<(), (StatusCode, Json<ApiError>)> {
    if principal.role == Role::Admin {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(ApiError { error: "document administration requires the admin role".to_string() }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;
    use chrono::NaiveDate;

    use hrdesk_core::config::AppConfig;
    use hrdesk_core::domain::session::Role;

    use super::{ingest_document, remove_document, ApiState, IngestRequest, PrincipalPayload, RemoveRequest};
    use crate::bootstrap::bootstrap_with_config;

    fn principal(role: Role) -> PrincipalPayload {
        PrincipalPayload {
            employee_id: "E-1".to_string(),
            name: "Asha".to_string(),
            role,
            token: "token".to_string(),
        }
    }

    #[tokio::test]
    async fn non_admin_cannot_ingest_documents() {
        let app = bootstrap_with_config(AppConfig::default());
        let state = ApiState { runtime: app.runtime };

        let result = ingest_document(
            State(state),
            Json(IngestRequest {
                principal: principal(Role::Employee),
                document_id: "leave.md".to_string(),
                policy_id: "leave-policy".to_string(),
                version: 1,
                effective_date: NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date"),
                text: "Casual leave accrues monthly.".to_string(),
            }),
        )
        .await;

        let (status, _) = result.expect_err("employee role must be rejected");
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn removing_an_unknown_document_is_not_found() {
        let app = bootstrap_with_config(AppConfig::default());
        let state = ApiState { runtime: app.runtime };

        let result = remove_document(
            State(state),
            Path("missing.md".to_string()),
            Json(RemoveRequest { principal: principal(Role::Admin) }),
        )
        .await;

        let (status, _) = result.expect_err("unknown document must be rejected");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
