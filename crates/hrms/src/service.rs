use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use hrdesk_core::domain::leave::{LeaveBalance, LeaveCredit, LeaveRecord, LeaveRequest};
use hrdesk_core::domain::session::Principal;
use hrdesk_core::errors::TurnError;

/// Failures the leave service can report. The caller maps these onto the
/// turn-level error set; no other error shape crosses this boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LeaveServiceError {
    #[error("leave service rejected the credentials: {message}")]
    Unauthorized { message: String },
    #[error("leave service rejected the request: {message}")]
    ValidationFailed { message: String },
    #[error("leave service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

impl From<LeaveServiceError> for TurnError {
    fn from(error: LeaveServiceError) -> Self {
        match error {
            LeaveServiceError::Unauthorized { .. } => {
                TurnError::Unauthorized { action: "leave operation".to_string() }
            }
            LeaveServiceError::ValidationFailed { message } => {
                TurnError::ValidationFailed { message }
            }
            LeaveServiceError::ServiceUnavailable { .. } => {
                TurnError::ServiceUnavailable { service: "leave-service".to_string() }
            }
        }
    }
}

/// Acknowledgement returned by the system of record for a submitted
/// application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveApplicationReceipt {
    pub application_id: String,
    pub status_text: String,
}

/// The system of record for leave. One implementation speaks HTTP; tests
/// pin stubs.
#[async_trait]
pub trait LeaveService: Send + Sync {
    async fn get_balance(&self, principal: &Principal) -> Result<LeaveBalance, LeaveServiceError>;

    async fn get_history(
        &self,
        principal: &Principal,
    ) -> Result<Vec<LeaveRecord>, LeaveServiceError>;

    async fn apply_leave(
        &self,
        principal: &Principal,
        request: &LeaveRequest,
    ) -> Result<LeaveApplicationReceipt, LeaveServiceError>;

    async fn credit_leave(
        &self,
        principal: &Principal,
        credit: &LeaveCredit,
    ) -> Result<(), LeaveServiceError>;
}

/// Run an operation, retrying exactly once if the first attempt failed
/// with `ServiceUnavailable`. Authorization and validation failures are
/// never retried.
pub async fn with_retry<T, F, Fut>(operation: F) -> Result<T, LeaveServiceError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LeaveServiceError>>,
{
    match operation().await {
        Err(LeaveServiceError::ServiceUnavailable { message }) => {
            warn!(
                event_name = "hrms.retry",
                error = %message,
                "leave service unavailable, retrying once"
            );
            operation().await
        }
        other => other,
    }
}
