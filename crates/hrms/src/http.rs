use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use hrdesk_core::domain::leave::{
    BalanceEntry, LeaveBalance, LeaveCredit, LeaveRecord, LeaveRequest, LeaveStatus, LeaveType,
};
use hrdesk_core::domain::session::Principal;

use crate::service::{LeaveApplicationReceipt, LeaveService, LeaveServiceError};

/// HTTP client for the leave management service.
///
/// Every response arrives in a `{success, data, error_message}` envelope.
/// `success: false` with an HTTP 200 still means the request was rejected;
/// the envelope is the source of truth.
pub struct HttpLeaveService {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceRow {
    leave_type: String,
    days: f32,
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    leave_type: String,
    start_date: NaiveDate,
    days: f32,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ApplicationRow {
    application_id: String,
    status: String,
}

impl HttpLeaveService {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self { http, base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        principal: &Principal,
    ) -> Result<T, LeaveServiceError> {
        let response = request
            .bearer_auth(principal.token.expose_secret())
            .send()
            .await
            .map_err(|error| LeaveServiceError::ServiceUnavailable { message: error.to_string() })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LeaveServiceError::Unauthorized { message: format!("status {status}") });
        }
        if status.is_server_error() {
            return Err(LeaveServiceError::ServiceUnavailable {
                message: format!("status {status}"),
            });
        }

        let envelope: Envelope<T> = response.json().await.map_err(|error| {
            LeaveServiceError::ServiceUnavailable { message: format!("malformed response: {error}") }
        })?;

        if !envelope.success {
            return Err(LeaveServiceError::ValidationFailed {
                message: envelope
                    .error_message
                    .unwrap_or_else(|| "request rejected".to_string()),
            });
        }
        envelope.data.ok_or_else(|| LeaveServiceError::ServiceUnavailable {
            message: "successful response missing data".to_string(),
        })
    }
}

fn parse_leave_type(code: &str) -> LeaveType {
    // unknown categories from the system of record land in the Other bucket
    LeaveType::from_code(code).unwrap_or(LeaveType::Other)
}

fn parse_status(status: &str) -> Result<LeaveStatus, LeaveServiceError> {
    match status.trim().to_ascii_uppercase().as_str() {
        "PENDING" => Ok(LeaveStatus::Pending),
        "APPROVED" => Ok(LeaveStatus::Approved),
        "REJECTED" => Ok(LeaveStatus::Rejected),
        "CANCELLED" => Ok(LeaveStatus::Cancelled),
        other => Err(LeaveServiceError::ServiceUnavailable {
            message: format!("unknown leave status `{other}`"),
        }),
    }
}

#[async_trait]
impl LeaveService for HttpLeaveService {
    #[instrument(skip(self, principal), fields(employee_id = %principal.employee_id))]
    async fn get_balance(&self, principal: &Principal) -> Result<LeaveBalance, LeaveServiceError> {
        let url =
            format!("{}/employees/{}/leave-balance", self.base_url, principal.employee_id);
        let rows: Vec<BalanceRow> = self.execute(self.http.get(&url), principal).await?;

        let entries = rows
            .into_iter()
            .map(|row| BalanceEntry { leave_type: parse_leave_type(&row.leave_type), days: row.days })
            .collect();
        Ok(LeaveBalance { entries })
    }

    #[instrument(skip(self, principal), fields(employee_id = %principal.employee_id))]
    async fn get_history(
        &self,
        principal: &Principal,
    ) -> Result<Vec<LeaveRecord>, LeaveServiceError> {
        let url =
            format!("{}/employees/{}/leave-history", self.base_url, principal.employee_id);
        let rows: Vec<HistoryRow> = self.execute(self.http.get(&url), principal).await?;

        rows.into_iter()
            .map(|row| {
                Ok(LeaveRecord {
                    leave_type: parse_leave_type(&row.leave_type),
                    start_date: row.start_date,
                    days: row.days,
                    status: parse_status(&row.status)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, principal, request), fields(employee_id = %principal.employee_id))]
    async fn apply_leave(
        &self,
        principal: &Principal,
        request: &LeaveRequest,
    ) -> Result<LeaveApplicationReceipt, LeaveServiceError> {
        let url = format!("{}/leave-applications", self.base_url);
        let body = serde_json::json!({
            "employee_id": principal.employee_id,
            "leave_type": request.leave_type.code(),
            "start_date": request.start_date,
            "end_date": request.end_date,
            "days": request.days,
            "reason": request.reason,
        });

        let row: ApplicationRow =
            self.execute(self.http.post(&url).json(&body), principal).await?;
        debug!(
            event_name = "hrms.leave_applied",
            application_id = %row.application_id,
            "leave application accepted"
        );
        Ok(LeaveApplicationReceipt { application_id: row.application_id, status_text: row.status })
    }

    #[instrument(skip(self, principal, credit), fields(employee_id = %principal.employee_id))]
    async fn credit_leave(
        &self,
        principal: &Principal,
        credit: &LeaveCredit,
    ) -> Result<(), LeaveServiceError> {
        let url = format!("{}/leave-credits", self.base_url);
        let body = serde_json::json!({
            "employee_id": credit.employee_id,
            "leave_type": credit.leave_type.code(),
            "days": credit.days,
        });

        let _: serde_json::Value = self.execute(self.http.post(&url).json(&body), principal).await?;
        Ok(())
    }
}
