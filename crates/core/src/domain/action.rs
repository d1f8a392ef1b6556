use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::leave::{LeaveCredit, LeaveRequest, LeaveType};
use crate::errors::TurnError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    ApplyLeave,
    CreditLeave,
}

impl ActionKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ApplyLeave => "leave application",
            Self::CreditLeave => "leave credit",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    Awaiting,
    Confirmed,
    Rejected,
    Expired,
}

/// Partially filled leave application, accumulated across turns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveApplicationDraft {
    pub leave_type: Option<LeaveType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub reason: Option<String>,
}

impl LeaveApplicationDraft {
    /// Fold newly extracted values into the draft. Extraction runs over the
    /// whole recent window, so a fresh `Some` always wins; `None` never
    /// erases a previously supplied slot.
    pub fn merge(&mut self, update: LeaveApplicationDraft) {
        if update.leave_type.is_some() {
            self.leave_type = update.leave_type;
        }
        if update.start_date.is_some() {
            self.start_date = update.start_date;
        }
        if update.end_date.is_some() {
            self.end_date = update.end_date;
        }
        if update.reason.is_some() {
            self.reason = update.reason;
        }
    }

    pub fn missing_slots(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.leave_type.is_none() {
            missing.push("leave type (CL, PL, ML, OTHER)");
        }
        if self.start_date.is_none() {
            missing.push("start date (YYYY-MM-DD)");
        }
        if self.end_date.is_none() {
            missing.push("end date (YYYY-MM-DD)");
        }
        if self.reason.is_none() {
            missing.push("reason for your leave");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_slots().is_empty()
    }

    /// Finalize the draft into a dispatchable request. The day count is
    /// derived here; an inverted date range is a validation failure, not a
    /// confirmation candidate.
    pub fn into_request(self) -> Result<LeaveRequest, TurnError> {
        let (Some(leave_type), Some(start_date), Some(end_date), Some(reason)) =
            (self.leave_type, self.start_date, self.end_date, self.reason)
        else {
            return Err(TurnError::ValidationFailed {
                message: "leave application is missing required fields".to_string(),
            });
        };

        let span_days = (end_date - start_date).num_days() + 1;
        if span_days <= 0 {
            return Err(TurnError::ValidationFailed {
                message: "the end date must not be before the start date".to_string(),
            });
        }

        Ok(LeaveRequest { leave_type, start_date, end_date, days: span_days as u32, reason })
    }
}

/// Partially filled admin leave credit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveCreditDraft {
    pub employee_id: Option<String>,
    pub leave_type: Option<LeaveType>,
    pub days: Option<u32>,
}

impl LeaveCreditDraft {
    pub fn merge(&mut self, update: LeaveCreditDraft) {
        if update.employee_id.is_some() {
            self.employee_id = update.employee_id;
        }
        if update.leave_type.is_some() {
            self.leave_type = update.leave_type;
        }
        if update.days.is_some() {
            self.days = update.days;
        }
    }

    pub fn missing_slots(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.employee_id.is_none() {
            missing.push("employee id");
        }
        if self.leave_type.is_none() {
            missing.push("leave type (CL, PL, ML, OTHER)");
        }
        if self.days.is_none() {
            missing.push("number of days to credit");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_slots().is_empty()
    }

    pub fn into_credit(self) -> Result<LeaveCredit, TurnError> {
        let (Some(employee_id), Some(leave_type), Some(days)) =
            (self.employee_id, self.leave_type, self.days)
        else {
            return Err(TurnError::ValidationFailed {
                message: "leave credit is missing required fields".to_string(),
            });
        };
        if days == 0 {
            return Err(TurnError::ValidationFailed {
                message: "the number of days to credit must be at least 1".to_string(),
            });
        }
        Ok(LeaveCredit { employee_id, leave_type, days })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPayload {
    ApplyLeave(LeaveApplicationDraft),
    CreditLeave(LeaveCreditDraft),
}

impl ActionPayload {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::ApplyLeave(_) => ActionKind::ApplyLeave,
            Self::CreditLeave(_) => ActionKind::CreditLeave,
        }
    }

    pub fn missing_slots(&self) -> Vec<&'static str> {
        match self {
            Self::ApplyLeave(draft) => draft.missing_slots(),
            Self::CreditLeave(draft) => draft.missing_slots(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing_slots().is_empty()
    }
}

/// A mutating action parsed from conversation but not yet dispatched.
///
/// Invariant: a session holds at most one of these at a time. The summary
/// recorded at presentation time is the exact payload the user confirms;
/// the payload is frozen once `presented_summary` is set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub payload: ActionPayload,
    pub status: ConfirmationStatus,
    pub presented_summary: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PendingAction {
    pub fn new(payload: ActionPayload) -> Self {
        Self { payload, status: ConfirmationStatus::Awaiting, presented_summary: None, expires_at: None }
    }

    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }

    /// Mark the action as presented for confirmation with a deadline.
    pub fn present(&mut self, summary: String, expires_at: DateTime<Utc>) {
        self.presented_summary = Some(summary);
        self.expires_at = Some(expires_at);
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.status == ConfirmationStatus::Awaiting && self.presented_summary.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(deadline) if now > deadline)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};

    use super::{ActionPayload, LeaveApplicationDraft, LeaveCreditDraft, PendingAction};
    use crate::domain::leave::LeaveType;
    use crate::errors::TurnError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn merge_fills_missing_slots_without_erasing_existing_ones() {
        let mut draft = LeaveApplicationDraft {
            leave_type: Some(LeaveType::Casual),
            start_date: Some(date(2026, 12, 10)),
            ..LeaveApplicationDraft::default()
        };

        draft.merge(LeaveApplicationDraft {
            end_date: Some(date(2026, 12, 12)),
            reason: Some("family function".to_string()),
            ..LeaveApplicationDraft::default()
        });

        assert!(draft.is_complete());
        assert_eq!(draft.leave_type, Some(LeaveType::Casual));
        assert_eq!(draft.start_date, Some(date(2026, 12, 10)));
    }

    #[test]
    fn incomplete_draft_names_each_missing_slot() {
        let draft = LeaveApplicationDraft::default();
        let missing = draft.missing_slots();
        assert_eq!(missing.len(), 4);
        assert!(missing.iter().any(|slot| slot.contains("leave type")));
        assert!(missing.iter().any(|slot| slot.contains("start date")));
    }

    #[test]
    fn day_count_is_inclusive_of_both_endpoints() {
        let draft = LeaveApplicationDraft {
            leave_type: Some(LeaveType::Casual),
            start_date: Some(date(2026, 12, 10)),
            end_date: Some(date(2026, 12, 12)),
            reason: Some("family function".to_string()),
        };

        let request = draft.into_request().expect("complete draft");
        assert_eq!(request.days, 3);
    }

    #[test]
    fn inverted_date_range_is_a_validation_failure() {
        let draft = LeaveApplicationDraft {
            leave_type: Some(LeaveType::Casual),
            start_date: Some(date(2026, 12, 12)),
            end_date: Some(date(2026, 12, 10)),
            reason: Some("family function".to_string()),
        };

        let error = draft.into_request().expect_err("inverted range must fail");
        assert!(matches!(error, TurnError::ValidationFailed { .. }));
    }

    #[test]
    fn zero_day_credit_is_rejected() {
        let draft = LeaveCreditDraft {
            employee_id: Some("E-1042".to_string()),
            leave_type: Some(LeaveType::Privilege),
            days: Some(0),
        };
        assert!(matches!(
            draft.into_credit(),
            Err(TurnError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn pending_action_expiry_is_checked_against_the_presented_deadline() {
        let mut pending = PendingAction::new(ActionPayload::ApplyLeave(LeaveApplicationDraft::default()));
        assert!(!pending.is_expired(Utc::now()));

        let now = Utc::now();
        pending.present("summary".to_string(), now - Duration::seconds(1));
        assert!(pending.is_awaiting_confirmation());
        assert!(pending.is_expired(now));
    }
}
