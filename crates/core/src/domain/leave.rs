use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Leave categories recognized by the system of record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LeaveType {
    Casual,
    Privilege,
    Medical,
    Other,
}

impl LeaveType {
    /// Short code used on the wire and in user-facing summaries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Casual => "CL",
            Self::Privilege => "PL",
            Self::Medical => "ML",
            Self::Other => "OTHER",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Casual => "Casual Leave",
            Self::Privilege => "Privilege Leave",
            Self::Medical => "Medical Leave",
            Self::Other => "Other Leave",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "CL" => Some(Self::Casual),
            "PL" => Some(Self::Privilege),
            "ML" => Some(Self::Medical),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

/// A fully specified leave application, ready for dispatch.
///
/// `days` is derived from the date range (inclusive of both endpoints) and
/// is re-derived rather than trusted from any external input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: u32,
    pub reason: String,
}

impl LeaveRequest {
    /// One-line summary presented to the user before confirmation.
    pub fn summary(&self) -> String {
        format!(
            "{} ({}), {} day(s), {} to {}, reason: {}",
            self.leave_type.display_name(),
            self.leave_type.code(),
            self.days,
            self.start_date,
            self.end_date,
            self.reason
        )
    }
}

/// Admin-initiated balance credit for an employee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveCredit {
    pub employee_id: String,
    pub leave_type: LeaveType,
    pub days: u32,
}

impl LeaveCredit {
    pub fn summary(&self) -> String {
        format!(
            "credit {} day(s) of {} ({}) to employee {}",
            self.days,
            self.leave_type.display_name(),
            self.leave_type.code(),
            self.employee_id
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub leave_type: LeaveType,
    pub days: f32,
}

/// Per-type leave balances as reported by the system of record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaveBalance {
    pub entries: Vec<BalanceEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// One row of an employee's leave history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaveRecord {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub days: f32,
    pub status: LeaveStatus,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{LeaveRequest, LeaveType};

    #[test]
    fn leave_type_codes_round_trip() {
        for leave_type in
            [LeaveType::Casual, LeaveType::Privilege, LeaveType::Medical, LeaveType::Other]
        {
            assert_eq!(LeaveType::from_code(leave_type.code()), Some(leave_type));
        }
        assert_eq!(LeaveType::from_code(" cl "), Some(LeaveType::Casual));
        assert_eq!(LeaveType::from_code("sabbatical"), None);
    }

    #[test]
    fn request_summary_names_the_exact_payload() {
        let request = LeaveRequest {
            leave_type: LeaveType::Medical,
            start_date: NaiveDate::from_ymd_opt(2026, 9, 7).expect("valid date"),
            end_date: NaiveDate::from_ymd_opt(2026, 9, 9).expect("valid date"),
            days: 3,
            reason: "flu recovery".to_string(),
        };

        let summary = request.summary();
        assert!(summary.contains("Medical Leave (ML)"));
        assert!(summary.contains("3 day(s)"));
        assert!(summary.contains("2026-09-07 to 2026-09-09"));
        assert!(summary.contains("flu recovery"));
    }
}
