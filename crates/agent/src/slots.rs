use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use hrdesk_core::domain::action::{ActionKind, LeaveApplicationDraft, LeaveCreditDraft};
use hrdesk_core::domain::leave::LeaveType;

use crate::llm::LlmClient;

const APPLICATION_EXTRACTION_PROMPT: &str = "You are a parser that extracts structured leave \
application data from the conversation.\n\n\
You MUST respond with a SINGLE JSON object only, no explanation.\n\
JSON keys:\n\
  - leave_type: one of ['CL', 'PL', 'ML', 'OTHER'] or null\n\
  - start_date: date in 'YYYY-MM-DD' format or null\n\
  - end_date: date in 'YYYY-MM-DD' format or null\n\
  - reason: string or null\n\n\
CL = casual leave, PL = privilege leave, ML = medical leave.\n\
If you are not sure about a field, set it to null.";

const CREDIT_EXTRACTION_PROMPT: &str = "You are a parser that extracts structured leave credit \
data from the conversation.\n\n\
You MUST respond with a SINGLE JSON object only, no explanation.\n\
JSON keys:\n\
  - employee_id: string or null\n\
  - leave_type: one of ['CL', 'PL', 'ML', 'OTHER'] or null\n\
  - days: positive integer or null\n\n\
If you are not sure about a field, set it to null.";

#[derive(Debug, Default, Deserialize)]
struct RawApplicationSlots {
    leave_type: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCreditSlots {
    employee_id: Option<String>,
    leave_type: Option<String>,
    days: Option<i64>,
}

/// Extract leave application slots from the recent transcript. Extraction
/// never fails a turn: on any model or parse error the result is an empty
/// update and previously accumulated slots stay untouched.
pub async fn extract_application_slots(
    llm: &dyn LlmClient,
    transcript: &str,
) -> LeaveApplicationDraft {
    let user_prompt = format!(
        "Extract leave application fields from this conversation:\n\n{transcript}\n\n\
         Return ONLY the JSON object, nothing else."
    );
    let raw: RawApplicationSlots =
        extract_json(llm, APPLICATION_EXTRACTION_PROMPT, &user_prompt).await;

    LeaveApplicationDraft {
        leave_type: raw.leave_type.as_deref().and_then(LeaveType::from_code),
        start_date: raw.start_date.as_deref().and_then(parse_date),
        end_date: raw.end_date.as_deref().and_then(parse_date),
        reason: raw.reason.filter(|reason| !reason.trim().is_empty()),
    }
}

/// Extract admin leave-credit slots from the recent transcript.
pub async fn extract_credit_slots(llm: &dyn LlmClient, transcript: &str) -> LeaveCreditDraft {
    let user_prompt = format!(
        "Extract leave credit fields from this conversation:\n\n{transcript}\n\n\
         Return ONLY the JSON object, nothing else."
    );
    let raw: RawCreditSlots = extract_json(llm, CREDIT_EXTRACTION_PROMPT, &user_prompt).await;

    LeaveCreditDraft {
        employee_id: raw.employee_id.filter(|id| !id.trim().is_empty()),
        leave_type: raw.leave_type.as_deref().and_then(LeaveType::from_code),
        days: raw.days.and_then(|days| u32::try_from(days).ok()).filter(|days| *days > 0),
    }
}

async fn extract_json<T: Default + serde::de::DeserializeOwned>(
    llm: &dyn LlmClient,
    system: &str,
    user: &str,
) -> T {
    let raw = match llm.complete(system, user).await {
        Ok(raw) => raw,
        Err(error) => {
            warn!(
                event_name = "slots.llm_failed",
                error = %error,
                "slot extraction failed, keeping accumulated slots"
            );
            return T::default();
        }
    };

    match serde_json::from_str(strip_code_fences(&raw)) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(
                event_name = "slots.parse_failed",
                error = %error,
                "slot extraction returned invalid JSON"
            );
            T::default()
        }
    }
}

/// Models often wrap JSON in a Markdown code fence despite instructions.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Prompt asking the user for whatever slots are still missing.
pub fn missing_slots_prompt(kind: ActionKind, missing: &[&str]) -> String {
    let listed = missing.join("\n- ");
    let example = match kind {
        ActionKind::ApplyLeave => {
            "'Casual leave from 2026-12-10 to 2026-12-12 for a family function'"
        }
        ActionKind::CreditLeave => "'Credit 3 days of CL to employee E-1042'",
    };
    format!(
        "To submit your {}, I still need the following:\n- {listed}\n\n\
         Please provide the missing details in your next message. \
         You can give them together (for example: {example}).",
        kind.display_name()
    )
}
