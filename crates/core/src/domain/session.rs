use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::action::PendingAction;
use crate::flows::states::DialogState;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    Admin,
}

/// The authenticated caller of a turn. Authentication itself happens
/// upstream; the core only consumes the result.
#[derive(Clone, Debug)]
pub struct Principal {
    pub employee_id: String,
    pub display_name: String,
    pub role: Role,
    pub token: SecretString,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Closed set of intents the classifier may produce. Adding a variant is a
/// compile-time-checked extension of every match over this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    PolicyQuestion,
    LeaveBalance,
    LeaveHistory,
    LeaveApply,
    LeaveCredit,
    SmallTalk,
    Unknown,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PolicyQuestion => "policy_question",
            Self::LeaveBalance => "leave_balance",
            Self::LeaveHistory => "leave_history",
            Self::LeaveApply => "leave_apply",
            Self::LeaveCredit => "leave_credit",
            Self::SmallTalk => "small_talk",
            Self::Unknown => "unknown",
        }
    }

    /// Map a model-produced label back into the closed set. Anything
    /// unrecognized is `None`; callers fall back to `Unknown` explicitly.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "policy_question" => Some(Self::PolicyQuestion),
            "leave_balance" => Some(Self::LeaveBalance),
            "leave_history" => Some(Self::LeaveHistory),
            "leave_apply" => Some(Self::LeaveApply),
            "leave_credit" => Some(Self::LeaveCredit),
            "small_talk" => Some(Self::SmallTalk),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Mutating intents require explicit confirmation before dispatch.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::LeaveApply | Self::LeaveCredit)
    }

    pub fn requires_admin(&self) -> bool {
        matches!(self, Self::LeaveCredit)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictKind {
    Allow,
    Sanitize,
    Block,
}

/// Outcome of running a message through the guardrail gate. `text` is the
/// message that proceeds (sanitized when applicable); for a block it is the
/// user-facing violation notice instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailVerdict {
    pub kind: VerdictKind,
    pub text: String,
    pub reason: Option<String>,
}

impl GuardrailVerdict {
    pub fn allow(text: impl Into<String>) -> Self {
        Self { kind: VerdictKind::Allow, text: text.into(), reason: None }
    }

    pub fn sanitize(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { kind: VerdictKind::Sanitize, text: text.into(), reason: Some(reason.into()) }
    }

    pub fn block(notice: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { kind: VerdictKind::Block, text: notice.into(), reason: Some(reason.into()) }
    }

    pub fn is_block(&self) -> bool {
        self.kind == VerdictKind::Block
    }
}

/// One completed exchange. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: String,
    pub user_text: String,
    pub assistant_text: String,
    pub intent: Intent,
    pub retrieved_chunk_ids: Vec<String>,
    pub input_verdict: VerdictKind,
    pub output_verdict: VerdictKind,
    pub recorded_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
        intent: Intent,
        retrieved_chunk_ids: Vec<String>,
        input_verdict: VerdictKind,
        output_verdict: VerdictKind,
    ) -> Self {
        Self {
            turn_id: Uuid::new_v4().to_string(),
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
            intent,
            retrieved_chunk_ids,
            input_verdict,
            output_verdict,
            recorded_at: Utc::now(),
        }
    }
}

/// Per-session conversational state. Lives only in memory; cleared on
/// logout or reset, and lost on restart by design.
#[derive(Clone, Debug)]
pub struct ConversationSession {
    pub session_id: SessionId,
    pub principal: Principal,
    pub turns: Vec<Turn>,
    pub pending_action: Option<PendingAction>,
    pub dialog_state: DialogState,
}

impl ConversationSession {
    pub fn new(session_id: SessionId, principal: Principal) -> Self {
        Self {
            session_id,
            principal,
            turns: Vec::new(),
            pending_action: None,
            dialog_state: DialogState::Idle,
        }
    }

    pub fn record_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Bounded context window handed to the classifier and slot extractor.
    pub fn recent_turns(&self, window: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    /// Drop all conversational state, returning the session to a blank
    /// idle state (logout / explicit reset).
    pub fn reset(&mut self) {
        self.turns.clear();
        self.pending_action = None;
        self.dialog_state = DialogState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationSession, Intent, Principal, Role, SessionId, Turn, VerdictKind};

    fn employee() -> Principal {
        Principal {
            employee_id: "E-1001".to_string(),
            display_name: "Asha".to_string(),
            role: Role::Employee,
            token: String::from("token-1001").into(),
        }
    }

    fn turn(text: &str) -> Turn {
        Turn::new(text, "reply", Intent::SmallTalk, Vec::new(), VerdictKind::Allow, VerdictKind::Allow)
    }

    #[test]
    fn every_label_round_trips_through_the_closed_set() {
        for intent in [
            Intent::PolicyQuestion,
            Intent::LeaveBalance,
            Intent::LeaveHistory,
            Intent::LeaveApply,
            Intent::LeaveCredit,
            Intent::SmallTalk,
            Intent::Unknown,
        ] {
            assert_eq!(Intent::from_label(intent.label()), Some(intent));
        }
        assert_eq!(Intent::from_label("escalate_to_human"), None);
    }

    #[test]
    fn only_mutating_intents_require_confirmation() {
        assert!(Intent::LeaveApply.is_mutating());
        assert!(Intent::LeaveCredit.is_mutating());
        assert!(!Intent::PolicyQuestion.is_mutating());
        assert!(!Intent::LeaveBalance.is_mutating());
        assert!(!Intent::LeaveHistory.is_mutating());
    }

    #[test]
    fn recent_turns_is_a_bounded_window() {
        let mut session = ConversationSession::new(SessionId("s-1".to_string()), employee());
        for index in 0..8 {
            session.record_turn(turn(&format!("message {index}")));
        }

        let window = session.recent_turns(5);
        assert_eq!(window.len(), 5);
        assert_eq!(window[0].user_text, "message 3");

        assert_eq!(session.recent_turns(50).len(), 8);
    }

    #[test]
    fn reset_clears_all_conversational_state() {
        let mut session = ConversationSession::new(SessionId("s-2".to_string()), employee());
        session.record_turn(turn("hello"));
        session.reset();

        assert!(session.turns.is_empty());
        assert!(session.pending_action.is_none());
    }
}
