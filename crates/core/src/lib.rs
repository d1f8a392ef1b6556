//! Domain core for the hrdesk conversational HR assistant.
//!
//! This crate holds everything that must stay deterministic while the
//! surrounding system talks to probabilistic services: the session and
//! pending-action data model, the dialog state machine that gates every
//! side-effecting call behind an explicit confirmation, the error taxonomy
//! every external failure is mapped into, configuration loading, and the
//! audit trail.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    TracingAuditSink,
};
pub use domain::action::{
    ActionKind, ActionPayload, ConfirmationStatus, LeaveApplicationDraft, LeaveCreditDraft,
    PendingAction,
};
pub use domain::leave::{
    LeaveBalance, LeaveCredit, LeaveRecord, LeaveRequest, LeaveStatus, LeaveType,
};
pub use domain::session::{
    ConversationSession, GuardrailVerdict, Intent, Principal, Role, SessionId, Turn, VerdictKind,
};
pub use errors::TurnError;
