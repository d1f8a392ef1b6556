//! Conversational orchestration for the HR assistant.
//!
//! A turn flows through the guardrail gate, confirmation resolution, intent
//! classification, and one of the handlers (retrieval-grounded policy
//! answers, read-only leave lookups, or the confirmation-gated mutating
//! flows) before the reply is screened on the way out.

pub mod classifier;
pub mod guardrails;
pub mod llm;
pub mod runtime;
pub mod sessions;
pub mod slots;

pub use classifier::{resolve_confirmation, IntentClassifier};
pub use guardrails::GuardrailGate;
pub use llm::{HttpLlmClient, LlmClient, LlmError};
pub use runtime::{AgentRuntime, TurnReply};
pub use sessions::SessionRegistry;
