use std::sync::Arc;

use tracing::{debug, warn};

use hrdesk_core::domain::session::{Intent, Turn};

use crate::llm::LlmClient;

const CLASSIFIER_SYSTEM_PROMPT: &str = "You are an intent classifier for an HR assistant.\n\
Given the recent conversation and the user's LAST message, choose EXACTLY one intent \
for the LAST message from:\n\
  - policy_question\n\
  - leave_balance\n\
  - leave_history\n\
  - leave_apply\n\
  - leave_credit\n\
  - small_talk\n\n\
If the user is clearly talking about applying for leave, dates, or asking to \
submit leave, choose 'leave_apply'.\n\
Choose 'leave_credit' only when the user wants to ADD leave days to an \
employee's balance.\n\n\
Return ONLY the intent label, nothing else.";

/// Affirmatives and negatives recognized as confirmation replies. Matching
/// is exact after normalization; "yes please cancel it" is deliberately not
/// a match and falls through to classification.
const AFFIRMATIVES: &[&str] = &[
    "yes", "y", "yeah", "yep", "ok", "okay", "sure", "confirm", "confirmed", "go ahead",
    "approve", "do it",
];
const NEGATIVES: &[&str] = &["no", "n", "nope", "cancel", "stop", "reject", "dont", "do not"];

/// Interpret a message as a confirmation reply: `Some(true)` for an
/// affirmative, `Some(false)` for a negative, `None` when it is neither.
pub fn resolve_confirmation(message: &str) -> Option<bool> {
    let normalized: String = message
        .trim()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect::<String>()
        .to_lowercase();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    if AFFIRMATIVES.contains(&normalized.as_str()) {
        Some(true)
    } else if NEGATIVES.contains(&normalized.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Maps a user message onto the closed intent set via the language model.
/// Anything the model returns outside the set, and any model failure,
/// resolves to `Intent::Unknown`.
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Classify the user's latest message, with a bounded window of recent
    /// turns as context for carry-over utterances.
    pub async fn classify(&self, message: &str, recent: &[Turn]) -> Intent {
        let user_prompt = compose_classifier_prompt(message, recent);
        let raw = match self.llm.complete(CLASSIFIER_SYSTEM_PROMPT, &user_prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "classifier.llm_failed",
                    error = %error,
                    "intent classification failed, treating as unknown"
                );
                return Intent::Unknown;
            }
        };

        let intent = Intent::from_label(&raw).unwrap_or(Intent::Unknown);
        debug!(
            event_name = "classifier.resolved",
            label = intent.label(),
            "intent classified"
        );
        intent
    }
}

fn compose_classifier_prompt(message: &str, recent: &[Turn]) -> String {
    if recent.is_empty() {
        return format!("Last message: {message}");
    }
    let mut context = String::from("Recent conversation:\n");
    for turn in recent {
        context.push_str(&format!("user: {}\nassistant: {}\n", turn.user_text, turn.assistant_text));
    }
    format!("{context}\nLast message: {message}")
}
