use thiserror::Error;

/// Every failure a turn can end in. External-service errors are mapped
/// into one of these before a reply is composed; raw error text from any
/// collaborator never reaches the user.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("message blocked by guardrails: {reason}")]
    GuardrailBlocked { reason: String, notice: String },
    #[error("not authorized to perform {action}")]
    Unauthorized { action: String },
    #[error("validation failed: {message}")]
    ValidationFailed { message: String },
    #[error("{service} is unavailable")]
    ServiceUnavailable { service: String },
    #[error("could not determine what the user wants")]
    ClassificationAmbiguous,
}

impl TurnError {
    /// The reply text shown to the user for this failure. `ValidationFailed`
    /// and `GuardrailBlocked` carry corrective detail; everything else maps
    /// to a fixed user-safe message.
    pub fn user_message(&self) -> String {
        match self {
            Self::GuardrailBlocked { notice, .. } => notice.clone(),
            Self::Unauthorized { action } => {
                format!("You don't have permission to perform a {action}. Please contact HR if you believe this is a mistake.")
            }
            Self::ValidationFailed { message } => {
                format!("I couldn't proceed with that: {message}. Please adjust and try again.")
            }
            Self::ServiceUnavailable { .. } => {
                "A backing service is temporarily unavailable. Please try again in a moment."
                    .to_string()
            }
            Self::ClassificationAmbiguous => {
                "I'm not sure what you're asking for. Could you rephrase that?".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TurnError;

    #[test]
    fn guardrail_block_surfaces_the_prepared_notice_verbatim() {
        let error = TurnError::GuardrailBlocked {
            reason: "restricted words".to_string(),
            notice: "Your message violates company communication policy.".to_string(),
        };
        assert_eq!(error.user_message(), "Your message violates company communication policy.");
    }

    #[test]
    fn validation_failures_carry_corrective_feedback() {
        let error = TurnError::ValidationFailed { message: "insufficient balance".to_string() };
        assert!(error.user_message().contains("insufficient balance"));
    }

    #[test]
    fn unavailable_services_are_never_named_to_the_user() {
        let error = TurnError::ServiceUnavailable { service: "leave-service".to_string() };
        assert!(!error.user_message().contains("leave-service"));
    }
}
