use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{DialogAction, DialogEvent, DialogState, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DialogTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: DialogState, event: DialogEvent },
}

/// Closed transition table for the confirmation workflow. Every
/// (state, event) pair either maps to exactly one outcome or is rejected;
/// there is no silent fallthrough.
#[derive(Clone, Debug, Default)]
pub struct DialogEngine;

impl DialogEngine {
    pub fn initial_state(&self) -> DialogState {
        DialogState::Idle
    }

    pub fn apply(
        &self,
        current: DialogState,
        event: DialogEvent,
    ) -> Result<TransitionOutcome, DialogTransitionError> {
        transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: DialogState,
        event: DialogEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DialogTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.session_id.clone(),
                        audit.turn_id.clone(),
                        audit.correlation_id.clone(),
                        "dialog.transition_applied",
                        AuditCategory::Dialog,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.session_id.clone(),
                        audit.turn_id.clone(),
                        audit.correlation_id.clone(),
                        "dialog.transition_rejected",
                        AuditCategory::Dialog,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn transition(
    current: DialogState,
    event: DialogEvent,
) -> Result<TransitionOutcome, DialogTransitionError> {
    use DialogAction::{
        AnnounceCancellation, DiscardPendingAction, DispatchPendingAction, PresentConfirmation,
        PromptForMissingSlots, SurfaceDispatchResult,
    };
    use DialogEvent::{
        ActionDetected, Affirmative, ConfirmationExpired, DispatchFailed, DispatchSucceeded,
        Negative, SlotsProvided, TopicChanged,
    };
    use DialogState::{AwaitingConfirmation, AwaitingSlots, Dispatching, Idle};

    let (to, actions) = match (current, event) {
        (Idle, ActionDetected { slots_complete: false }) => {
            (AwaitingSlots, vec![PromptForMissingSlots])
        }
        (Idle, ActionDetected { slots_complete: true }) => {
            (AwaitingConfirmation, vec![PresentConfirmation])
        }

        // A new action while one is in flight replaces it, with notice.
        (AwaitingSlots | AwaitingConfirmation, ActionDetected { slots_complete: false }) => {
            (AwaitingSlots, vec![DiscardPendingAction, AnnounceCancellation, PromptForMissingSlots])
        }
        (AwaitingSlots | AwaitingConfirmation, ActionDetected { slots_complete: true }) => (
            AwaitingConfirmation,
            vec![DiscardPendingAction, AnnounceCancellation, PresentConfirmation],
        ),

        (AwaitingSlots, SlotsProvided { slots_complete: false }) => {
            (AwaitingSlots, vec![PromptForMissingSlots])
        }
        (AwaitingSlots, SlotsProvided { slots_complete: true }) => {
            (AwaitingConfirmation, vec![PresentConfirmation])
        }

        (AwaitingConfirmation, Affirmative) => (Dispatching, vec![DispatchPendingAction]),
        (AwaitingConfirmation, Negative) => (Idle, vec![DiscardPendingAction]),
        (AwaitingConfirmation, ConfirmationExpired) => {
            (Idle, vec![DiscardPendingAction, AnnounceCancellation])
        }

        (Dispatching, DispatchSucceeded | DispatchFailed) => (Idle, vec![SurfaceDispatchResult]),

        // Topic change from any state returns to Idle; a pending action is
        // discarded audibly, never dispatched silently.
        (Idle, TopicChanged) => (Idle, Vec::new()),
        (AwaitingSlots | AwaitingConfirmation, TopicChanged) => {
            (Idle, vec![DiscardPendingAction, AnnounceCancellation])
        }

        _ => return Err(DialogTransitionError::InvalidTransition { state: current, event }),
    };

    Ok(TransitionOutcome { from: current, to, event, actions })
}
