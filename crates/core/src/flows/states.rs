use serde::{Deserialize, Serialize};

/// Where a session currently sits in the confirmation workflow.
///
/// Read-only intents never leave `Idle`; only mutating actions walk the
/// slot-filling and confirmation states, and `Dispatching` is entered
/// exclusively on an explicit affirmative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogState {
    Idle,
    AwaitingSlots,
    AwaitingConfirmation,
    Dispatching,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogEvent {
    /// A mutating intent was detected in the user's message.
    ActionDetected { slots_complete: bool },
    /// The user supplied slot values for the pending action.
    SlotsProvided { slots_complete: bool },
    /// Explicit affirmative on the presented payload.
    Affirmative,
    /// Explicit negative on the presented payload.
    Negative,
    /// The user moved to an unrelated intent.
    TopicChanged,
    /// The confirmation deadline passed before the user answered.
    ConfirmationExpired,
    DispatchSucceeded,
    DispatchFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogAction {
    PromptForMissingSlots,
    PresentConfirmation,
    DispatchPendingAction,
    DiscardPendingAction,
    AnnounceCancellation,
    SurfaceDispatchResult,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: DialogState,
    pub to: DialogState,
    pub event: DialogEvent,
    pub actions: Vec<DialogAction>,
}
