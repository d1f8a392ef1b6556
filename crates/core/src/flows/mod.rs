pub mod engine;
pub mod states;

pub use engine::{DialogEngine, DialogTransitionError};
pub use states::{DialogAction, DialogEvent, DialogState, TransitionOutcome};
