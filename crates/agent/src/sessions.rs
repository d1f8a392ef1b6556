use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use hrdesk_core::domain::session::{ConversationSession, Principal, SessionId};

/// Owns every live conversation. Each session sits behind its own async
/// mutex, so turns for one session are strictly sequential while distinct
/// sessions proceed concurrently.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<ConversationSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session for `session_id`, creating it on first use.
    pub fn session(
        &self,
        session_id: &SessionId,
        principal: &Principal,
    ) -> Arc<tokio::sync::Mutex<ConversationSession>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                debug!(
                    event_name = "sessions.created",
                    session_id = session_id.as_str(),
                    "conversation session created"
                );
                Arc::new(tokio::sync::Mutex::new(ConversationSession::new(
                    session_id.clone(),
                    principal.clone(),
                )))
            })
            .clone()
    }

    /// Drop a session and everything it accumulated, including any pending
    /// action. Returns whether a session existed.
    pub fn end_session(&self, session_id: &SessionId) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.remove(session_id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}
