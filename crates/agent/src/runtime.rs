use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use hrdesk_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use hrdesk_core::config::AppConfig;
use hrdesk_core::domain::action::{ActionKind, ActionPayload, PendingAction};
use hrdesk_core::domain::leave::{LeaveBalance, LeaveRecord};
use hrdesk_core::domain::session::{
    ConversationSession, GuardrailVerdict, Intent, Principal, SessionId, Turn, VerdictKind,
};
use hrdesk_core::errors::TurnError;
use hrdesk_core::flows::engine::DialogEngine;
use hrdesk_core::flows::states::{DialogEvent, DialogState};
use hrdesk_rag::{compose_policy_prompt, sources_footer, GroundingPolicy, PolicyIndex, UNGROUNDED_REPLY};
use hrdesk_hrms::{with_retry, LeaveService};

use crate::classifier::{resolve_confirmation, IntentClassifier};
use crate::guardrails::GuardrailGate;
use crate::llm::LlmClient;
use crate::sessions::SessionRegistry;
use crate::slots::{extract_application_slots, extract_credit_slots, missing_slots_prompt};

const HELP_TEXT: &str = "I can help you with:\n\
- Questions about HR policies (leave, holidays, etc.)\n\
- Checking your leave balance\n\
- Viewing your recent leave applications\n\
- Applying for leave conversationally\n\n\
Please ask a policy-related question or something about your leave.";

const HISTORY_DISPLAY_LIMIT: usize = 5;

/// The assistant's answer for one turn, plus the hints the UI needs to
/// render a pending confirmation.
#[derive(Clone, Debug, Serialize)]
pub struct TurnReply {
    pub reply_text: String,
    pub awaiting_confirmation: bool,
    pub pending_summary: Option<String>,
}

/// Drives a full conversational turn: guardrails, confirmation handling,
/// intent routing, retrieval, dispatch, and session bookkeeping.
///
/// `handle_turn` is total: every failure inside the pipeline is folded
/// into reply text, so the caller always gets an answer to render.
pub struct AgentRuntime {
    guardrails: GuardrailGate,
    classifier: IntentClassifier,
    llm: Arc<dyn LlmClient>,
    index: Arc<PolicyIndex>,
    leave_service: Arc<dyn LeaveService>,
    sessions: SessionRegistry,
    engine: DialogEngine,
    audit: Arc<dyn AuditSink>,
    grounding: GroundingPolicy,
    recent_turn_window: usize,
    confirmation_ttl: Duration,
}

impl AgentRuntime {
    pub fn new(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        index: Arc<PolicyIndex>,
        leave_service: Arc<dyn LeaveService>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            guardrails: GuardrailGate::new(config.session.max_input_chars),
            classifier: IntentClassifier::new(llm.clone()),
            llm,
            index,
            leave_service,
            sessions: SessionRegistry::new(),
            engine: DialogEngine,
            audit,
            grounding: GroundingPolicy::new(
                config.retrieval.grounding_threshold,
                config.retrieval.top_k,
            ),
            recent_turn_window: config.session.recent_turn_window,
            confirmation_ttl: Duration::seconds(config.session.confirmation_ttl_secs as i64),
        }
    }

    /// End a session, discarding its history and any pending action.
    pub fn end_session(&self, session_id: &SessionId) -> bool {
        self.sessions.end_session(session_id)
    }

    pub fn index(&self) -> &Arc<PolicyIndex> {
        &self.index
    }

    #[instrument(skip_all, fields(session_id = session_id.as_str()))]
    pub async fn handle_turn(
        &self,
        session_id: &SessionId,
        principal: &Principal,
        message: &str,
    ) -> TurnReply {
        let correlation_id = Uuid::new_v4().to_string();
        let audit_ctx = AuditContext::new(
            Some(session_id.clone()),
            None,
            correlation_id.clone(),
            principal.employee_id.clone(),
        );

        let session = self.sessions.session(session_id, principal);
        let mut session = session.lock().await;

        // Input gate first. A blocked message never reaches the classifier
        // or the model.
        let input_verdict = self.guardrails.screen_input(message);
        if input_verdict.is_block() {
            self.emit_guardrail_event(&audit_ctx, "guardrail.input_blocked", &input_verdict);
            // the notice goes out verbatim; it quotes the flagged words on
            // purpose and must not be re-masked by the output gate
            return self.finish_blocked_turn(&mut session, message, input_verdict);
        }
        if input_verdict.kind == VerdictKind::Sanitize {
            self.emit_guardrail_event(&audit_ctx, "guardrail.input_sanitized", &input_verdict);
        }
        let text = input_verdict.text.clone();

        // A lapsed confirmation is cancelled before the message is read.
        let mut preamble = String::new();
        if session.dialog_state == DialogState::AwaitingConfirmation {
            let expired = session
                .pending_action
                .as_ref()
                .is_some_and(|pending| pending.is_expired(Utc::now()));
            if expired {
                let kind = session.pending_action.as_ref().map(PendingAction::kind);
                self.apply_transition(&mut session, DialogEvent::ConfirmationExpired, &audit_ctx);
                session.pending_action = None;
                preamble = format!(
                    "Your pending {} was not confirmed in time and has been cancelled.\n\n",
                    kind.map_or("action", |kind| kind.display_name())
                );
            }
        }

        // A bare yes/no while a confirmation is on the table resolves it
        // without consulting the classifier.
        if session.dialog_state == DialogState::AwaitingConfirmation {
            match resolve_confirmation(&text) {
                Some(true) => {
                    let kind = session.pending_action.as_ref().map(PendingAction::kind);
                    let reply = self.dispatch_confirmed(&mut session, principal, &audit_ctx).await;
                    return self.finish_turn(
                        &mut session,
                        message,
                        format!("{preamble}{reply}"),
                        intent_for_action(kind),
                        Vec::new(),
                        input_verdict.kind,
                    );
                }
                Some(false) => {
                    let kind = session.pending_action.as_ref().map(PendingAction::kind);
                    self.apply_transition(&mut session, DialogEvent::Negative, &audit_ctx);
                    session.pending_action = None;
                    let reply = format!(
                        "{preamble}Okay, I've cancelled the {}. Nothing was submitted.",
                        kind.map_or("action", |kind| kind.display_name())
                    );
                    return self.finish_turn(
                        &mut session,
                        message,
                        reply,
                        intent_for_action(kind),
                        Vec::new(),
                        input_verdict.kind,
                    );
                }
                None => {}
            }
        }

        let intent =
            self.classifier.classify(&text, session.recent_turns(self.recent_turn_window)).await;
        self.audit.emit(
            AuditEvent::new(
                audit_ctx.session_id.clone(),
                None,
                correlation_id.clone(),
                "classification.resolved",
                AuditCategory::Classification,
                audit_ctx.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("intent", intent.label()),
        );

        // An admin-only intent from a non-admin is answered with a refusal,
        // not misread as something else.
        if intent.requires_admin() && !principal.is_admin() {
            let turn_error = TurnError::Unauthorized {
                action: ActionKind::CreditLeave.display_name().to_string(),
            };
            self.audit.emit(AuditEvent::new(
                audit_ctx.session_id.clone(),
                None,
                correlation_id,
                "dispatch.unauthorized",
                AuditCategory::Dispatch,
                audit_ctx.actor.clone(),
                AuditOutcome::Rejected,
            ));
            return self.finish_turn(
                &mut session,
                message,
                format!("{preamble}{}", turn_error.user_message()),
                intent,
                Vec::new(),
                input_verdict.kind,
            );
        }

        // A pending action survives only messages that advance it. Anything
        // else is a topic change: discard audibly, then answer the message.
        let advances_pending = match session.dialog_state {
            DialogState::AwaitingSlots | DialogState::AwaitingConfirmation => {
                intent.is_mutating()
                    || matches!(intent, Intent::SmallTalk | Intent::Unknown)
                        && session.dialog_state == DialogState::AwaitingSlots
            }
            _ => false,
        };
        if matches!(
            session.dialog_state,
            DialogState::AwaitingSlots | DialogState::AwaitingConfirmation
        ) && !advances_pending
        {
            let kind = session.pending_action.as_ref().map(PendingAction::kind);
            self.apply_transition(&mut session, DialogEvent::TopicChanged, &audit_ctx);
            session.pending_action = None;
            preamble.push_str(&format!(
                "I've set aside the {} we were working on; nothing was submitted.\n\n",
                kind.map_or("action", |kind| kind.display_name())
            ));
        }

        // A small-talk or unclassifiable reply while slots are being
        // collected is treated as a slot answer, not a new topic.
        let continue_slot_filling = session.dialog_state == DialogState::AwaitingSlots
            && matches!(intent, Intent::SmallTalk | Intent::Unknown);

        let (reply, chunk_ids) = if intent.is_mutating() || continue_slot_filling {
            (self.advance_mutating_flow(&mut session, intent, &text, &audit_ctx).await, Vec::new())
        } else {
            match intent {
                Intent::PolicyQuestion => self.answer_policy_question(&text, &audit_ctx).await,
                Intent::LeaveBalance => (self.fetch_balance(principal).await, Vec::new()),
                Intent::LeaveHistory => (self.fetch_history(principal).await, Vec::new()),
                Intent::SmallTalk => (HELP_TEXT.to_string(), Vec::new()),
                Intent::Unknown => (
                    format!(
                        "{}\n\n{HELP_TEXT}",
                        TurnError::ClassificationAmbiguous.user_message()
                    ),
                    Vec::new(),
                ),
                Intent::LeaveApply | Intent::LeaveCredit => unreachable!("handled above"),
            }
        };

        self.finish_turn(
            &mut session,
            message,
            format!("{preamble}{reply}"),
            intent,
            chunk_ids,
            input_verdict.kind,
        )
    }

    /// Retrieval-grounded policy answer. Falls back to a fixed reply when
    /// nothing relevant is indexed; the model is never asked to answer
    /// from its own memory.
    async fn answer_policy_question(
        &self,
        question: &str,
        audit_ctx: &AuditContext,
    ) -> (String, Vec<String>) {
        let hits = match self.index.search(question, self.grounding.top_k).await {
            Ok(hits) => hits,
            Err(error) => {
                warn!(event_name = "retrieval.failed", error = %error, "policy search failed");
                return (
                    TurnError::ServiceUnavailable { service: "embedding-service".to_string() }
                        .user_message(),
                    Vec::new(),
                );
            }
        };

        self.audit.emit(
            AuditEvent::new(
                audit_ctx.session_id.clone(),
                None,
                audit_ctx.correlation_id.clone(),
                "retrieval.searched",
                AuditCategory::Retrieval,
                audit_ctx.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("hit_count", hits.len().to_string()),
        );

        if !self.grounding.is_grounded(&hits) {
            return (UNGROUNDED_REPLY.to_string(), Vec::new());
        }

        let bundle = compose_policy_prompt(question, &hits);
        let answer = match self.llm.complete(&bundle.system, &bundle.user).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(event_name = "answer.llm_failed", error = %error, "answer generation failed");
                return (
                    TurnError::ServiceUnavailable { service: "llm".to_string() }.user_message(),
                    Vec::new(),
                );
            }
        };

        let chunk_ids = hits.iter().map(|hit| hit.chunk.chunk_id.clone()).collect();
        (format!("{}{}", answer.trim(), sources_footer(&hits)), chunk_ids)
    }

    async fn fetch_balance(&self, principal: &Principal) -> String {
        match with_retry(|| self.leave_service.get_balance(principal)).await {
            Ok(balance) => format_balance(&balance),
            Err(error) => TurnError::from(error).user_message(),
        }
    }

    async fn fetch_history(&self, principal: &Principal) -> String {
        match with_retry(|| self.leave_service.get_history(principal)).await {
            Ok(records) => format_history(&records),
            Err(error) => TurnError::from(error).user_message(),
        }
    }

    /// Slot-filling step of a mutating flow. Extracted slots are merged
    /// into the pending draft; a complete, valid draft is presented for
    /// confirmation and frozen, never dispatched directly.
    async fn advance_mutating_flow(
        &self,
        session: &mut ConversationSession,
        intent: Intent,
        text: &str,
        audit_ctx: &AuditContext,
    ) -> String {
        let target_kind = match intent {
            Intent::LeaveCredit => ActionKind::CreditLeave,
            Intent::LeaveApply => ActionKind::ApplyLeave,
            // slot answer while collecting: continue the pending action
            _ => session.pending_action.as_ref().map_or(ActionKind::ApplyLeave, PendingAction::kind),
        };

        let transcript = build_transcript(session, self.recent_turn_window, text);
        let update = match target_kind {
            ActionKind::ApplyLeave => {
                ActionPayload::ApplyLeave(extract_application_slots(self.llm.as_ref(), &transcript).await)
            }
            ActionKind::CreditLeave => {
                ActionPayload::CreditLeave(extract_credit_slots(self.llm.as_ref(), &transcript).await)
            }
        };

        // Merge into a same-kind pending action; a different kind replaces
        // it, and the replacement is announced.
        let mut replaced: Option<ActionKind> = None;
        let payload = match session.pending_action.take() {
            Some(pending) if pending.kind() == target_kind => {
                merge_payload(pending.payload, update)
            }
            Some(pending) => {
                replaced = Some(pending.kind());
                update
            }
            None => update,
        };

        // Validate before deciding where the dialog goes: a complete draft
        // that fails validation is treated as still missing usable slots.
        let (payload, validation) = if payload.is_complete() {
            match summarize_payload(&payload) {
                Ok(summary) => (payload, Ok(summary)),
                Err(turn_error) => (clear_invalid_slots(payload), Err(Some(turn_error))),
            }
        } else {
            (payload, Err(None))
        };
        let slots_usable = validation.is_ok();

        let was_pending = session.dialog_state == DialogState::AwaitingSlots;
        let event = if was_pending && replaced.is_none() {
            DialogEvent::SlotsProvided { slots_complete: slots_usable }
        } else {
            DialogEvent::ActionDetected { slots_complete: slots_usable }
        };
        self.apply_transition(session, event, audit_ctx);

        let notice = replaced.map_or(String::new(), |kind| {
            format!("I've discarded the earlier {} we were working on.\n\n", kind.display_name())
        });

        match validation {
            Ok(summary) => {
                // Freeze the exact payload behind the summary the user will
                // confirm; dispatch happens only after an explicit yes.
                let mut pending = PendingAction::new(payload);
                pending.present(summary.clone(), Utc::now() + self.confirmation_ttl);
                session.pending_action = Some(pending);
                format!(
                    "{notice}Please confirm the following {}:\n\n> {summary}\n\n\
                     Reply 'yes' to submit or 'no' to cancel.",
                    target_kind.display_name()
                )
            }
            Err(turn_error) => {
                let reply = match turn_error {
                    Some(turn_error) => turn_error.user_message(),
                    None => missing_slots_prompt(target_kind, &payload.missing_slots()),
                };
                session.pending_action = Some(PendingAction::new(payload));
                format!("{notice}{reply}")
            }
        }
    }

    /// Dispatch the frozen pending action after an explicit affirmative.
    async fn dispatch_confirmed(
        &self,
        session: &mut ConversationSession,
        principal: &Principal,
        audit_ctx: &AuditContext,
    ) -> String {
        let Some(pending) = session.pending_action.take() else {
            session.dialog_state = DialogState::Idle;
            return "There's nothing awaiting confirmation right now.".to_string();
        };

        self.apply_transition(session, DialogEvent::Affirmative, audit_ctx);

        let kind = pending.kind();
        let result = match pending.payload {
            ActionPayload::ApplyLeave(draft) => match draft.into_request() {
                Ok(request) => {
                    with_retry(|| self.leave_service.apply_leave(principal, &request))
                        .await
                        .map(|receipt| {
                            format!(
                                "Your leave application has been submitted successfully.\n\n\
                                 - {}\n- Application id: {}\n- Status: **{}**",
                                request.summary(),
                                receipt.application_id,
                                receipt.status_text
                            )
                        })
                        .map_err(TurnError::from)
                }
                Err(turn_error) => Err(turn_error),
            },
            ActionPayload::CreditLeave(draft) => match draft.into_credit() {
                Ok(credit) => with_retry(|| self.leave_service.credit_leave(principal, &credit))
                    .await
                    .map(|()| format!("Done. I've applied the {}.", credit.summary()))
                    .map_err(TurnError::from),
                Err(turn_error) => Err(turn_error),
            },
        };

        let (event, outcome, reply) = match result {
            Ok(reply) => (DialogEvent::DispatchSucceeded, AuditOutcome::Success, reply),
            Err(turn_error) => (
                DialogEvent::DispatchFailed,
                AuditOutcome::Failed,
                format!(
                    "I tried to submit your {} but it failed.\n\n{}",
                    kind.display_name(),
                    turn_error.user_message()
                ),
            ),
        };
        self.apply_transition(session, event, audit_ctx);

        self.audit.emit(
            AuditEvent::new(
                audit_ctx.session_id.clone(),
                None,
                audit_ctx.correlation_id.clone(),
                "dispatch.completed",
                AuditCategory::Dispatch,
                audit_ctx.actor.clone(),
                outcome,
            )
            .with_metadata("action", format!("{kind:?}")),
        );
        reply
    }

    /// Apply a dialog transition, recovering to Idle if the event is not
    /// valid for the current state. Recovery discards any pending action
    /// rather than leaving the session wedged.
    fn apply_transition(
        &self,
        session: &mut ConversationSession,
        event: DialogEvent,
        audit_ctx: &AuditContext,
    ) {
        match self.engine.apply_with_audit(
            session.dialog_state,
            event,
            self.audit.as_ref(),
            audit_ctx,
        ) {
            Ok(outcome) => session.dialog_state = outcome.to,
            Err(transition_error) => {
                error!(
                    event_name = "dialog.recovered",
                    error = %transition_error,
                    "invalid dialog transition, resetting to idle"
                );
                session.dialog_state = DialogState::Idle;
                session.pending_action = None;
            }
        }
    }

    /// Exit path for a blocked input: the violation notice is the reply
    /// and skips the output gate.
    fn finish_blocked_turn(
        &self,
        session: &mut ConversationSession,
        user_text: &str,
        verdict: GuardrailVerdict,
    ) -> TurnReply {
        session.record_turn(Turn::new(
            user_text,
            verdict.text.clone(),
            Intent::Unknown,
            Vec::new(),
            verdict.kind,
            VerdictKind::Allow,
        ));

        info!(
            event_name = "turn.blocked",
            session_id = session.session_id.as_str(),
            reason = verdict.reason.as_deref().unwrap_or_default(),
            "turn blocked by guardrails"
        );

        TurnReply {
            reply_text: verdict.text,
            awaiting_confirmation: session.dialog_state == DialogState::AwaitingConfirmation,
            pending_summary: session
                .pending_action
                .as_ref()
                .and_then(|pending| pending.presented_summary.clone()),
        }
    }

    /// Output gate, turn recording, and reply assembly shared by every
    /// exit path.
    fn finish_turn(
        &self,
        session: &mut ConversationSession,
        user_text: &str,
        reply: String,
        intent: Intent,
        chunk_ids: Vec<String>,
        input_verdict: VerdictKind,
    ) -> TurnReply {
        let output_verdict = self.guardrails.screen_output(&reply);
        let reply_text = output_verdict.text.clone();

        session.record_turn(Turn::new(
            user_text,
            reply_text.clone(),
            intent,
            chunk_ids,
            input_verdict,
            output_verdict.kind,
        ));

        let pending_summary = session
            .pending_action
            .as_ref()
            .and_then(|pending| pending.presented_summary.clone());
        let awaiting_confirmation = session.dialog_state == DialogState::AwaitingConfirmation;

        info!(
            event_name = "turn.completed",
            session_id = session.session_id.as_str(),
            intent = intent.label(),
            awaiting_confirmation,
            "turn completed"
        );

        TurnReply { reply_text, awaiting_confirmation, pending_summary }
    }

    fn emit_guardrail_event(
        &self,
        audit_ctx: &AuditContext,
        event_type: &'static str,
        verdict: &GuardrailVerdict,
    ) {
        self.audit.emit(
            AuditEvent::new(
                audit_ctx.session_id.clone(),
                None,
                audit_ctx.correlation_id.clone(),
                event_type,
                AuditCategory::Guardrail,
                audit_ctx.actor.clone(),
                AuditOutcome::Rejected,
            )
            .with_metadata("reason", verdict.reason.clone().unwrap_or_default()),
        );
    }
}

/// Intent recorded on a turn that resolves a confirmation: the turn is
/// attributed to the action it confirmed or cancelled.
fn intent_for_action(kind: Option<ActionKind>) -> Intent {
    match kind {
        Some(ActionKind::ApplyLeave) => Intent::LeaveApply,
        Some(ActionKind::CreditLeave) => Intent::LeaveCredit,
        None => Intent::Unknown,
    }
}

fn merge_payload(existing: ActionPayload, update: ActionPayload) -> ActionPayload {
    match (existing, update) {
        (ActionPayload::ApplyLeave(mut draft), ActionPayload::ApplyLeave(new)) => {
            draft.merge(new);
            ActionPayload::ApplyLeave(draft)
        }
        (ActionPayload::CreditLeave(mut draft), ActionPayload::CreditLeave(new)) => {
            draft.merge(new);
            ActionPayload::CreditLeave(draft)
        }
        // kinds differ: caller already decided this is a replacement
        (_, update) => update,
    }
}

fn summarize_payload(payload: &ActionPayload) -> Result<String, TurnError> {
    match payload {
        ActionPayload::ApplyLeave(draft) => {
            draft.clone().into_request().map(|request| request.summary())
        }
        ActionPayload::CreditLeave(draft) => {
            draft.clone().into_credit().map(|credit| credit.summary())
        }
    }
}

/// Drop the slots that made a complete draft fail validation so the user
/// can re-supply them.
fn clear_invalid_slots(payload: ActionPayload) -> ActionPayload {
    match payload {
        ActionPayload::ApplyLeave(mut draft) => {
            draft.start_date = None;
            draft.end_date = None;
            ActionPayload::ApplyLeave(draft)
        }
        ActionPayload::CreditLeave(mut draft) => {
            draft.days = None;
            ActionPayload::CreditLeave(draft)
        }
    }
}

fn build_transcript(session: &ConversationSession, window: usize, current: &str) -> String {
    let mut lines = Vec::new();
    for turn in session.recent_turns(window) {
        lines.push(format!("user: {}", turn.user_text));
        lines.push(format!("assistant: {}", turn.assistant_text));
    }
    lines.push(format!("user: {current}"));
    lines.join("\n")
}

fn format_balance(balance: &LeaveBalance) -> String {
    if balance.entries.is_empty() {
        return "You don't have any leave balance on record.".to_string();
    }
    let lines: Vec<String> = balance
        .entries
        .iter()
        .map(|entry| {
            format!(
                "- {} ({}): {} day(s)",
                entry.leave_type.display_name(),
                entry.leave_type.code(),
                entry.days
            )
        })
        .collect();
    format!("Your current leave balance is:\n\n{}", lines.join("\n"))
}

fn format_history(records: &[LeaveRecord]) -> String {
    if records.is_empty() {
        return "You don't have any leave applications on record.".to_string();
    }
    let lines: Vec<String> = records
        .iter()
        .take(HISTORY_DISPLAY_LIMIT)
        .map(|record| {
            format!(
                "- {} for {} day(s) starting {} - **{}**",
                record.leave_type.code(),
                record.days,
                record.start_date,
                record.status.display_name()
            )
        })
        .collect();
    format!("Here are your recent leave applications:\n\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use secrecy::SecretString;

    use hrdesk_core::audit::InMemoryAuditSink;
    use hrdesk_core::config::AppConfig;
    use hrdesk_core::domain::leave::{
        BalanceEntry, LeaveBalance, LeaveCredit, LeaveRecord, LeaveRequest, LeaveStatus, LeaveType,
    };
    use hrdesk_core::domain::session::{Intent, Principal, Role, SessionId};
    use hrdesk_hrms::{LeaveApplicationReceipt, LeaveService, LeaveServiceError};
    use hrdesk_rag::{ChunkerConfig, DocumentMetadata, PolicyIndex, SourceDocument};
    use hrdesk_rag::{EmbeddingClient, EmbeddingError};

    use super::{AgentRuntime, TurnReply};
    use crate::llm::{LlmClient, LlmError};

    /// Routes completions by prompt role: classification calls pop from
    /// `intents`, extraction calls pop from `slots`, everything else pops
    /// from `answers`. Panics on an unexpected call, which is the point.
    #[derive(Default)]
    struct ScriptedLlm {
        intents: Mutex<VecDeque<&'static str>>,
        slots: Mutex<VecDeque<&'static str>>,
        answers: Mutex<VecDeque<&'static str>>,
    }

    impl ScriptedLlm {
        fn expect_intents(self, labels: &[&'static str]) -> Self {
            self.intents.lock().expect("lock").extend(labels.iter().copied());
            self
        }

        fn expect_slots(self, payloads: &[&'static str]) -> Self {
            self.slots.lock().expect("lock").extend(payloads.iter().copied());
            self
        }

        fn expect_answers(self, texts: &[&'static str]) -> Self {
            self.answers.lock().expect("lock").extend(texts.iter().copied());
            self
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, system: &str, _user: &str) -> Result<String, LlmError> {
            let queue = if system.contains("intent classifier") {
                &self.intents
            } else if system.contains("parser") {
                &self.slots
            } else {
                &self.answers
            };
            queue
                .lock()
                .expect("lock")
                .pop_front()
                .map(str::to_string)
                .ok_or_else(|| LlmError::Unavailable("no scripted response".to_string()))
        }
    }

    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingClient for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let lower = text.to_ascii_lowercase();
            let mut vector: Vec<f32> = ["maternity", "casual", "notice"]
                .iter()
                .map(|axis| if lower.contains(axis) { 1.0 } else { 0.0 })
                .collect();
            vector.push(0.05);
            Ok(vector)
        }
    }

    /// Leave service stub that records every mutation it receives.
    #[derive(Default)]
    struct RecordingLeaveService {
        applications: Mutex<Vec<LeaveRequest>>,
        credits: Mutex<Vec<LeaveCredit>>,
        fail_next: Mutex<u32>,
    }

    #[async_trait]
    impl LeaveService for RecordingLeaveService {
        async fn get_balance(
            &self,
            _principal: &Principal,
        ) -> Result<LeaveBalance, LeaveServiceError> {
            if self.take_failure() {
                return Err(LeaveServiceError::ServiceUnavailable {
                    message: "down".to_string(),
                });
            }
            Ok(LeaveBalance {
                entries: vec![
                    BalanceEntry { leave_type: LeaveType::Casual, days: 4.5 },
                    BalanceEntry { leave_type: LeaveType::Medical, days: 7.0 },
                ],
            })
        }

        async fn get_history(
            &self,
            _principal: &Principal,
        ) -> Result<Vec<LeaveRecord>, LeaveServiceError> {
            Ok(vec![LeaveRecord {
                leave_type: LeaveType::Privilege,
                start_date: NaiveDate::from_ymd_opt(2026, 7, 1).expect("valid date"),
                days: 2.0,
                status: LeaveStatus::Approved,
            }])
        }

        async fn apply_leave(
            &self,
            _principal: &Principal,
            request: &LeaveRequest,
        ) -> Result<LeaveApplicationReceipt, LeaveServiceError> {
            if self.take_failure() {
                return Err(LeaveServiceError::ServiceUnavailable {
                    message: "down".to_string(),
                });
            }
            self.applications.lock().expect("lock").push(request.clone());
            Ok(LeaveApplicationReceipt {
                application_id: "LA-1".to_string(),
                status_text: "PENDING".to_string(),
            })
        }

        async fn credit_leave(
            &self,
            _principal: &Principal,
            credit: &LeaveCredit,
        ) -> Result<(), LeaveServiceError> {
            self.credits.lock().expect("lock").push(credit.clone());
            Ok(())
        }
    }

    impl RecordingLeaveService {
        fn take_failure(&self) -> bool {
            let mut remaining = self.fail_next.lock().expect("lock");
            if *remaining > 0 {
                *remaining -= 1;
                true
            } else {
                false
            }
        }
    }

    fn employee() -> Principal {
        Principal {
            employee_id: "E-1001".to_string(),
            display_name: "Asha".to_string(),
            role: Role::Employee,
            token: SecretString::from("token"),
        }
    }

    fn admin() -> Principal {
        Principal {
            employee_id: "E-9000".to_string(),
            display_name: "Ravi".to_string(),
            role: Role::Admin,
            token: SecretString::from("admin-token"),
        }
    }

    async fn runtime_with(
        llm: ScriptedLlm,
        service: Arc<RecordingLeaveService>,
        seed_policy: bool,
    ) -> AgentRuntime {
        let config = AppConfig::default();
        let index = Arc::new(PolicyIndex::new(Arc::new(KeywordEmbedder), ChunkerConfig::default()));
        if seed_policy {
            index
                .ingest(SourceDocument {
                    document_id: "maternity.md".to_string(),
                    text: "Maternity leave is 26 weeks for the first two children.".to_string(),
                    metadata: DocumentMetadata {
                        policy_id: "leave-policy".to_string(),
                        version: 1,
                        effective_date: NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date"),
                    },
                })
                .await
                .expect("seed ingest");
        }
        AgentRuntime::new(
            &config,
            Arc::new(llm),
            index,
            service,
            Arc::new(InMemoryAuditSink::default()),
        )
    }

    async fn turn(runtime: &AgentRuntime, principal: &Principal, message: &str) -> TurnReply {
        turn_in(runtime, "s-test", principal, message).await
    }

    async fn turn_in(
        runtime: &AgentRuntime,
        session_id: &str,
        principal: &Principal,
        message: &str,
    ) -> TurnReply {
        runtime
            .handle_turn(&SessionId(session_id.to_string()), principal, message)
            .await
    }

    #[tokio::test]
    async fn policy_question_is_answered_with_sources() {
        let llm = ScriptedLlm::default()
            .expect_intents(&["policy_question"])
            .expect_answers(&["Maternity leave is 26 weeks."]);
        let runtime = runtime_with(llm, Arc::new(RecordingLeaveService::default()), true).await;

        let reply = turn(&runtime, &employee(), "How long is maternity leave?").await;
        assert!(reply.reply_text.starts_with("Maternity leave is 26 weeks."));
        assert!(reply.reply_text.contains("**Sources:**"));
        assert!(reply.reply_text.contains("maternity.md"));
        assert!(!reply.awaiting_confirmation);
    }

    #[tokio::test]
    async fn off_policy_question_gets_the_ungrounded_reply() {
        let llm = ScriptedLlm::default().expect_intents(&["policy_question"]);
        let runtime = runtime_with(llm, Arc::new(RecordingLeaveService::default()), true).await;

        let reply = turn(&runtime, &employee(), "what is the parking policy in the basement").await;
        assert!(reply.reply_text.contains("don't have information"));
        assert!(!reply.reply_text.contains("**Sources:**"));
    }

    #[tokio::test]
    async fn leave_apply_walks_slots_confirmation_and_dispatch() {
        let llm = ScriptedLlm::default()
            .expect_intents(&["leave_apply", "leave_apply"])
            .expect_slots(&[
                r#"{"leave_type": "CL", "start_date": "2026-12-10", "end_date": null, "reason": null}"#,
                r#"{"leave_type": "CL", "start_date": "2026-12-10", "end_date": "2026-12-12", "reason": "family function"}"#,
            ]);
        let service = Arc::new(RecordingLeaveService::default());
        let runtime = runtime_with(llm, service.clone(), false).await;
        let user = employee();

        let first = turn(&runtime, &user, "I want to apply for casual leave from Dec 10").await;
        assert!(first.reply_text.contains("I still need the following"));
        assert!(first.reply_text.contains("end date"));
        assert!(!first.awaiting_confirmation);
        assert!(service.applications.lock().expect("lock").is_empty());

        let second = turn(&runtime, &user, "until Dec 12, for a family function").await;
        assert!(second.awaiting_confirmation);
        assert!(second.reply_text.contains("Please confirm"));
        assert!(second.pending_summary.as_deref().is_some_and(|s| s.contains("Casual Leave")));
        assert!(service.applications.lock().expect("lock").is_empty(), "nothing before yes");

        let third = turn(&runtime, &user, "yes").await;
        assert!(third.reply_text.contains("submitted successfully"));
        assert!(!third.awaiting_confirmation);

        let applications = service.applications.lock().expect("lock");
        assert_eq!(applications.len(), 1);
        assert_eq!(applications[0].days, 3);
        assert_eq!(applications[0].leave_type, LeaveType::Casual);
    }

    #[tokio::test]
    async fn negative_confirmation_cancels_without_dispatch() {
        let llm = ScriptedLlm::default().expect_intents(&["leave_apply"]).expect_slots(&[
            r#"{"leave_type": "ML", "start_date": "2026-09-07", "end_date": "2026-09-07", "reason": "fever"}"#,
        ]);
        let service = Arc::new(RecordingLeaveService::default());
        let runtime = runtime_with(llm, service.clone(), false).await;
        let user = employee();

        let first = turn(&runtime, &user, "sick leave tomorrow, fever").await;
        assert!(first.awaiting_confirmation);

        let second = turn(&runtime, &user, "no").await;
        assert!(second.reply_text.contains("cancelled"));
        assert!(!second.awaiting_confirmation);
        assert!(service.applications.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn blocked_input_never_reaches_the_classifier() {
        // no scripted intents: a classifier call would fail the turn text
        let llm = ScriptedLlm::default();
        let runtime = runtime_with(llm, Arc::new(RecordingLeaveService::default()), false).await;

        let reply = turn(&runtime, &employee(), "you are stupid").await;
        assert!(reply.reply_text.contains("communication policy"));
        assert!(reply.reply_text.contains("~~stupid~~"));
    }

    #[tokio::test]
    async fn balance_is_formatted_as_bullets() {
        let llm = ScriptedLlm::default().expect_intents(&["leave_balance"]);
        let runtime = runtime_with(llm, Arc::new(RecordingLeaveService::default()), false).await;

        let reply = turn(&runtime, &employee(), "how many leaves do I have left?").await;
        assert!(reply.reply_text.contains("- Casual Leave (CL): 4.5 day(s)"));
        assert!(reply.reply_text.contains("- Medical Leave (ML): 7 day(s)"));
    }

    #[tokio::test]
    async fn transient_outage_is_retried_once() {
        let llm = ScriptedLlm::default().expect_intents(&["leave_balance"]);
        let service = Arc::new(RecordingLeaveService::default());
        *service.fail_next.lock().expect("lock") = 1;
        let runtime = runtime_with(llm, service, false).await;

        let reply = turn(&runtime, &employee(), "my balance please").await;
        assert!(reply.reply_text.contains("Casual Leave"), "second attempt should succeed");
    }

    #[tokio::test]
    async fn persistent_outage_maps_to_a_safe_message() {
        let llm = ScriptedLlm::default().expect_intents(&["leave_balance"]);
        let service = Arc::new(RecordingLeaveService::default());
        *service.fail_next.lock().expect("lock") = 2;
        let runtime = runtime_with(llm, service, false).await;

        let reply = turn(&runtime, &employee(), "my balance please").await;
        assert!(reply.reply_text.contains("temporarily unavailable"));
    }

    #[tokio::test]
    async fn leave_credit_requires_admin() {
        let llm = ScriptedLlm::default().expect_intents(&["leave_credit"]);
        let service = Arc::new(RecordingLeaveService::default());
        let runtime = runtime_with(llm, service.clone(), false).await;

        let reply = turn(&runtime, &employee(), "credit 3 days of CL to E-1042").await;
        assert!(reply.reply_text.contains("don't have permission"));
        assert!(service.credits.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn admin_credit_flow_confirms_and_dispatches() {
        let llm = ScriptedLlm::default()
            .expect_intents(&["leave_credit"])
            .expect_slots(&[r#"{"employee_id": "E-1042", "leave_type": "CL", "days": 3}"#]);
        let service = Arc::new(RecordingLeaveService::default());
        let runtime = runtime_with(llm, service.clone(), false).await;
        let user = admin();

        let first = turn(&runtime, &user, "credit 3 days of CL to E-1042").await;
        assert!(first.awaiting_confirmation);
        assert!(first.pending_summary.as_deref().is_some_and(|s| s.contains("E-1042")));

        let second = turn(&runtime, &user, "confirm").await;
        assert!(second.reply_text.contains("Done."));

        let credits = service.credits.lock().expect("lock");
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].days, 3);
    }

    #[tokio::test]
    async fn topic_change_discards_the_pending_action_audibly() {
        let llm = ScriptedLlm::default()
            .expect_intents(&["leave_apply", "leave_balance"])
            .expect_slots(&[
                r#"{"leave_type": "CL", "start_date": "2026-12-10", "end_date": "2026-12-12", "reason": "trip"}"#,
            ]);
        let service = Arc::new(RecordingLeaveService::default());
        let runtime = runtime_with(llm, service.clone(), false).await;
        let user = employee();

        let first = turn(&runtime, &user, "casual leave 10th to 12th Dec for a trip").await;
        assert!(first.awaiting_confirmation);

        let second = turn(&runtime, &user, "actually, what's my leave balance?").await;
        assert!(second.reply_text.contains("set aside the leave application"));
        assert!(second.reply_text.contains("Casual Leave (CL): 4.5"));
        assert!(!second.awaiting_confirmation);
        assert!(service.applications.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn small_talk_gets_the_capability_card() {
        let llm = ScriptedLlm::default().expect_intents(&["small_talk"]);
        let runtime = runtime_with(llm, Arc::new(RecordingLeaveService::default()), false).await;

        let reply = turn(&runtime, &employee(), "hello there!").await;
        assert!(reply.reply_text.contains("I can help you with"));
    }

    #[tokio::test]
    async fn end_session_discards_pending_state() {
        let llm = ScriptedLlm::default().expect_intents(&["leave_apply"]).expect_slots(&[
            r#"{"leave_type": "CL", "start_date": "2026-12-10", "end_date": "2026-12-12", "reason": "trip"}"#,
        ]);
        let service = Arc::new(RecordingLeaveService::default());
        let runtime = runtime_with(llm, service.clone(), false).await;
        let user = employee();

        let first = turn(&runtime, &user, "casual leave 10-12 Dec for a trip").await;
        assert!(first.awaiting_confirmation);

        assert!(runtime.end_session(&SessionId("s-test".to_string())));
        assert!(service.applications.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn pending_actions_are_isolated_per_session() {
        let llm = ScriptedLlm::default()
            .expect_intents(&["leave_apply", "small_talk"])
            .expect_slots(&[
                r#"{"leave_type": "CL", "start_date": "2026-12-10", "end_date": "2026-12-12", "reason": "trip"}"#,
            ]);
        let service = Arc::new(RecordingLeaveService::default());
        let runtime = runtime_with(llm, service.clone(), false).await;
        let user = employee();

        let first = turn_in(&runtime, "s-asha", &user, "casual leave 10-12 Dec for a trip").await;
        assert!(first.awaiting_confirmation);

        // "yes" in another session has no confirmation to resolve; it goes
        // through normal classification and dispatches nothing
        let other = turn_in(&runtime, "s-ravi", &admin(), "yes").await;
        assert!(!other.awaiting_confirmation);
        assert!(other.pending_summary.is_none());
        assert!(other.reply_text.contains("I can help you with"));
        assert!(service.applications.lock().expect("lock").is_empty());

        let confirmed = turn_in(&runtime, "s-asha", &user, "yes").await;
        assert!(confirmed.reply_text.contains("submitted successfully"));
        assert_eq!(service.applications.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn lapsed_confirmation_is_cancelled_not_dispatched() {
        let llm = ScriptedLlm::default()
            .expect_intents(&["leave_apply", "small_talk"])
            .expect_slots(&[
                r#"{"leave_type": "CL", "start_date": "2026-12-10", "end_date": "2026-12-12", "reason": "trip"}"#,
            ]);
        let service = Arc::new(RecordingLeaveService::default());
        let mut config = AppConfig::default();
        config.session.confirmation_ttl_secs = 0;
        let index = Arc::new(PolicyIndex::new(Arc::new(KeywordEmbedder), ChunkerConfig::default()));
        let runtime = AgentRuntime::new(
            &config,
            Arc::new(llm),
            index,
            service.clone(),
            Arc::new(InMemoryAuditSink::default()),
        );
        let user = employee();

        let first = turn(&runtime, &user, "casual leave 10-12 Dec for a trip").await;
        assert!(first.awaiting_confirmation);

        let second = turn(&runtime, &user, "yes").await;
        assert!(second.reply_text.contains("was not confirmed in time"));
        assert!(!second.awaiting_confirmation);
        assert!(second.pending_summary.is_none());
        assert!(service.applications.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn confirmation_turns_are_attributed_to_the_confirmed_action() {
        let llm = ScriptedLlm::default().expect_intents(&["leave_apply"]).expect_slots(&[
            r#"{"leave_type": "CL", "start_date": "2026-12-10", "end_date": "2026-12-12", "reason": "trip"}"#,
        ]);
        let service = Arc::new(RecordingLeaveService::default());
        let runtime = runtime_with(llm, service, false).await;
        let user = employee();

        let first = turn(&runtime, &user, "casual leave 10-12 Dec for a trip").await;
        assert!(first.awaiting_confirmation);
        turn(&runtime, &user, "yes").await;

        let session = runtime.sessions.session(&SessionId("s-test".to_string()), &user);
        let session = session.lock().await;
        let last = session.turns.last().expect("turn recorded");
        assert_eq!(last.intent, Intent::LeaveApply);
    }
}
