//! TurnCoordinator — drives one user turn end to end.
//!
//! A turn is atomic. The session's memory is cloned into a draft, every step
//! works on the draft, and the draft replaces the live memory only after the
//! agent has replied. An agent failure drops the draft, so a failed turn
//! leaves no trace in memory.
//!
//! 1. Lock the session (turns within a session queue in arrival order).
//! 2. Route: active stage → its owner; otherwise start or classify.
//! 3. Render the context header and append the user message.
//! 4. Invoke the agent.
//! 5. Scan the reply for a completion signal and apply it.
//! 6. Append the agent message and commit the draft.
//! 7. Persist, best-effort.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agents::{AgentInvoker, AgentKind, ReportedExtraction};
use crate::error::FlowError;
use crate::flow::controller::{RouteDecision, StageController};
use crate::flow::injector::build_turn_input;
use crate::flow::router::IntentClassifier;
use crate::flow::signal::{self, ScannedReply};
use crate::session::context::{Message, SessionMemory};
use crate::session::ledger::ExtractionSource;
use crate::session::stage::{Stage, StageTransition};
use crate::session::store::SessionStore;

/// One inbound user message.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub user_id: String,
    pub text: String,
    /// Merged into the shared metadata before routing.
    pub metadata: BTreeMap<String, String>,
}

impl TurnRequest {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Result of a committed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub agent: AgentKind,
    /// Text to show the user: completion block removed when one was applied.
    pub reply: String,
    pub stage_before: Option<Stage>,
    pub stage: Option<Stage>,
    /// Stage changes committed by this turn, in order.
    pub transitions: Vec<StageTransition>,
    /// Set when the classifier's choice was redirected to an earlier stage.
    pub redirected_from: Option<Stage>,
    /// Set when the reply carried a completion block that was not applied.
    pub signal_error: Option<String>,
    pub user_message_id: Uuid,
    pub agent_message_id: Uuid,
}

/// What the commit changed, for the persistence step.
struct CommitSummary {
    user_message: Message,
    agent_message: Message,
    record_committed: bool,
    progress_changed: bool,
}

/// Coordinates turns across all sessions.
pub struct TurnCoordinator {
    store: Arc<SessionStore>,
    invoker: Arc<dyn AgentInvoker>,
    controller: StageController,
}

impl TurnCoordinator {
    pub fn new(
        store: Arc<SessionStore>,
        invoker: Arc<dyn AgentInvoker>,
        classifier: Arc<dyn IntentClassifier>,
    ) -> Self {
        Self {
            store,
            invoker,
            controller: StageController::new(classifier),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Handle one user message.
    ///
    /// Returns `FlowError::AgentInvocation` when the agent call fails; the
    /// session is then exactly as it was before the turn.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnOutcome, FlowError> {
        let TurnRequest {
            session_id,
            user_id,
            text,
            metadata,
        } = request;

        let handle = self.store.get_or_create(&session_id, &user_id).await;
        let mut guard = match handle.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(session_id = %session_id, "Turn queued behind an in-flight turn");
                handle.lock().await
            }
        };

        let stage_before = guard.shared().workflow_stage();
        let mut draft: SessionMemory = guard.clone();
        for (key, value) in metadata {
            draft.set_metadata(key, value);
        }

        let route = self.controller.route(&mut draft, &text);
        let user_message = build_turn_input(&mut draft, route.agent, &text);

        let history = &draft.shared().messages()[..draft.shared().messages().len() - 1];
        let reply = match self
            .invoker
            .invoke(route.agent, &user_message.content, history)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    session_id = %session_id,
                    agent = %route.agent,
                    error = %e,
                    "Agent invocation failed; turn discarded"
                );
                return Err(FlowError::AgentInvocation(e));
            }
        };

        let agent_message = Message::agent(route.agent, reply.text.clone());
        record_reported(
            &mut draft,
            route.agent,
            reply.extractions,
            user_message.message_id,
            agent_message.message_id,
        );

        let mut transitions: Vec<StageTransition> = route.entered.iter().cloned().collect();
        let mut signal_error = None;
        let display = match signal::scan(route.agent, &reply.text) {
            Ok(ScannedReply {
                text,
                signal: Some(signal),
            }) => match self.controller.apply_signal(
                &mut draft,
                route.agent,
                signal,
                agent_message.message_id,
            ) {
                Ok(transition) => {
                    transitions.push(transition);
                    text
                }
                Err(e) => {
                    warn!(session_id = %session_id, agent = %route.agent, error = %e, "Completion signal rejected");
                    signal_error = Some(e.to_string());
                    reply.text.clone()
                }
            },
            Ok(ScannedReply { text, signal: None }) => text,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Malformed completion signal; stage unchanged");
                signal_error = Some(e.to_string());
                reply.text.clone()
            }
        };

        draft.shared_mut().push_message(agent_message.clone());

        let stage = draft.shared().workflow_stage();
        let summary = CommitSummary {
            record_committed: draft.shared().business_record() != guard.shared().business_record(),
            progress_changed: draft.shared().progress() != guard.shared().progress(),
            user_message,
            agent_message,
        };
        *guard = draft;

        info!(
            session_id = %session_id,
            agent = %route.agent,
            from = %crate::session::stage::stage_label(stage_before),
            to = %crate::session::stage::stage_label(stage),
            "Turn committed"
        );

        // Still under the session lock, so writes land in turn order.
        self.persist(&guard, &summary).await;
        drop(guard);

        let RouteDecision {
            agent,
            redirected_from,
            ..
        } = route;
        Ok(TurnOutcome {
            session_id,
            agent,
            reply: display,
            stage_before,
            stage,
            transitions,
            redirected_from,
            signal_error,
            user_message_id: summary.user_message.message_id,
            agent_message_id: summary.agent_message.message_id,
        })
    }

    async fn persist(&self, memory: &SessionMemory, summary: &CommitSummary) {
        let Some(persistence) = self.store.persistence() else {
            return;
        };
        let session_id = memory.session().session_id.as_str();

        for message in [&summary.user_message, &summary.agent_message] {
            if let Err(e) = persistence.save_message(session_id, message).await {
                warn!(session_id, error = %e, "Failed to persist message");
            }
        }

        if summary.record_committed {
            if let Some(record) = memory.shared().business_record() {
                if let Err(e) = persistence.commit_record(session_id, record).await {
                    warn!(session_id, error = %e, "Failed to persist business record");
                }
            }
        }

        if summary.progress_changed {
            let progress = memory.shared().progress();
            if let Err(e) = persistence.save_progress(session_id, &progress).await {
                warn!(session_id, error = %e, "Failed to persist workflow progress");
            }
        }
    }
}

/// Record the fields the agent reported deriving this turn.
///
/// User-sourced values point at the user's message; looked-up and inferred
/// values point at the agent's reply.
fn record_reported(
    memory: &mut SessionMemory,
    agent: AgentKind,
    extractions: Vec<ReportedExtraction>,
    user_message_id: Uuid,
    agent_message_id: Uuid,
) {
    for extraction in extractions {
        let message_id = match extraction.source {
            ExtractionSource::UserInput | ExtractionSource::UserConfirmation => user_message_id,
            ExtractionSource::ExternalLookup | ExtractionSource::Inference => agent_message_id,
        };
        memory.add_extraction(
            agent,
            extraction.field,
            extraction.value,
            message_id,
            extraction.source,
        );
    }
}
