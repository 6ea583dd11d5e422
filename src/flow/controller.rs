//! Stage transition controller — the only code that moves the workflow.
//!
//! Routing: an active stage always dispatches to its owner. With no stage and
//! no business record the turn starts onboarding. With no stage and a record,
//! the intent classifier picks the entry stage, pulled back to the earliest
//! stage whose prerequisite is missing.
//!
//! Advancing: only a validated completion signal from the owner of the
//! active stage moves it one step along the table, committing the payload.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::AgentKind;
use crate::error::TransitionError;
use crate::flow::router::IntentClassifier;
use crate::flow::signal::CompletionSignal;
use crate::session::context::{AgentStatus, SessionMemory};
use crate::session::ledger::ExtractionSource;
use crate::session::stage::{
    Stage, StageTransition, TransitionTrigger, can_transition, stage_label,
};

/// Where a turn goes.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub agent: AgentKind,
    pub stage: Stage,
    /// Set when this turn entered a stage from none.
    pub entered: Option<StageTransition>,
    /// Stage the classifier asked for, when a missing prerequisite redirected it.
    pub redirected_from: Option<Stage>,
}

/// Sole authority over `workflow_stage`.
pub struct StageController {
    classifier: Arc<dyn IntentClassifier>,
}

impl StageController {
    pub fn new(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self { classifier }
    }

    /// Decide which agent handles this turn, entering a stage if none is
    /// active. Content is only looked at when no stage is active and a
    /// business record exists.
    pub fn route(&self, memory: &mut SessionMemory, raw_text: &str) -> RouteDecision {
        let shared = memory.shared();

        let decision = match shared.workflow_stage() {
            Some(stage) => RouteDecision {
                agent: stage.owner(),
                stage,
                entered: None,
                redirected_from: None,
            },
            None if shared.business_record().is_none() => {
                let transition =
                    StageTransition::new(None, Some(Stage::Onboarding), TransitionTrigger::Start);
                RouteDecision {
                    agent: AgentKind::Onboarding,
                    stage: Stage::Onboarding,
                    entered: Some(transition),
                    redirected_from: None,
                }
            }
            None => {
                let intent = self.classifier.classify(raw_text);
                let unmet = shared.first_unmet_prerequisite(intent);
                if let Some(earliest) = unmet {
                    warn!(
                        session_id = %memory.session().session_id,
                        requested = %intent,
                        redirected = %earliest,
                        "Missing prerequisite; redirecting to earliest unmet stage"
                    );
                }
                let stage = unmet.unwrap_or(intent);
                let transition =
                    StageTransition::new(None, Some(stage), TransitionTrigger::Routed { intent });
                RouteDecision {
                    agent: stage.owner(),
                    stage,
                    entered: Some(transition),
                    redirected_from: unmet.map(|_| intent),
                }
            }
        };

        if let Some(ref transition) = decision.entered {
            info!(
                session_id = %memory.session().session_id,
                stage = %decision.stage,
                trigger = ?transition.trigger,
                "Stage entered"
            );
            memory.record_transition(transition.clone());
        }
        memory.agent_context_mut(decision.agent).status = AgentStatus::Active;
        decision
    }

    /// Apply a completion signal from `agent`.
    ///
    /// On success the payload is committed to the shared context, the
    /// confirmed fields are recorded in the agent's ledger, and the stage
    /// advances one step. On error nothing is changed.
    pub fn apply_signal(
        &self,
        memory: &mut SessionMemory,
        agent: AgentKind,
        signal: CompletionSignal,
        message_id: Uuid,
    ) -> Result<StageTransition, TransitionError> {
        let current = memory
            .shared()
            .workflow_stage()
            .ok_or_else(|| TransitionError::NoActiveStage {
                agent: agent.to_string(),
            })?;

        if current.owner() != agent || signal.agent() != agent {
            return Err(TransitionError::NotOwner {
                agent: signal.agent().to_string(),
                stage: current.to_string(),
            });
        }

        let next = current.next();
        if !can_transition(Some(current), next) {
            return Err(TransitionError::InvalidEdge {
                from: current.to_string(),
                to: stage_label(next).to_string(),
            });
        }

        commit(memory, agent, signal, message_id);
        memory.agent_context_mut(agent).status = AgentStatus::Completed;

        let transition =
            StageTransition::new(Some(current), next, TransitionTrigger::Signal { agent });
        memory.record_transition(transition.clone());

        info!(
            session_id = %memory.session().session_id,
            from = %current,
            to = %stage_label(next),
            "Stage advanced"
        );
        Ok(transition)
    }
}

fn commit(memory: &mut SessionMemory, agent: AgentKind, signal: CompletionSignal, message_id: Uuid) {
    let confirmed: Vec<(&'static str, serde_json::Value)> = match signal {
        CompletionSignal::BusinessConfirmed(record) => {
            let fields = record.fields();
            memory.shared_mut().commit_record(record);
            fields
        }
        CompletionSignal::BriefConfirmed(brief) => {
            let value = serde_json::to_value(&brief).unwrap_or_default();
            memory.shared_mut().commit_brief(brief);
            vec![("brief", value)]
        }
        CompletionSignal::CandidatesIdentified(found) => {
            let value = serde_json::to_value(&found.candidates).unwrap_or_default();
            memory.shared_mut().commit_candidates(found.candidates);
            vec![("candidates", value)]
        }
        CompletionSignal::MessagesDrafted(drafted) => {
            let value = serde_json::to_value(&drafted.drafts).unwrap_or_default();
            memory.shared_mut().commit_drafts(drafted.drafts);
            vec![("drafts", value)]
        }
        CompletionSignal::AssemblyComplete(done) => {
            let mut fields = vec![("summary", serde_json::json!(done.summary))];
            if let Some(id) = done.campaign_id {
                fields.push(("campaign_id", serde_json::json!(id)));
            }
            fields
        }
    };

    let ctx = memory.agent_context_mut(agent);
    for (field, value) in confirmed {
        ctx.add_extraction(field, value, message_id, ExtractionSource::UserConfirmation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::router::KeywordIntentClassifier;
    use crate::session::context::Session;
    use crate::session::records::{
        AssemblyComplete, BusinessRecord, CampaignBrief, Candidate, CandidatesIdentified,
        MessagesDrafted, OutreachDraft,
    };

    fn controller() -> StageController {
        StageController::new(Arc::new(KeywordIntentClassifier::default_rules()))
    }

    fn memory() -> SessionMemory {
        SessionMemory::new(Session::new("s-1", "u-1"))
    }

    fn alma() -> BusinessRecord {
        BusinessRecord {
            name: "Alma Cafe".to_string(),
            location: "Rehovot, Israel".to_string(),
            category: "Coffee shop".to_string(),
            website: None,
            social_links: Vec::new(),
        }
    }

    fn brief() -> CampaignBrief {
        CampaignBrief {
            goal: "Fill weekday mornings".to_string(),
            target_audience: "Students".to_string(),
            budget: None,
            timeline: None,
            platforms: Vec::new(),
        }
    }

    fn signal_for(stage: Stage) -> CompletionSignal {
        match stage {
            Stage::Onboarding => CompletionSignal::BusinessConfirmed(alma()),
            Stage::Brief => CompletionSignal::BriefConfirmed(brief()),
            Stage::Discovery => CompletionSignal::CandidatesIdentified(CandidatesIdentified {
                candidates: vec![Candidate {
                    name: "Dana Bakes".to_string(),
                    handle: None,
                    platform: None,
                    rationale: None,
                }],
            }),
            Stage::Outreach => CompletionSignal::MessagesDrafted(MessagesDrafted {
                drafts: vec![OutreachDraft {
                    candidate: "Dana Bakes".to_string(),
                    channel: None,
                    subject: None,
                    body: "Hi Dana!".to_string(),
                }],
            }),
            Stage::Assembly => CompletionSignal::AssemblyComplete(AssemblyComplete {
                summary: "Campaign ready".to_string(),
                campaign_id: Some("c-1".to_string()),
            }),
        }
    }

    #[test]
    fn fresh_session_routes_to_onboarding_regardless_of_content() {
        let controller = controller();
        for text in ["I run a bakery", "find influencers", "draft an email", "finalize"] {
            let mut mem = memory();
            let route = controller.route(&mut mem, text);
            assert_eq!(route.agent, AgentKind::Onboarding, "text: {text}");
            assert_eq!(mem.shared().workflow_stage(), Some(Stage::Onboarding));
            assert_eq!(route.entered.unwrap().trigger, TransitionTrigger::Start);
        }
    }

    #[test]
    fn active_stage_overrides_content() {
        let controller = controller();
        let mut mem = memory();
        controller.route(&mut mem, "hi");
        controller
            .apply_signal(&mut mem, AgentKind::Onboarding, signal_for(Stage::Onboarding), Uuid::new_v4())
            .unwrap();

        let route = controller.route(&mut mem, "please find influencers and finalize");
        assert_eq!(route.agent, AgentKind::Brief);
        assert!(route.entered.is_none());
        assert_eq!(
            mem.agent_context(AgentKind::Brief).unwrap().status,
            AgentStatus::Active
        );
    }

    #[test]
    fn full_run_is_monotonic_and_commits_payloads() {
        let controller = controller();
        let mut mem = memory();
        controller.route(&mut mem, "hello");

        for stage in Stage::ALL {
            let route = controller.route(&mut mem, "anything");
            assert_eq!(route.stage, stage);
            let t = controller
                .apply_signal(&mut mem, stage.owner(), signal_for(stage), Uuid::new_v4())
                .unwrap();
            assert_eq!(t.from, Some(stage));
            assert_eq!(t.to, stage.next());
        }

        assert_eq!(mem.shared().workflow_stage(), None);
        assert_eq!(mem.shared().business_record(), Some(&alma()));
        assert_eq!(mem.shared().campaign_brief(), Some(&brief()));
        assert_eq!(mem.shared().candidates().len(), 1);
        assert_eq!(mem.shared().outreach_drafts().len(), 1);

        let observed: Vec<Option<Stage>> = mem.transitions().iter().map(|t| t.to).collect();
        assert_eq!(
            observed,
            vec![
                Some(Stage::Onboarding),
                Some(Stage::Brief),
                Some(Stage::Discovery),
                Some(Stage::Outreach),
                Some(Stage::Assembly),
                None
            ]
        );
        for t in &mem.transitions()[1..] {
            assert!(can_transition(t.from, t.to));
        }
    }

    #[test]
    fn signal_from_non_owner_is_rejected() {
        let controller = controller();
        let mut mem = memory();
        controller.route(&mut mem, "hi");

        let err = controller
            .apply_signal(&mut mem, AgentKind::Brief, signal_for(Stage::Brief), Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotOwner { .. }));
        assert_eq!(mem.shared().workflow_stage(), Some(Stage::Onboarding));
        assert!(mem.shared().campaign_brief().is_none());
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let controller = controller();
        let mut mem = memory();
        controller.route(&mut mem, "hi");

        let err = controller
            .apply_signal(&mut mem, AgentKind::Onboarding, signal_for(Stage::Brief), Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotOwner { .. }));
        assert!(mem.shared().business_record().is_none());
    }

    #[test]
    fn signal_without_active_stage_is_rejected() {
        let controller = controller();
        let mut mem = memory();
        let err = controller
            .apply_signal(&mut mem, AgentKind::Onboarding, signal_for(Stage::Onboarding), Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, TransitionError::NoActiveStage { .. }));
        assert!(mem.shared().business_record().is_none());
    }

    #[test]
    fn confirmed_fields_land_in_owner_ledger() {
        let controller = controller();
        let mut mem = memory();
        controller.route(&mut mem, "hi");
        let msg = Uuid::new_v4();
        controller
            .apply_signal(&mut mem, AgentKind::Onboarding, signal_for(Stage::Onboarding), msg)
            .unwrap();

        let ctx = mem.agent_context(AgentKind::Onboarding).unwrap();
        assert_eq!(ctx.status, AgentStatus::Completed);
        let latest = ctx.ledger().latest("name").unwrap();
        assert_eq!(latest.source, ExtractionSource::UserConfirmation);
        assert_eq!(latest.message_id, msg);
        assert!(mem.agent_context(AgentKind::Brief).is_none());
    }

    #[test]
    fn stageless_with_record_uses_classifier() {
        let controller = controller();
        let mut mem = memory();
        mem.shared_mut().commit_record(alma());

        let route = controller.route(&mut mem, "Let's plan a spring campaign");
        assert_eq!(route.agent, AgentKind::Brief);
        assert_eq!(route.redirected_from, None);
        assert_eq!(
            route.entered.unwrap().trigger,
            TransitionTrigger::Routed { intent: Stage::Brief }
        );
        assert_eq!(mem.shared().workflow_stage(), Some(Stage::Brief));
    }

    #[test]
    fn missing_prerequisite_redirects_to_earliest_unmet() {
        let controller = controller();
        let mut mem = memory();
        mem.shared_mut().commit_record(alma());

        let route = controller.route(&mut mem, "Draft an email to each of them");
        assert_eq!(route.stage, Stage::Brief);
        assert_eq!(route.redirected_from, Some(Stage::Outreach));
        assert_eq!(mem.shared().workflow_stage(), Some(Stage::Brief));
    }

    #[test]
    fn met_prerequisites_enter_requested_stage() {
        let controller = controller();
        let mut mem = memory();
        mem.shared_mut().commit_record(alma());
        mem.shared_mut().commit_brief(brief());

        let route = controller.route(&mut mem, "Find more creators");
        assert_eq!(route.stage, Stage::Discovery);
        assert_eq!(route.redirected_from, None);
    }
}
