//! Session memory — the shared context every agent sees and the private
//! context each agent keeps for itself.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::AgentKind;
use crate::session::ledger::{ExtractionLedger, ExtractionRecord, ExtractionSource};
use crate::session::records::{BusinessRecord, CampaignBrief, Candidate, OutreachDraft};
use crate::session::stage::{Stage, StageTransition};

/// Identity of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

/// A message in the session history. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub role: Role,
    pub content: String,
    /// Agent that produced the message (agent messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentKind>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            agent: None,
            timestamp: Utc::now(),
        }
    }

    pub fn agent(agent: AgentKind, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            role: Role::Agent,
            content: content.into(),
            agent: Some(agent),
            timestamp: Utc::now(),
        }
    }
}

/// Who the user is, as far as the agents need to know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// State visible to every agent.
///
/// Fields are read through accessors; writes are restricted to the crate so
/// the stage and committed records can only change through the controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedContext {
    workflow_stage: Option<Stage>,
    business_record: Option<BusinessRecord>,
    campaign_brief: Option<CampaignBrief>,
    candidates: Vec<Candidate>,
    outreach_drafts: Vec<OutreachDraft>,
    user_profile: UserProfile,
    messages: Vec<Message>,
    metadata: BTreeMap<String, String>,
}

impl SharedContext {
    pub fn workflow_stage(&self) -> Option<Stage> {
        self.workflow_stage
    }

    pub fn business_record(&self) -> Option<&BusinessRecord> {
        self.business_record.as_ref()
    }

    pub fn campaign_brief(&self) -> Option<&CampaignBrief> {
        self.campaign_brief.as_ref()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn outreach_drafts(&self) -> &[OutreachDraft] {
        &self.outreach_drafts
    }

    pub fn user_profile(&self) -> &UserProfile {
        &self.user_profile
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub(crate) fn set_stage(&mut self, stage: Option<Stage>) {
        self.workflow_stage = stage;
    }

    pub(crate) fn commit_record(&mut self, record: BusinessRecord) {
        self.business_record = Some(record);
    }

    pub(crate) fn commit_brief(&mut self, brief: CampaignBrief) {
        self.campaign_brief = Some(brief);
    }

    pub(crate) fn commit_candidates(&mut self, candidates: Vec<Candidate>) {
        self.candidates = candidates;
    }

    pub(crate) fn commit_drafts(&mut self, drafts: Vec<OutreachDraft>) {
        self.outreach_drafts = drafts;
    }

    pub(crate) fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Earliest stage before `target` whose output has not been committed.
    pub fn first_unmet_prerequisite(&self, target: Stage) -> Option<Stage> {
        let produced = [
            (Stage::Onboarding, self.business_record.is_some()),
            (Stage::Brief, self.campaign_brief.is_some()),
            (Stage::Discovery, !self.candidates.is_empty()),
            (Stage::Outreach, !self.outreach_drafts.is_empty()),
        ];
        produced
            .into_iter()
            .filter(|(stage, _)| *stage < target)
            .find(|(_, done)| !done)
            .map(|(stage, _)| stage)
    }

    /// Stage and committed artifacts, as persisted between turns.
    pub fn progress(&self) -> WorkflowProgress {
        WorkflowProgress {
            stage: self.workflow_stage,
            campaign_brief: self.campaign_brief.clone(),
            candidates: self.candidates.clone(),
            outreach_drafts: self.outreach_drafts.clone(),
        }
    }
}

/// Workflow position plus the artifacts committed so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub stage: Option<Stage>,
    #[serde(default)]
    pub campaign_brief: Option<CampaignBrief>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub outreach_drafts: Vec<OutreachDraft>,
}

/// Lifecycle of an agent within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Active,
    Completed,
}

/// State private to one agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentContext {
    pub status: AgentStatus,
    ledger: ExtractionLedger,
}

impl AgentContext {
    pub fn add_extraction(
        &mut self,
        field: impl Into<String>,
        value: serde_json::Value,
        message_id: Uuid,
        source: ExtractionSource,
    ) -> &ExtractionRecord {
        self.ledger.add(field, value, message_id, source)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.ledger.has_field(field)
    }

    pub fn get_field(&self, field: &str) -> Option<&serde_json::Value> {
        self.ledger.get_field(field)
    }

    pub fn extracted_fields(&self) -> &BTreeMap<String, serde_json::Value> {
        self.ledger.extracted_fields()
    }

    pub fn ledger(&self) -> &ExtractionLedger {
        &self.ledger
    }
}

/// Aggregate root for one session's mutable state.
#[derive(Debug, Clone)]
pub struct SessionMemory {
    session: Session,
    shared: SharedContext,
    agents: BTreeMap<AgentKind, AgentContext>,
    transitions: Vec<StageTransition>,
}

impl SessionMemory {
    pub fn new(session: Session) -> Self {
        let shared = SharedContext {
            user_profile: UserProfile {
                user_id: session.user_id.clone(),
                ..Default::default()
            },
            ..Default::default()
        };
        Self {
            session,
            shared,
            agents: BTreeMap::new(),
            transitions: Vec::new(),
        }
    }

    /// Rebuild memory from persisted state.
    ///
    /// A stored stage whose prerequisites are missing is pulled back to the
    /// earliest unmet stage. Private agent contexts are not persisted.
    pub fn restore(
        session: Session,
        business_record: Option<BusinessRecord>,
        progress: WorkflowProgress,
        messages: Vec<Message>,
    ) -> Self {
        let mut memory = Self::new(session);
        let shared = &mut memory.shared;
        shared.business_record = business_record;
        shared.campaign_brief = progress.campaign_brief;
        shared.candidates = progress.candidates;
        shared.outreach_drafts = progress.outreach_drafts;
        shared.messages = messages;

        let stage = progress
            .stage
            .map(|stage| shared.first_unmet_prerequisite(stage).unwrap_or(stage));
        if stage != progress.stage {
            tracing::warn!(
                session_id = %memory.session.session_id,
                stored = %crate::session::stage::stage_label(progress.stage),
                restored = %crate::session::stage::stage_label(stage),
                "Restored stage lacked prerequisites; redirected"
            );
        }
        shared.workflow_stage = stage;
        memory
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Read-only view of the shared context.
    pub fn shared(&self) -> &SharedContext {
        &self.shared
    }

    /// One agent's private context, if it has been touched.
    pub fn agent_context(&self, agent: AgentKind) -> Option<&AgentContext> {
        self.agents.get(&agent)
    }

    /// Mutable access scoped to a single agent.
    pub fn agent_context_mut(&mut self, agent: AgentKind) -> &mut AgentContext {
        self.agents.entry(agent).or_default()
    }

    pub fn add_extraction(
        &mut self,
        agent: AgentKind,
        field: impl Into<String>,
        value: serde_json::Value,
        message_id: Uuid,
        source: ExtractionSource,
    ) {
        self.agent_context_mut(agent)
            .add_extraction(field, value, message_id, source);
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.shared.metadata.insert(key.into(), value.into());
    }

    pub fn set_user_profile(&mut self, profile: UserProfile) {
        self.shared.user_profile = profile;
    }

    /// Stage changes observed in this process, oldest first.
    pub fn transitions(&self) -> &[StageTransition] {
        &self.transitions
    }

    pub(crate) fn shared_mut(&mut self) -> &mut SharedContext {
        &mut self.shared
    }

    pub(crate) fn record_transition(&mut self, transition: StageTransition) {
        self.shared.set_stage(transition.to);
        self.transitions.push(transition);
    }
}
