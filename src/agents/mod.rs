//! Agent invocation — the seam to the external conversational agents.
//!
//! This crate never interprets free text itself. Each specialized agent is
//! reached through an [`AgentInvoker`], which returns the reply text plus any
//! structured fields the agent reports having derived.

pub mod http;

pub use http::HttpAgentInvoker;

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::session::context::Message;
use crate::session::ledger::ExtractionSource;
use crate::session::stage::Stage;

/// The specialized agents of the pipeline, one per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Onboarding,
    Brief,
    Discovery,
    Outreach,
    Assembly,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::Brief => "brief",
            Self::Discovery => "discovery",
            Self::Outreach => "outreach",
            Self::Assembly => "assembly",
        }
    }

    /// The stage this agent owns.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Onboarding => Stage::Onboarding,
            Self::Brief => Stage::Brief,
            Self::Discovery => Stage::Discovery,
            Self::Outreach => Stage::Outreach,
            Self::Assembly => Stage::Assembly,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Stage>()
            .map(|stage| stage.owner())
            .map_err(|_| format!("unknown agent: {s}"))
    }
}

/// A field the agent reports having derived during its turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedExtraction {
    pub field: String,
    pub value: serde_json::Value,
    #[serde(default = "default_source")]
    pub source: ExtractionSource,
}

fn default_source() -> ExtractionSource {
    ExtractionSource::UserInput
}

/// What an agent sent back for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Free text, optionally followed by a completion block.
    pub text: String,
    #[serde(default)]
    pub extractions: Vec<ReportedExtraction>,
}

impl AgentReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extractions: Vec::new(),
        }
    }

    pub fn with_extraction(
        mut self,
        field: impl Into<String>,
        value: serde_json::Value,
        source: ExtractionSource,
    ) -> Self {
        self.extractions.push(ReportedExtraction {
            field: field.into(),
            value,
            source,
        });
        self
    }
}

/// External agent-invocation collaborator.
///
/// Calls may take several seconds. Timeouts are the implementation's
/// responsibility and must surface as an `AgentError`.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        agent: AgentKind,
        enriched_text: &str,
        history: &[Message],
    ) -> Result<AgentReply, AgentError>;
}
