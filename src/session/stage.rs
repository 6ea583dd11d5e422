//! Workflow stage vocabulary and the fixed transition table.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentKind;

/// The phases of the guided workflow.
///
/// Progresses linearly: Onboarding → Brief → Discovery → Outreach →
/// Assembly, after which the session returns to no active stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Onboarding,
    Brief,
    Discovery,
    Outreach,
    Assembly,
}

impl Stage {
    /// All stages in workflow order.
    pub const ALL: [Stage; 5] = [
        Stage::Onboarding,
        Stage::Brief,
        Stage::Discovery,
        Stage::Outreach,
        Stage::Assembly,
    ];

    /// The stage that follows this one. `None` after Assembly.
    pub fn next(&self) -> Option<Stage> {
        use Stage::*;
        match self {
            Onboarding => Some(Brief),
            Brief => Some(Discovery),
            Discovery => Some(Outreach),
            Outreach => Some(Assembly),
            Assembly => None,
        }
    }

    /// Whether completing this stage ends the workflow run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Assembly)
    }

    /// The agent that owns this stage. Every turn while the stage is active
    /// goes to this agent.
    pub fn owner(&self) -> AgentKind {
        match self {
            Self::Onboarding => AgentKind::Onboarding,
            Self::Brief => AgentKind::Brief,
            Self::Discovery => AgentKind::Discovery,
            Self::Outreach => AgentKind::Outreach,
            Self::Assembly => AgentKind::Assembly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::Brief => "brief",
            Self::Discovery => "discovery",
            Self::Outreach => "outreach",
            Self::Assembly => "assembly",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage: {s}"))
    }
}

/// Check an edge against the fixed transition table.
///
/// `None` is the unset state: the only way in is Onboarding and the only way
/// out of Assembly is back to `None`.
pub fn can_transition(from: Option<Stage>, to: Option<Stage>) -> bool {
    use Stage::*;
    matches!(
        (from, to),
        (None, Some(Onboarding))
            | (Some(Onboarding), Some(Brief))
            | (Some(Brief), Some(Discovery))
            | (Some(Discovery), Some(Outreach))
            | (Some(Outreach), Some(Assembly))
            | (Some(Assembly), None)
    )
}

/// Render an optional stage the way logs and prompts show it.
pub fn stage_label(stage: Option<Stage>) -> &'static str {
    stage.map(|s| s.as_str()).unwrap_or("none")
}

/// What caused a stage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionTrigger {
    /// First turn of a session with no business record.
    Start,
    /// Stage-less request routed by the intent classifier.
    Routed { intent: Stage },
    /// Completion signal from the owning agent.
    Signal { agent: AgentKind },
}

/// A stage change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Option<Stage>,
    pub to: Option<Stage>,
    pub trigger: TransitionTrigger,
    pub at: DateTime<Utc>,
}

impl StageTransition {
    pub fn new(from: Option<Stage>, to: Option<Stage>, trigger: TransitionTrigger) -> Self {
        Self {
            from,
            to,
            trigger,
            at: Utc::now(),
        }
    }
}
