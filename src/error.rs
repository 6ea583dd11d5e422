//! Error types for campaign-flow.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures of the external agent-invocation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent {agent} request failed: {reason}")]
    RequestFailed { agent: String, reason: String },

    #[error("Agent {agent} timed out after {timeout:?}")]
    Timeout { agent: String, timeout: Duration },

    #[error("Agent {agent} returned status {status}")]
    Status { agent: String, status: u16 },

    #[error("Invalid response from agent {agent}: {reason}")]
    InvalidResponse { agent: String, reason: String },
}

/// A completion marker was present but its payload could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("Malformed completion signal from {agent}: {reason}")]
    Malformed { agent: String, reason: String },
}

/// A completion signal the controller refused to apply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("No active stage; signal from {agent} ignored")]
    NoActiveStage { agent: String },

    #[error("Agent {agent} does not own stage {stage}")]
    NotOwner { agent: String, stage: String },

    #[error("Transition {from} -> {to} is not in the table")]
    InvalidEdge { from: String, to: String },
}

/// Turn-level failures surfaced by the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Agent invocation failed: {0}")]
    AgentInvocation(#[from] AgentError),

    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("Turn task for session {session_id} aborted: {reason}")]
    TurnAborted { session_id: String, reason: String },
}

impl FlowError {
    /// Message safe to show an end user. Never names internal components.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::SessionNotFound { .. } => "We couldn't find that conversation.",
            Self::AgentInvocation(_) | Self::TurnAborted { .. } => {
                "Something went wrong on our side. Please try sending your message again."
            }
        }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_internal_names() {
        let err = FlowError::AgentInvocation(AgentError::Timeout {
            agent: "discovery".to_string(),
            timeout: Duration::from_secs(30),
        });
        let msg = err.user_message();
        assert!(!msg.contains("discovery"));
        assert!(!msg.to_lowercase().contains("agent"));
        assert!(msg.contains("try"));
    }

    #[test]
    fn display_keeps_full_taxonomy_for_logs() {
        let err = FlowError::AgentInvocation(AgentError::Status {
            agent: "brief".to_string(),
            status: 503,
        });
        let text = err.to_string();
        assert!(text.contains("brief"));
        assert!(text.contains("503"));
    }
}
