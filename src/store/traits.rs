//! `SessionPersistence` trait — the optional durable backing for sessions.
//!
//! The coordinator stays correct without any persistence; every write here is
//! best-effort from its point of view.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::session::context::{Message, Session, WorkflowProgress};
use crate::session::records::BusinessRecord;

/// Prior state of a session, as loaded from storage.
#[derive(Debug, Clone)]
pub struct PersistedSession {
    pub session: Session,
    pub business_record: Option<BusinessRecord>,
    pub progress: WorkflowProgress,
    pub messages: Vec<Message>,
}

/// Backend-agnostic persistence for session state.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    /// Record a session's identity. Idempotent.
    async fn save_session(&self, session: &Session) -> Result<(), DatabaseError>;

    /// Append one message to a session's history.
    async fn save_message(&self, session_id: &str, message: &Message) -> Result<(), DatabaseError>;

    /// Store the confirmed business record.
    async fn commit_record(
        &self,
        session_id: &str,
        record: &BusinessRecord,
    ) -> Result<(), DatabaseError>;

    /// Store the current stage and committed artifacts.
    async fn save_progress(
        &self,
        session_id: &str,
        progress: &WorkflowProgress,
    ) -> Result<(), DatabaseError>;

    /// Load prior state, if the session was seen before.
    async fn load_session(&self, session_id: &str)
    -> Result<Option<PersistedSession>, DatabaseError>;
}
