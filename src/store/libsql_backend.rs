//! libSQL backend — async `SessionPersistence` implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::agents::AgentKind;
use crate::error::DatabaseError;
use crate::session::context::{Message, Role, Session, WorkflowProgress};
use crate::session::records::BusinessRecord;
use crate::session::stage::Stage;
use crate::store::migrations;
use crate::store::traits::{PersistedSession, SessionPersistence};

/// libSQL database backend.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn load_messages(&self, session_id: &str) -> Result<Vec<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, role, agent, content, created_at FROM session_messages
                 WHERE session_id = ?1 ORDER BY seq ASC",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_messages: {e}")))?
        {
            let id_str: String = row.get(0).unwrap_or_default();
            let role_str: String = row.get(1).unwrap_or_default();
            let agent_str: Option<String> = row.get(2).ok();
            let content: String = row.get(3).unwrap_or_default();
            let created_str: String = row.get(4).unwrap_or_default();
            messages.push(Message {
                message_id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
                role: str_to_role(&role_str),
                content,
                agent: agent_str.and_then(|a| a.parse::<AgentKind>().ok()),
                timestamp: parse_datetime(&created_str),
            });
        }
        Ok(messages)
    }

    async fn load_record(&self, session_id: &str) -> Result<Option<BusinessRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT record FROM business_records WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_record: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_record: {e}")))?;
                let record = serde_json::from_str(&json)
                    .map_err(|e| DatabaseError::Serialization(format!("business record: {e}")))?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_record: {e}"))),
        }
    }

    async fn load_progress(&self, session_id: &str) -> Result<WorkflowProgress, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT stage, artifacts FROM session_progress WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_progress: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let stage_str: Option<String> = row.get(0).ok();
                let artifacts: String = row.get(1).unwrap_or_else(|_| "{}".to_string());
                let mut progress: WorkflowProgress = serde_json::from_str(&artifacts)
                    .map_err(|e| DatabaseError::Serialization(format!("progress: {e}")))?;
                progress.stage = match stage_str {
                    Some(s) => Some(
                        s.parse::<Stage>()
                            .map_err(|e| DatabaseError::Serialization(format!("stage: {e}")))?,
                    ),
                    None => None,
                };
                Ok(progress)
            }
            Ok(None) => Ok(WorkflowProgress::default()),
            Err(e) => Err(DatabaseError::Query(format!("load_progress: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn str_to_role(s: &str) -> Role {
    match s {
        "agent" => Role::Agent,
        _ => Role::User,
    }
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl SessionPersistence for LibSqlBackend {
    async fn save_session(&self, session: &Session) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO sessions (session_id, user_id, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (session_id) DO NOTHING",
                params![
                    session.session_id.as_str(),
                    session.user_id.as_str(),
                    session.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_session: {e}")))?;
        Ok(())
    }

    async fn save_message(&self, session_id: &str, message: &Message) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO session_messages (id, session_id, role, agent, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.message_id.to_string(),
                    session_id,
                    message.role.as_str(),
                    opt_text(message.agent.map(|a| a.as_str())),
                    message.content.as_str(),
                    message.timestamp.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_message: {e}")))?;
        Ok(())
    }

    async fn commit_record(
        &self,
        session_id: &str,
        record: &BusinessRecord,
    ) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(record)
            .map_err(|e| DatabaseError::Serialization(format!("business record: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO business_records (session_id, record, confirmed_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (session_id) DO UPDATE SET record = ?2, confirmed_at = ?3",
                params![session_id, json, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("commit_record: {e}")))?;
        debug!(session_id, "Business record persisted");
        Ok(())
    }

    async fn save_progress(
        &self,
        session_id: &str,
        progress: &WorkflowProgress,
    ) -> Result<(), DatabaseError> {
        let artifacts = serde_json::to_string(progress)
            .map_err(|e| DatabaseError::Serialization(format!("progress: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO session_progress (session_id, stage, artifacts, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (session_id) DO UPDATE SET stage = ?2, artifacts = ?3, updated_at = ?4",
                params![
                    session_id,
                    opt_text(progress.stage.map(|s| s.as_str())),
                    artifacts,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_progress: {e}")))?;
        Ok(())
    }

    async fn load_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PersistedSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, created_at FROM sessions WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_session: {e}")))?;

        let session = match rows.next().await {
            Ok(Some(row)) => {
                let user_id: String = row.get(0).unwrap_or_default();
                let created_str: String = row.get(1).unwrap_or_default();
                Session {
                    session_id: session_id.to_string(),
                    user_id,
                    created_at: parse_datetime(&created_str),
                }
            }
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("load_session: {e}"))),
        };

        Ok(Some(PersistedSession {
            session,
            business_record: self.load_record(session_id).await?,
            progress: self.load_progress(session_id).await?,
            messages: self.load_messages(session_id).await?,
        }))
    }
}
