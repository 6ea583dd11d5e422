//! Session store — owns every live `SessionMemory`, keyed by session id.
//!
//! Each session sits behind its own async mutex, which is what serializes
//! turns within a session. The map lock is only held for lookup and insert,
//! never across I/O, so sessions never wait on each other. The one exception
//! is [`SessionStore::reset_all`], which holds it until in-flight turns end.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::agents::AgentKind;
use crate::error::FlowError;
use crate::session::context::{AgentContext, Session, SessionMemory, SharedContext};
use crate::store::SessionPersistence;

/// Handle to one session's memory. Holding the lock is holding the turn.
pub type SessionHandle = Arc<Mutex<SessionMemory>>;

/// Manages session memory for the process lifetime.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    persistence: Option<Arc<dyn SessionPersistence>>,
}

impl SessionStore {
    /// Pure in-memory store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            persistence: None,
        }
    }

    /// Store backed by a persistence collaborator.
    pub fn with_persistence(persistence: Arc<dyn SessionPersistence>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            persistence: Some(persistence),
        }
    }

    pub fn persistence(&self) -> Option<&Arc<dyn SessionPersistence>> {
        self.persistence.as_ref()
    }

    /// Get the session's handle, creating (or loading) it on first use.
    ///
    /// Repeated calls with the same id return the same handle until
    /// [`reset_all`](Self::reset_all).
    pub async fn get_or_create(&self, session_id: &str, user_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(session_id) {
            return Arc::clone(handle);
        }

        let memory = self.load_or_new(session_id, user_id).await;

        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(session_id, user_id, "Session created");
                Arc::new(Mutex::new(memory))
            });
        Arc::clone(handle)
    }

    /// Existing handle, without creating one.
    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Snapshot of the shared context.
    pub async fn read_shared(&self, session_id: &str) -> Result<SharedContext, FlowError> {
        let handle = self.require(session_id).await?;
        let memory = handle.lock().await;
        Ok(memory.shared().clone())
    }

    /// Snapshot of one agent's private context.
    pub async fn get_agent_context(
        &self,
        session_id: &str,
        agent: AgentKind,
    ) -> Result<AgentContext, FlowError> {
        let handle = self.require(session_id).await?;
        let memory = handle.lock().await;
        Ok(memory.agent_context(agent).cloned().unwrap_or_default())
    }

    /// Mutate one agent's private context. The closure sees nothing else.
    pub async fn update_agent_context<F, R>(
        &self,
        session_id: &str,
        agent: AgentKind,
        f: F,
    ) -> Result<R, FlowError>
    where
        F: FnOnce(&mut AgentContext) -> R,
    {
        let handle = self.require(session_id).await?;
        let mut memory = handle.lock().await;
        Ok(f(memory.agent_context_mut(agent)))
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every in-memory session and ledger. Persistence is untouched.
    ///
    /// Waits for in-flight turns to release their sessions while holding the
    /// map, so no turn for a reset id can start until the old one has ended.
    pub async fn reset_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let drained: Vec<(String, SessionHandle)> = sessions.drain().collect();
        let cleared = drained.len();
        for (session_id, handle) in drained {
            if handle.try_lock().is_err() {
                debug!(session_id, "Reset waiting for in-flight turn");
                drop(handle.lock().await);
            }
        }
        warn!(cleared, "All in-memory sessions reset");
        cleared
    }

    async fn require(&self, session_id: &str) -> Result<SessionHandle, FlowError> {
        self.get(session_id)
            .await
            .ok_or_else(|| FlowError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    async fn load_or_new(&self, session_id: &str, user_id: &str) -> SessionMemory {
        let Some(persistence) = self.persistence.as_ref() else {
            return SessionMemory::new(Session::new(session_id, user_id));
        };

        match persistence.load_session(session_id).await {
            Ok(Some(prior)) => {
                debug!(
                    session_id,
                    messages = prior.messages.len(),
                    "Session restored from persistence"
                );
                SessionMemory::restore(
                    prior.session,
                    prior.business_record,
                    prior.progress,
                    prior.messages,
                )
            }
            Ok(None) => {
                let session = Session::new(session_id, user_id);
                if let Err(e) = persistence.save_session(&session).await {
                    warn!(session_id, error = %e, "Failed to persist new session; continuing in memory");
                }
                SessionMemory::new(session)
            }
            Err(e) => {
                warn!(session_id, error = %e, "Failed to load session; starting fresh in memory");
                SessionMemory::new(Session::new(session_id, user_id))
            }
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
