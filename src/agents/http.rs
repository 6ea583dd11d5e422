//! HTTP client for a remote agent service.
//!
//! Posts `{agent, input, history}` to `{base_url}/agents/{agent}/invoke` and
//! expects an [`AgentReply`] JSON body back.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use super::{AgentInvoker, AgentKind, AgentReply};
use crate::error::AgentError;
use crate::session::context::Message;

#[derive(Serialize)]
struct InvokeRequest<'a> {
    agent: AgentKind,
    input: &'a str,
    history: Vec<HistoryEntry<'a>>,
}

#[derive(Serialize)]
struct HistoryEntry<'a> {
    role: &'static str,
    content: &'a str,
}

/// Agent invoker backed by a JSON-over-HTTP agent service.
pub struct HttpAgentInvoker {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
    history_window: usize,
}

impl HttpAgentInvoker {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
        history_window: usize,
    ) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::RequestFailed {
                agent: "*".to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
            history_window,
        })
    }

    fn endpoint(&self, agent: AgentKind) -> String {
        format!("{}/agents/{}/invoke", self.base_url, agent)
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentInvoker {
    async fn invoke(
        &self,
        agent: AgentKind,
        enriched_text: &str,
        history: &[Message],
    ) -> Result<AgentReply, AgentError> {
        // 0 forwards the whole history.
        let start = match self.history_window {
            0 => 0,
            window => history.len().saturating_sub(window),
        };
        let body = InvokeRequest {
            agent,
            input: enriched_text,
            history: history[start..]
                .iter()
                .map(|m| HistoryEntry {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };

        let mut request = self.client.post(self.endpoint(agent)).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        debug!(agent = %agent, history = body.history.len(), "Invoking agent");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::Timeout {
                    agent: agent.to_string(),
                    timeout: self.timeout,
                }
            } else {
                AgentError::RequestFailed {
                    agent: agent.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Status {
                agent: agent.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<AgentReply>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout {
                        agent: agent.to_string(),
                        timeout: self.timeout,
                    }
                } else {
                    AgentError::InvalidResponse {
                        agent: agent.to_string(),
                        reason: e.to_string(),
                    }
                }
            })
    }
}
