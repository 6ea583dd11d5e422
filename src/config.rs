//! Configuration types.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_HISTORY_WINDOW: usize = 40;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Base URL of the agent service.
    pub agent_url: String,
    /// Bearer token for the agent service.
    pub agent_api_key: Option<SecretString>,
    /// Per-invocation timeout.
    pub agent_timeout: Duration,
    /// Most recent messages forwarded to an agent (0 = all).
    pub history_window: usize,
    /// libSQL file. Unset means memory only.
    pub db_path: Option<PathBuf>,
    /// Mount the admin reset route.
    pub admin_routes: bool,
}

impl FlowConfig {
    /// Load from `CAMPAIGN_FLOW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = get("CAMPAIGN_FLOW_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CAMPAIGN_FLOW_BIND_ADDR".to_string(),
                message: e.to_string(),
            })?;

        let agent_url = get("CAMPAIGN_FLOW_AGENT_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("CAMPAIGN_FLOW_AGENT_URL".to_string()))?;

        let agent_timeout = match get("CAMPAIGN_FLOW_AGENT_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("CAMPAIGN_FLOW_AGENT_TIMEOUT_SECS", &raw)?),
            None => Duration::from_secs(DEFAULT_AGENT_TIMEOUT_SECS),
        };

        let history_window = match get("CAMPAIGN_FLOW_HISTORY_WINDOW") {
            Some(raw) => parse_number("CAMPAIGN_FLOW_HISTORY_WINDOW", &raw)?,
            None => DEFAULT_HISTORY_WINDOW,
        };

        let admin_routes = match get("CAMPAIGN_FLOW_ADMIN_ROUTES") {
            Some(raw) => parse_bool("CAMPAIGN_FLOW_ADMIN_ROUTES", &raw)?,
            None => false,
        };

        Ok(Self {
            bind_addr,
            agent_url,
            agent_api_key: get("CAMPAIGN_FLOW_AGENT_API_KEY").map(SecretString::from),
            agent_timeout,
            history_window,
            db_path: get("CAMPAIGN_FLOW_DB_PATH").map(PathBuf::from),
            admin_routes,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<FlowConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FlowConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_with_only_agent_url() {
        let config = load(&[("CAMPAIGN_FLOW_AGENT_URL", "http://agents:9000")]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.agent_url, "http://agents:9000");
        assert!(config.agent_api_key.is_none());
        assert_eq!(config.agent_timeout, Duration::from_secs(60));
        assert_eq!(config.history_window, 40);
        assert!(config.db_path.is_none());
        assert!(!config.admin_routes);
    }

    #[test]
    fn agent_url_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "CAMPAIGN_FLOW_AGENT_URL"));

        let err = load(&[("CAMPAIGN_FLOW_AGENT_URL", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn all_values_parsed() {
        let config = load(&[
            ("CAMPAIGN_FLOW_AGENT_URL", "http://agents:9000"),
            ("CAMPAIGN_FLOW_BIND_ADDR", "127.0.0.1:3000"),
            ("CAMPAIGN_FLOW_AGENT_API_KEY", "sk-test"),
            ("CAMPAIGN_FLOW_AGENT_TIMEOUT_SECS", "15"),
            ("CAMPAIGN_FLOW_HISTORY_WINDOW", "0"),
            ("CAMPAIGN_FLOW_DB_PATH", "./data/flow.db"),
            ("CAMPAIGN_FLOW_ADMIN_ROUTES", "yes"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.agent_api_key.unwrap().expose_secret(), "sk-test");
        assert_eq!(config.agent_timeout, Duration::from_secs(15));
        assert_eq!(config.history_window, 0);
        assert_eq!(config.db_path, Some(PathBuf::from("./data/flow.db")));
        assert!(config.admin_routes);
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = load(&[
            ("CAMPAIGN_FLOW_AGENT_URL", "http://agents:9000"),
            ("CAMPAIGN_FLOW_AGENT_TIMEOUT_SECS", "soon"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("CAMPAIGN_FLOW_AGENT_TIMEOUT_SECS"));

        let err = load(&[
            ("CAMPAIGN_FLOW_AGENT_URL", "http://agents:9000"),
            ("CAMPAIGN_FLOW_ADMIN_ROUTES", "maybe"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("CAMPAIGN_FLOW_ADMIN_ROUTES"));
    }
}
