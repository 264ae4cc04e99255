//! Configuration Management
//!
//! Settings come from `config.yaml` in the user config directory, then the
//! `ARM_*` environment variables, then command line flags.

use crate::backend::{aad, msgraph, Generation};
use crate::reconcile::ReplicationPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";

/// API root and version for one backend generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub endpoint: String,
    pub api_version: String,
}

/// Backoff for the post-create wait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            max_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Pre-issued bearer token; takes precedence over client credentials
    pub access_token: Option<String>,
    pub generation: Generation,
    pub aad_graph: ApiEndpoint,
    pub ms_graph: ApiEndpoint,
    pub login_endpoint: String,
    pub user_agent: Option<String>,
    pub request_timeout_secs: u64,
    pub create_timeout_secs: u64,
    pub backoff: Backoff,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tenant_id: None,
            client_id: None,
            client_secret: None,
            access_token: None,
            generation: Generation::default(),
            aad_graph: ApiEndpoint {
                endpoint: aad::DEFAULT_ENDPOINT.to_string(),
                api_version: aad::DEFAULT_API_VERSION.to_string(),
            },
            ms_graph: ApiEndpoint {
                endpoint: msgraph::DEFAULT_ENDPOINT.to_string(),
                api_version: msgraph::DEFAULT_API_VERSION.to_string(),
            },
            login_endpoint: DEFAULT_LOGIN_ENDPOINT.to_string(),
            user_agent: None,
            request_timeout_secs: 60,
            create_timeout_secs: 5 * 60,
            backoff: Backoff::default(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dirrecon").join("config.yaml"))
    }

    /// Load configuration from the default location, then apply the
    /// environment. A missing file means defaults.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from `path`. JSON files parse too.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Override settings from `ARM_*` variables, read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = non_empty("ARM_TENANT_ID") {
            self.tenant_id = Some(v);
        }
        if let Some(v) = non_empty("ARM_CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = non_empty("ARM_CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
        if let Some(v) = non_empty("ARM_ACCESS_TOKEN") {
            self.access_token = Some(v);
        }
        if let Some(v) = non_empty("ARM_USE_MSGRAPH") {
            match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.generation = Generation::MsGraph,
                "0" | "false" | "no" => self.generation = Generation::AadGraph,
                other => tracing::warn!("Ignoring ARM_USE_MSGRAPH={:?}", other),
            }
        }
    }

    /// Endpoint settings of the selected generation
    pub fn effective_api(&self) -> &ApiEndpoint {
        match self.generation {
            Generation::AadGraph => &self.aad_graph,
            Generation::MsGraph => &self.ms_graph,
        }
    }

    pub fn effective_tenant(&self) -> &str {
        self.tenant_id.as_deref().unwrap_or_default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn replication_policy(&self) -> ReplicationPolicy {
        ReplicationPolicy {
            initial: Duration::from_millis(self.backoff.initial_ms),
            max: Duration::from_millis(self.backoff.max_ms),
            multiplier: self.backoff.multiplier,
            timeout: Duration::from_secs(self.create_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load_from(Path::new("/nonexistent/dirrecon/config.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "tenant_id: t1\ngeneration: ms_graph\nbackoff:\n  initial_ms: 250\n",
        )
        .unwrap();

        assert_eq!(config.effective_tenant(), "t1");
        assert_eq!(config.generation, Generation::MsGraph);
        assert_eq!(config.effective_api().endpoint, "https://graph.microsoft.com");
        assert_eq!(config.backoff.initial_ms, 250);
        assert_eq!(config.backoff.max_ms, 10_000);
    }

    #[test]
    fn test_json_parses_as_yaml() {
        let config: Config =
            serde_yaml::from_str(r#"{"client_id": "c1", "create_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.client_id.as_deref(), Some("c1"));
        assert_eq!(config.replication_policy().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ARM_TENANT_ID", "env-tenant"),
            ("ARM_CLIENT_SECRET", ""),
            ("ARM_USE_MSGRAPH", "true"),
        ]);
        let mut config = Config {
            tenant_id: Some("file-tenant".to_string()),
            client_secret: Some("file-secret".to_string()),
            ..Config::default()
        };

        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.effective_tenant(), "env-tenant");
        // Empty variables do not clear file settings
        assert_eq!(config.client_secret.as_deref(), Some("file-secret"));
        assert_eq!(config.generation, Generation::MsGraph);
    }
}
