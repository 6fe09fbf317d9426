//! Configuration management for Switchboard
//!
//! Settings come from a TOML file (`--config <path>` or `SWITCHBOARD_CONFIG`),
//! fall back to defaults when no file is given, and are then overlaid with
//! environment overrides. The resulting [`SwitchboardConfig`] is passed
//! explicitly to every constructor that needs it.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//!
//! [classifier]
//! model = "gpt-5-nano"
//!
//! [capabilities.metrics]
//! endpoint = "http://obs-mcp.monitoring.svc:8002/mcp"
//! timeout_secs = 20
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Path of the configuration file
pub const ENV_CONFIG_PATH: &str = "SWITCHBOARD_CONFIG";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "OPENAI_MODEL";
pub const ENV_CLASSIFIER_ENDPOINT: &str = "OPENAI_BASE_URL";
pub const ENV_HOST: &str = "BACKEND_HOST";
pub const ENV_PORT: &str = "BACKEND_PORT";
pub const ENV_CORS_ORIGINS: &str = "CORS_ORIGINS";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub server: ServerConfig,
    pub classifier: ClassifierConfig,
    pub capabilities: CapabilitiesConfig,
    pub session: SessionConfig,
    pub docs: DocsConfig,
}

/// Inbound HTTP server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
        }
    }
}

/// OpenAI-compatible chat completion service used for classification
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Base URL; `/chat/completions` is appended
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-5-nano".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// One capability server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub endpoint: String,
    #[serde(default = "default_call_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on tool calls a handler issues per turn
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_call_timeout() -> u64 {
    30
}

fn default_max_calls() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

impl CapabilityConfig {
    fn local(port: u16, max_calls: u32) -> Self {
        Self {
            endpoint: format!("http://localhost:{}/mcp", port),
            timeout_secs: default_call_timeout(),
            max_calls,
            enabled: true,
        }
    }
}

/// Capability servers by name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    pub kubernetes: CapabilityConfig,
    pub metrics: CapabilityConfig,
    pub incidents: CapabilityConfig,
    pub docs: CapabilityConfig,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            kubernetes: CapabilityConfig::local(8001, 1),
            // list_metrics, get_label_names, get_label_values, query
            metrics: CapabilityConfig::local(8002, 4),
            incidents: CapabilityConfig::local(8003, 1),
            docs: CapabilityConfig::local(8004, 1),
        }
    }
}

impl CapabilitiesConfig {
    /// Look up a capability by name
    pub fn get(&self, name: &str) -> Option<&CapabilityConfig> {
        match name {
            "kubernetes" => Some(&self.kubernetes),
            "metrics" => Some(&self.metrics),
            "incidents" => Some(&self.incidents),
            "docs" => Some(&self.docs),
            _ => None,
        }
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut CapabilityConfig> {
        match name {
            "kubernetes" => Some(&mut self.kubernetes),
            "metrics" => Some(&mut self.metrics),
            "incidents" => Some(&mut self.incidents),
            "docs" => Some(&mut self.docs),
            _ => None,
        }
    }

    /// All capabilities with their names, in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &CapabilityConfig)> {
        [
            ("kubernetes", &self.kubernetes),
            ("metrics", &self.metrics),
            ("incidents", &self.incidents),
            ("docs", &self.docs),
        ]
        .into_iter()
    }
}

/// Conversation state retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a conversation is forgotten
    pub ttl_secs: u64,
    /// Turns kept per conversation
    pub max_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_history: 20,
        }
    }
}

/// Documentation search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    /// Prefix added to every search so results stay on the official docs site
    pub site_filter: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            site_filter: "site:docs.redhat.com/en/documentation/openshift_container_platform/4.20"
                .to_string(),
        }
    }
}

impl SwitchboardConfig {
    /// Load configuration.
    ///
    /// Uses `path` if given, else `SWITCHBOARD_CONFIG` if set, else defaults.
    /// Environment overrides are applied last. The result is not validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::load_from_path(&path)?,
            None => {
                debug!("No configuration file given, using defaults");
                Self::default()
            }
        };

        config.merge_env_vars()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Merge overrides from the process environment
    pub fn merge_env_vars(&mut self) -> Result<(), ConfigError> {
        self.merge_env(|var| std::env::var(var).ok())
    }

    /// Merge overrides from an arbitrary variable lookup
    pub fn merge_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        debug!("Merging environment variable overrides");

        if let Some(key) = lookup(ENV_API_KEY) {
            self.classifier.api_key = Some(key);
        }

        if let Some(model) = lookup(ENV_MODEL) {
            debug!("Overriding classifier model from environment: {}", model);
            self.classifier.model = model;
        }

        if let Some(endpoint) = lookup(ENV_CLASSIFIER_ENDPOINT) {
            self.classifier.endpoint = endpoint;
        }

        if let Some(host) = lookup(ENV_HOST) {
            self.server.host = host;
        }

        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_PORT.to_string(),
                value: port.clone(),
            })?;
        }

        if let Some(origins) = lookup(ENV_CORS_ORIGINS) {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }

        for name in ["kubernetes", "metrics", "incidents", "docs"] {
            let var = format!("SWITCHBOARD_{}_ENDPOINT", name.to_uppercase());
            if let Some(endpoint) = lookup(&var) {
                debug!("Overriding {} endpoint from environment: {}", name, endpoint);
                if let Some(capability) = self.capabilities.get_mut(name) {
                    capability.endpoint = endpoint;
                }
            }
        }

        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the classifier key is missing or a value is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.classifier.api_key {
            Some(key) if !key.trim().is_empty() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "{} environment variable is required",
                    ENV_API_KEY
                )));
            }
        }

        if self.capabilities.iter().all(|(_, capability)| !capability.enabled) {
            return Err(ConfigError::Invalid(
                "at least one capability must be enabled".to_string(),
            ));
        }

        for (name, capability) in self.capabilities.iter() {
            if capability.timeout_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "capabilities.{}.timeout_secs must be greater than 0",
                    name
                )));
            }
            if capability.max_calls == 0 {
                return Err(ConfigError::Invalid(format!(
                    "capabilities.{}.max_calls must be greater than 0",
                    name
                )));
            }
        }

        if self.session.ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.session.max_history == 0 {
            return Err(ConfigError::Invalid(
                "session.max_history must be greater than 0".to_string(),
            ));
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SwitchboardConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.capabilities.kubernetes.endpoint, "http://localhost:8001/mcp");
        assert_eq!(config.capabilities.metrics.endpoint, "http://localhost:8002/mcp");
        assert_eq!(config.capabilities.incidents.endpoint, "http://localhost:8003/mcp");
        assert_eq!(config.session.ttl_secs, 3600);
        assert!(config.docs.site_filter.starts_with("site:docs.redhat.com"));
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = SwitchboardConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let mut config = SwitchboardConfig::default();
        config.classifier.api_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SwitchboardConfig::default();
        config
            .merge_env(lookup(&[
                ("OPENAI_API_KEY", "sk-env"),
                ("OPENAI_MODEL", "gpt-4o-mini"),
                ("BACKEND_PORT", "9000"),
                ("CORS_ORIGINS", "http://a.example, http://b.example"),
                ("SWITCHBOARD_METRICS_ENDPOINT", "http://obs:8002/mcp"),
            ]))
            .unwrap();

        assert_eq!(config.classifier.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.classifier.model, "gpt-4o-mini");
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.server.cors_origins,
            vec!["http://a.example".to_string(), "http://b.example".to_string()]
        );
        assert_eq!(config.capabilities.metrics.endpoint, "http://obs:8002/mcp");
        assert_eq!(config.capabilities.kubernetes.endpoint, "http://localhost:8001/mcp");
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = SwitchboardConfig::default();
        let err = config.merge_env(lookup(&[("BACKEND_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[classifier]
api_key = "sk-file"

[capabilities.incidents]
endpoint = "http://cluster-health:8085/mcp"
enabled = false
"#
        )
        .unwrap();

        let config = SwitchboardConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.classifier.api_key.as_deref(), Some("sk-file"));
        assert_eq!(config.classifier.model, "gpt-5-nano");
        assert_eq!(config.capabilities.incidents.endpoint, "http://cluster-health:8085/mcp");
        assert!(!config.capabilities.incidents.enabled);
        assert_eq!(config.capabilities.incidents.timeout_secs, 30);
        assert!(config.capabilities.metrics.enabled);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = ClassifierConfig::default();
        config.api_key = Some("sk-secret".to_string());
        assert!(!format!("{:?}", config).contains("sk-secret"));
    }
}
