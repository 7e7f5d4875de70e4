pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Name of the rule consulted when no rule matches a model exactly.
pub const DEFAULT_RULE_NAME: &str = "default";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub base_path: String,
    /// Whole-request timeout for upstream calls; `0` disables it so long
    /// streams are never cut by the relay itself.
    #[serde(default)]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            base_path: String::new(),
            request_timeout_secs: 0,
            connect_timeout_secs: default_connect_timeout_secs(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
        }
    }
}

/// The single upstream model server requests are relayed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Forward the client's `Authorization` header to the upstream.
    #[serde(default)]
    pub forward_auth: bool,
}

/// Per-model request rewriting and stream transcoding switch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRule {
    /// Exact model name, or [`DEFAULT_RULE_NAME`] for the fallback rule.
    pub match_model: String,
    /// Top-level fields overwritten or added.
    #[serde(default)]
    pub set: serde_json::Map<String, serde_json::Value>,
    /// Fields merged into the request's `extra` object.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Top-level fields removed before `set` is applied.
    #[serde(default)]
    pub unset: Vec<String>,
    #[serde(default)]
    pub enable_toolcallfix: bool,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Upper bound on a buffered, not yet closed invocation span.
    #[serde(default = "default_max_invocation_buffer_bytes")]
    pub max_invocation_buffer_bytes: usize,
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_max_invocation_buffer_bytes() -> usize {
    512 * 1024
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            max_invocation_buffer_bytes: default_max_invocation_buffer_bytes(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub model_rules: Vec<ModelRule>,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl AppConfig {
    /// Rule for `model`: exact match first, then the `default` rule.
    #[must_use]
    pub fn rule_for(&self, model: &str) -> Option<&ModelRule> {
        self.find_rule(model).or_else(|| {
            tracing::debug!("no exact rule for model '{model}', trying '{DEFAULT_RULE_NAME}'");
            self.find_rule(DEFAULT_RULE_NAME)
        })
    }

    fn find_rule(&self, model: &str) -> Option<&ModelRule> {
        self.model_rules
            .iter()
            .find(|rule| rule.match_model == model)
    }
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or [`ConfigError::Validation`]
/// when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}
