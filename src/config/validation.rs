use std::collections::HashSet;

use super::{AppConfig, ConfigError};

/// Smallest accepted invocation buffer; anything lower could not hold the
/// markers of a minimal invocation.
const MIN_INVOCATION_BUFFER_BYTES: usize = 64;

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_model_rules(config)?;
    validate_log_level(config)?;
    validate_invocation_buffer(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.port == 0 {
        return Err(validation_err("server.port must be greater than 0"));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let base_url = config.upstream.base_url.trim();
    if base_url.is_empty() {
        return Err(validation_err("upstream.base_url is required"));
    }
    let parsed = url::Url::parse(base_url)
        .map_err(|err| validation_err(format!("upstream.base_url is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    Ok(())
}

fn validate_model_rules(config: &AppConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for rule in &config.model_rules {
        if rule.match_model.trim().is_empty() {
            return Err(validation_err("model_rules: match_model cannot be empty"));
        }
        if !seen.insert(rule.match_model.as_str()) {
            return Err(validation_err(format!(
                "model_rules: duplicate rule for '{}'",
                rule.match_model
            )));
        }
        for key in &rule.unset {
            if key.trim().is_empty() {
                return Err(validation_err(format!(
                    "model_rules '{}': unset contains an empty field name",
                    rule.match_model
                )));
            }
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

fn validate_invocation_buffer(config: &AppConfig) -> Result<(), ConfigError> {
    if config.features.max_invocation_buffer_bytes < MIN_INVOCATION_BUFFER_BYTES {
        return Err(validation_err(format!(
            "features.max_invocation_buffer_bytes must be at least {MIN_INVOCATION_BUFFER_BYTES}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn make_valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            upstream: UpstreamConfig {
                base_url: "http://127.0.0.1:8000".to_string(),
                forward_auth: false,
            },
            model_rules: vec![
                ModelRule {
                    match_model: "glm-4.6".to_string(),
                    enable_toolcallfix: true,
                    ..ModelRule::default()
                },
                ModelRule {
                    match_model: DEFAULT_RULE_NAME.to_string(),
                    ..ModelRule::default()
                },
            ],
            features: FeaturesConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = make_valid_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_base_url() {
        let mut config = make_valid_config();
        config.upstream.base_url = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_non_http_base_url() {
        let mut config = make_valid_config();
        config.upstream.base_url = "ftp://models.internal".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_unparseable_base_url() {
        let mut config = make_valid_config();
        config.upstream.base_url = "not a url".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_rule() {
        let mut config = make_valid_config();
        config.model_rules.push(ModelRule {
            match_model: "glm-4.6".to_string(),
            ..ModelRule::default()
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate rule"));
    }

    #[test]
    fn test_empty_match_model() {
        let mut config = make_valid_config();
        config.model_rules[0].match_model = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_unset_field() {
        let mut config = make_valid_config();
        config.model_rules[0].unset = vec![" ".to_string()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut config = make_valid_config();
        config.features.log_level = "warning".to_string();
        assert!(validate_config(&config).is_ok());
        config.features.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invocation_buffer_lower_bound() {
        let mut config = make_valid_config();
        config.features.max_invocation_buffer_bytes = 8;
        assert!(validate_config(&config).is_err());
        config.features.max_invocation_buffer_bytes = MIN_INVOCATION_BUFFER_BYTES;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_port() {
        let mut config = make_valid_config();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }
}
