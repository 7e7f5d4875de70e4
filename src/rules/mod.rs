//! Per-model request rewriting and feature switches.

use serde_json::{Map, Value};

use crate::config::AppConfig;

/// `extra` object that rule-provided vendor parameters are merged into.
pub const EXTRA_FIELD: &str = "extra";

/// Model name of a request body, or `""` when absent or not a string.
#[must_use]
pub fn request_model(body: &Map<String, Value>) -> &str {
    body.get("model").and_then(Value::as_str).unwrap_or_default()
}

/// Apply the rule for the body's model in place.
///
/// Fields listed in `unset` are removed first, then `set` overwrites
/// top-level fields, then `extra` is merged into the body's `extra` object,
/// which is created when missing or not an object.
pub fn apply_rules(config: &AppConfig, body: &mut Map<String, Value>) {
    let model = request_model(body).to_string();
    let Some(rule) = config.rule_for(&model) else {
        tracing::debug!(model = %model, "no rule matched; body left unchanged");
        return;
    };
    tracing::debug!(
        model = %model,
        rule = %rule.match_model,
        unset = rule.unset.len(),
        set = rule.set.len(),
        extra = rule.extra.len(),
        "applying request rule"
    );

    for key in &rule.unset {
        body.remove(key);
    }
    for (key, value) in &rule.set {
        body.insert(key.clone(), value.clone());
    }
    if rule.extra.is_empty() {
        return;
    }

    let extra = body
        .entry(EXTRA_FIELD)
        .or_insert_with(|| Value::Object(Map::new()));
    if !extra.is_object() {
        *extra = Value::Object(Map::new());
    }
    if let Value::Object(extra) = extra {
        for (key, value) in &rule.extra {
            extra.insert(key.clone(), value.clone());
        }
    }
}

/// Whether streamed responses for `model` go through the transcoder.
///
/// Exact rule first, then the `default` rule; disabled when neither exists.
#[must_use]
pub fn toolcallfix_enabled(config: &AppConfig, model: &str) -> bool {
    let enabled = config
        .rule_for(model)
        .is_some_and(|rule| rule.enable_toolcallfix);
    tracing::debug!(model, enabled, "toolcallfix decision");
    enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use serde_json::json;

    fn config() -> AppConfig {
        parse_config(
            r#"
upstream:
  base_url: http://127.0.0.1:8000
model_rules:
  - match_model: glm-4.6
    enable_toolcallfix: true
    unset: [top_k]
    set:
      temperature: 0.6
      top_k: 40
    extra:
      chat_template_kwargs_mode: thinking
  - match_model: default
    enable_toolcallfix: false
    set:
      max_tokens: 1024
"#,
        )
        .unwrap()
    }

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn unset_then_set_then_merge_extra() {
        let mut request = body(json!({"model": "glm-4.6", "top_k": 5, "stream": true}));
        apply_rules(&config(), &mut request);
        assert_eq!(request["temperature"], json!(0.6));
        assert_eq!(request["top_k"], json!(40));
        assert_eq!(request["stream"], json!(true));
        assert_eq!(request["extra"], json!({"chat_template_kwargs_mode": "thinking"}));
    }

    #[test]
    fn extra_merges_into_existing_object() {
        let mut request = body(json!({"model": "glm-4.6", "extra": {"keep": 1}}));
        apply_rules(&config(), &mut request);
        assert_eq!(
            request["extra"],
            json!({"keep": 1, "chat_template_kwargs_mode": "thinking"})
        );
    }

    #[test]
    fn non_object_extra_is_replaced() {
        let mut request = body(json!({"model": "glm-4.6", "extra": "junk"}));
        apply_rules(&config(), &mut request);
        assert_eq!(request["extra"], json!({"chat_template_kwargs_mode": "thinking"}));
    }

    #[test]
    fn unknown_model_uses_default_rule() {
        let mut request = body(json!({"model": "other"}));
        apply_rules(&config(), &mut request);
        assert_eq!(request["max_tokens"], json!(1024));
        assert!(request.get("extra").is_none());
    }

    #[test]
    fn missing_model_uses_default_rule() {
        let mut request = body(json!({"messages": []}));
        apply_rules(&config(), &mut request);
        assert_eq!(request["max_tokens"], json!(1024));
    }

    #[test]
    fn toolcallfix_follows_rules() {
        let config = config();
        assert!(toolcallfix_enabled(&config, "glm-4.6"));
        assert!(!toolcallfix_enabled(&config, "other"));
    }

    #[test]
    fn toolcallfix_disabled_without_any_rule() {
        let config = parse_config("upstream:\n  base_url: http://127.0.0.1:8000\n").unwrap();
        assert!(!toolcallfix_enabled(&config, "glm-4.6"));
        let mut request = body(json!({"model": "glm-4.6", "top_k": 5}));
        apply_rules(&config, &mut request);
        assert_eq!(request["top_k"], json!(5));
    }
}
