use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    let toolcallfix_models: Vec<&str> = config
        .model_rules
        .iter()
        .filter(|rule| rule.enable_toolcallfix)
        .map(|rule| rule.match_model.as_str())
        .collect();
    Json(json!({
        "status": "toolcall-relay is running",
        "uptime_secs": state.uptime_secs(),
        "requests_served": state.requests_served(),
        "config": {
            "upstream": config.upstream.base_url,
            "forward_auth": config.upstream.forward_auth,
            "model_rules_count": config.model_rules.len(),
            "toolcallfix_models": toolcallfix_models,
            "features": {
                "log_level": config.features.log_level,
                "max_invocation_buffer_bytes": config.features.max_invocation_buffer_bytes,
            }
        }
    }))
}
