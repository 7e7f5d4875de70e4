use tracing_subscriber::EnvFilter;

use crate::stream::TranscodeStats;

/// Map a config log level to a tracing filter directive.
///
/// - "DISABLED" -> `None` (no subscriber installed)
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
#[must_use]
pub fn tracing_level_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber with the configured log level.
pub fn init_tracing(log_level: &str) {
    let Some(directive) = tracing_level_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Log the outcome of a transcoded stream once it ends.
pub fn log_stream_complete(
    request_seq: u64,
    model: &str,
    stats: &TranscodeStats,
    start_time: std::time::Instant,
) {
    tracing::info!(
        request_seq,
        model,
        lines_in = stats.lines_in,
        lines_out = stats.lines_out,
        tool_calls = stats.tool_calls,
        parse_failures = stats.parse_failures,
        overflows = stats.overflows,
        elapsed_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX),
        "transcoded stream complete"
    );
}

/// Access log line for one dispatched request.
pub fn log_request(
    method: &http::Method,
    path: &str,
    status: http::StatusCode,
    start_time: std::time::Instant,
) {
    tracing::info!(
        method = %method,
        path,
        status = status.as_u16(),
        elapsed_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX),
        "request handled"
    );
}

#[cfg(test)]
mod tests {
    use super::tracing_level_directive;

    #[test]
    fn maps_config_levels_to_tracing_levels() {
        assert_eq!(tracing_level_directive("warning").as_deref(), Some("WARN"));
        assert_eq!(tracing_level_directive("CRITICAL").as_deref(), Some("ERROR"));
        assert_eq!(tracing_level_directive("debug").as_deref(), Some("DEBUG"));
        assert_eq!(tracing_level_directive("Disabled"), None);
    }
}
