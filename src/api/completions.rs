use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::request::Parts;
use http::Method;
use serde_json::{Map, Value};

use super::common::{ensure_sse_headers, passthrough_body, relay_response};
use crate::error::RelayError;
use crate::rules::{apply_rules, request_model, toolcallfix_enabled};
use crate::state::AppState;
use crate::stream::{relay_transcoded_lines, StreamContext, StreamTranscoder};
use crate::transport::{forward_request_headers, forward_response_headers};

/// Chat and legacy completions: patch the JSON body by model rule, forward
/// it, and transcode the streamed reply when the model asks for it.
pub async fn handler(
    state: Arc<AppState>,
    parts: Parts,
    upstream_path: &str,
    body: Bytes,
) -> Response {
    match proxy_with_json_patch(state, parts, upstream_path, body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn proxy_with_json_patch(
    state: Arc<AppState>,
    parts: Parts,
    upstream_path: &str,
    body: Bytes,
) -> Result<Response, RelayError> {
    let tag = state.next_request();
    let started = Instant::now();

    let mut payload: Map<String, Value> = serde_json::from_slice(&body)
        .map_err(|err| RelayError::InvalidRequest(format!("invalid json body: {err}")))?;
    apply_rules(&state.config, &mut payload);
    let patched = serde_json::to_vec(&payload)
        .map_err(|err| RelayError::Internal(format!("failed to encode patched body: {err}")))?;

    let stream = payload
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let model = request_model(&payload).to_string();

    let mut headers = forward_request_headers(&parts.headers, state.config.upstream.forward_auth);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let upstream = state
        .transport
        .send(Method::POST, upstream_path, headers, Bytes::from(patched))
        .await?;

    let status = upstream.status();
    let transcode = stream && status.is_success() && toolcallfix_enabled(&state.config, &model);
    tracing::info!(
        request_id = %tag.id.simple(),
        path = upstream_path,
        model = %model,
        stream,
        transcode,
        status = status.as_u16(),
        "upstream responded"
    );

    let mut response_headers = forward_response_headers(upstream.headers(), transcode);
    if !transcode {
        return Ok(relay_response(
            status,
            response_headers,
            passthrough_body(upstream),
        ));
    }

    ensure_sse_headers(&mut response_headers);
    let transcoder = StreamTranscoder::new(state.config.features.max_invocation_buffer_bytes);
    let context = StreamContext {
        request_seq: tag.seq,
        model,
        started,
    };
    let body = Body::from_stream(relay_transcoded_lines(
        upstream.bytes_stream(),
        transcoder,
        context,
    ));
    Ok(relay_response(status, response_headers, body))
}
