use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::request::Parts;

use super::common::{passthrough_body, relay_response};
use crate::state::AppState;
use crate::transport::{forward_request_headers, forward_response_headers};

/// Plain passthrough of the model listing, whatever the method.
pub async fn handler(
    state: Arc<AppState>,
    parts: Parts,
    upstream_path: &str,
    body: Bytes,
) -> Response {
    let tag = state.next_request();
    let headers = forward_request_headers(&parts.headers, state.config.upstream.forward_auth);
    let upstream = match state
        .transport
        .send(parts.method, upstream_path, headers, body)
        .await
    {
        Ok(upstream) => upstream,
        Err(err) => return err.into_response(),
    };

    let status = upstream.status();
    tracing::debug!(request_id = %tag.id.simple(), status = status.as_u16(), "models passthrough");
    let headers = forward_response_headers(upstream.headers(), false);
    relay_response(status, headers, passthrough_body(upstream))
}
