use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{self, Body};
use axum::extract::State;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::{completions, health, models};
use crate::error::RelayError;
use crate::observability::log_request;
use crate::state::AppState;

/// Chat requests carry whole conversations; keep the cap generous.
const DEFAULT_BODY_LIMIT_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch {
    Health,
    Models,
    Completions,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// Every request gets one access log line once its response head is ready;
/// for relayed streams the elapsed time is time to first byte.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = route_request(state, base_path.as_ref(), request).await;
    log_request(&method, &path, response.status(), started);
    Ok(response)
}

async fn route_request(state: Arc<AppState>, base_path: &str, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let Some(path) = strip_base_path(parts.uri.path(), base_path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let route = match_route(&parts.method, path);
    let upstream_path = match parts.uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };

    match route {
        RouteMatch::Health => health::health_handler(State(state)).into_response(),
        RouteMatch::Models => match read_request_body(body).await {
            Ok(body_bytes) => models::handler(state, parts, &upstream_path, body_bytes).await,
            Err(response) => response,
        },
        RouteMatch::Completions => match read_request_body(body).await {
            Ok(body_bytes) => completions::handler(state, parts, &upstream_path, body_bytes).await,
            Err(response) => response,
        },
        RouteMatch::MethodNotAllowed => {
            RelayError::MethodNotAllowed(format!("{} {path}", parts.method)).into_response()
        }
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    }
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large (max 32MiB)",
            )
                .into_response()
        })
}

fn match_route(method: &Method, path: &str) -> RouteMatch {
    match path {
        "/" | "/health" => {
            if method == Method::GET {
                RouteMatch::Health
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/v1/models" => RouteMatch::Models,
        "/v1/chat/completions" | "/v1/completions" => {
            if method == Method::POST {
                RouteMatch::Completions
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        _ => RouteMatch::NotFound,
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}
