use axum::body::Body;
use axum::response::Response;
use http::{HeaderMap, HeaderValue, StatusCode};

/// Build a client response from relayed upstream parts.
pub(crate) fn relay_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Make sure a rewritten event stream is labelled and not cached.
pub(crate) fn ensure_sse_headers(headers: &mut HeaderMap) {
    headers
        .entry(http::header::CONTENT_TYPE)
        .or_insert(HeaderValue::from_static("text/event-stream"));
    headers
        .entry(http::header::CACHE_CONTROL)
        .or_insert(HeaderValue::from_static("no-cache"));
}

/// Stream an upstream body through unchanged, chunk by chunk.
pub(crate) fn passthrough_body(upstream: reqwest::Response) -> Body {
    Body::from_stream(upstream.bytes_stream())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_headers_do_not_override_upstream() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream; charset=utf-8"),
        );
        ensure_sse_headers(&mut headers);
        assert_eq!(
            headers.get(http::header::CONTENT_TYPE).unwrap(),
            "text/event-stream; charset=utf-8"
        );
        assert_eq!(headers.get(http::header::CACHE_CONTROL).unwrap(), "no-cache");
    }

    #[test]
    fn relay_response_keeps_status_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-upstream", HeaderValue::from_static("vllm"));
        let response = relay_response(StatusCode::TOO_MANY_REQUESTS, headers, Body::empty());
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("x-upstream").unwrap(), "vllm");
    }
}
