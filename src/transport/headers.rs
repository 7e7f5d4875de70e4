use http::header::{self, HeaderMap, HeaderName};

/// Connection-scoped headers that a proxy must not forward.
static HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("proxy-connection"),
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[inline]
#[must_use]
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Client request headers to send upstream.
///
/// Hop-by-hop headers and `Host` are dropped, as is `Content-Length` (the
/// body may have been rewritten). `Authorization` is kept only when
/// `forward_auth` is set.
#[must_use]
pub fn forward_request_headers(src: &HeaderMap, forward_auth: bool) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(src.len());
    for (name, value) in src {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        if name == header::AUTHORIZATION && !forward_auth {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Upstream response headers to send to the client.
///
/// `Content-Length` is dropped when the body is rewritten on the way through.
#[must_use]
pub fn forward_response_headers(src: &HeaderMap, body_rewritten: bool) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(src.len());
    for (name, value) in src {
        if is_hop_by_hop(name) || (body_rewritten && name == header::CONTENT_LENGTH) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
