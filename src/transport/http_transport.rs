use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::RelayError;

fn build_reqwest_client(config: &ServerConfig) -> Result<reqwest::Client, RelayError> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };

    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy();
    // Streams may legitimately run for minutes; 0 leaves them unbounded.
    if config.request_timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
    }

    builder
        .build()
        .map_err(|err| RelayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client for the single configured upstream.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build the pooled client from server settings.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if the client cannot be built.
    pub fn new(server: &ServerConfig, upstream: &UpstreamConfig) -> Result<Self, RelayError> {
        Ok(Self {
            client: build_reqwest_client(server)?,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute upstream URL for a request path (with query, if any).
    #[must_use]
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        let mut url = String::with_capacity(self.base_url.len() + path_and_query.len() + 1);
        url.push_str(&self.base_url);
        if !path_and_query.starts_with('/') {
            url.push('/');
        }
        url.push_str(path_and_query);
        url
    }

    /// Send one request upstream and return the response with its body unread.
    ///
    /// Non-2xx statuses are returned as responses, not errors, so callers can
    /// relay them to the client unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when the upstream cannot be reached.
    pub async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, RelayError> {
        let url = self.upstream_url(path_and_query);
        tracing::debug!(%method, url = %url, body_bytes = body.len(), "forwarding request upstream");
        let mut request = self.client.request(method, url.as_str()).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }
        request
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(url = %url, error = %err, "upstream request failed");
                RelayError::Transport(format!("Upstream request failed: {err}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base_url: &str) -> HttpTransport {
        HttpTransport::new(
            &ServerConfig::default(),
            &UpstreamConfig {
                base_url: base_url.to_string(),
                forward_auth: false,
            },
        )
        .unwrap()
    }

    #[test]
    fn upstream_url_joins_without_double_slash() {
        let transport = transport("http://127.0.0.1:8000/");
        assert_eq!(
            transport.upstream_url("/v1/chat/completions"),
            "http://127.0.0.1:8000/v1/chat/completions"
        );
        assert_eq!(
            transport.upstream_url("/v1/models?x=1"),
            "http://127.0.0.1:8000/v1/models?x=1"
        );
    }

    #[test]
    fn upstream_url_keeps_base_path_prefix() {
        let transport = transport("http://gpu-box:8000/vllm");
        assert_eq!(
            transport.upstream_url("/v1/models"),
            "http://gpu-box:8000/vllm/v1/models"
        );
    }

    #[tokio::test]
    async fn unreachable_upstream_is_transport_error() {
        let transport = transport("http://127.0.0.1:1");
        let err = transport
            .send(Method::GET, "/v1/models", HeaderMap::new(), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }
}
