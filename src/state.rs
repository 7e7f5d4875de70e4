mod request_id;

use std::time::Instant;

use crate::config::AppConfig;
use crate::error::RelayError;
use crate::transport::HttpTransport;

use request_id::RequestIdGenerator;

/// Identity of one proxied request for log correlation.
#[derive(Debug, Clone, Copy)]
pub struct RequestTag {
    pub seq: u64,
    pub id: uuid::Uuid,
}

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    request_ids: RequestIdGenerator,
    started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        Self {
            config,
            transport,
            request_ids: RequestIdGenerator::new(),
            started_at: Instant::now(),
        }
    }

    /// Build state with a transport derived from the config.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, RelayError> {
        let transport = HttpTransport::new(&config.server, &config.upstream)?;
        Ok(Self::new(config, transport))
    }

    #[must_use]
    pub fn next_request(&self) -> RequestTag {
        let seq = self.request_ids.next_seq();
        RequestTag {
            seq,
            id: self.request_ids.request_uuid(seq),
        }
    }

    #[must_use]
    pub fn requests_served(&self) -> u64 {
        self.request_ids.issued()
    }

    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
