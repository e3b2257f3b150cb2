//! Code host HTTP client

use async_trait::async_trait;
use fanout_core::{Repository, RepositorySource, UpstreamError};
use reqwest::{Client, StatusCode, Url};

use crate::config::{UpstreamConfig, FAILURE_RATE_PARAM};
use crate::types::RepositoryEnvelope;

/// Client for the upstream code host API.
///
/// Cheap to clone; the underlying reqwest connection pool is shared.
#[derive(Clone)]
pub struct CodeHostClient {
    client: Client,
    endpoint: Url,
    failure_rate: Option<f64>,
}

impl CodeHostClient {
    /// Create a client from configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| UpstreamError::Transport {
            reason: format!("Failed to build HTTP client: {}", e),
        })?;

        Self::with_client(client, config)
    }

    /// Create a client around an existing reqwest client.
    pub fn with_client(client: Client, config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let endpoint = repository_endpoint(&config.backend_url)?;
        Ok(Self {
            client,
            endpoint,
            failure_rate: config.failure_rate,
        })
    }

    /// The fully-resolved `/repository` URL this client calls.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn repository_endpoint(backend_url: &str) -> Result<Url, UpstreamError> {
    let raw = format!("{}/repository", backend_url.trim_end_matches('/'));
    let url = Url::parse(&raw).map_err(|e| UpstreamError::InvalidUrl {
        url: raw.clone(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(UpstreamError::InvalidUrl {
            url: raw,
            reason: format!("unsupported scheme {}", other),
        }),
    }
}

#[async_trait]
impl RepositorySource for CodeHostClient {
    async fn fetch_repository(&self) -> Result<Repository, UpstreamError> {
        let mut request = self.client.get(self.endpoint.clone());
        if let Some(rate) = self.failure_rate {
            request = request.query(&[(FAILURE_RATE_PARAM, rate)]);
        }

        let response = request.send().await.map_err(|e| UpstreamError::Transport {
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| UpstreamError::Transport {
            reason: format!("reading body: {}", e),
        })?;

        let envelope: RepositoryEnvelope =
            serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode {
                reason: e.to_string(),
            })?;

        tracing::trace!(repository_id = envelope.repository.id, "Fetched repository");
        Ok(envelope.repository)
    }

    fn name(&self) -> &str {
        "code-host"
    }
}

impl std::fmt::Debug for CodeHostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeHostClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("failure_rate", &self.failure_rate)
            .finish()
    }
}
