//! reqwest-backed [`ListingTransport`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tracing::warn;

use crate::harvest::traits::{ListingResponse, ListingTransport, TransportError};
use crate::model::Credential;

/// Header carrying the size of the whole collection.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub credential: Option<Credential>,
    pub verify_tls: bool,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            credential: None,
            verify_tls: true,
            timeout: Duration::from_secs(30),
            user_agent: format!("image-harvester/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP transport applying basic credentials to every request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    credential: Option<Credential>,
}

impl HttpTransport {
    /// Builds the underlying client.
    ///
    /// With `verify_tls` off, certificate checks are skipped and a single
    /// warning is logged here instead of on every request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the HTTP client cannot be created.
    pub fn new(settings: HttpSettings) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(&settings.user_agent);

        if !settings.verify_tls {
            warn!("TLS certificate verification is disabled for registry requests");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::new(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credential: settings.credential,
        })
    }
}

fn total_count(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(TOTAL_COUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

#[async_trait]
impl ListingTransport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<ListingResponse, TransportError> {
        let mut request = self.client.get(url).query(query);
        if let Some(credential) = &self.credential {
            request = request.basic_auth(&credential.username, Some(&credential.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;

        let status = response.status().as_u16();
        let total_count = total_count(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(format!("failed to read response body: {}", e)))?;

        Ok(ListingResponse {
            status,
            total_count,
            body: body.to_vec(),
        })
    }
}
