//! Plain HTTP retrieval of authorized_keys text.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{AkdError, Result};

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of a key payload addressed by URL
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Fetch the body at `url`. Any status of 400 or above is an error.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpKeyFetcher {
    client: reqwest::Client,
}

impl HttpKeyFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    /// Build a fetcher whose requests give up after `timeout`.
    ///
    /// Fails rather than fall back to a client without the timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("akd-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AkdError::Fetch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching keys from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AkdError::Fetch(e.to_string()))?;

        let status = response.status();
        info!("Got HTTP status {} from {}", status, url);
        if status.as_u16() >= 400 {
            return Err(AkdError::Fetch(format!(
                "HTTP error {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AkdError::Fetch(format!("Failed to read response: {}", e)))?;
        Ok(body.to_vec())
    }
}
