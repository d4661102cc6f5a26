//! Shared HTTP client
//!
//! Per-attempt deadlines are enforced by [`crate::retry::RetryPolicy`], so the
//! client itself only bounds connection setup.

use std::time::Duration;

use crate::error::{RepoError, Result};

/// Identifier sent with every request unless overridden in the config
pub const USER_AGENT: &str = concat!("apkhub/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin wrapper over `reqwest::Client` mapping statuses onto [`RepoError`]
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client, optionally overriding the User-Agent
    pub fn new(user_agent: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.unwrap_or(USER_AGENT))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }

    /// GET a URL, failing on any non-2xx status
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RepoError::HttpError {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }

    /// Fetch a whole response body
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
