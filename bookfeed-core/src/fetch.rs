//! Mirror download transport

use crate::error::FetchError;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Identifies the tool to mirror operators
pub const DEFAULT_USER_AGENT: &str = "bookfeed OPDS creator";

/// Per-request timeout so one dead mirror cannot stall a catalog
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Fetch a mirror's bytes
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetcher for `http`, `https` and `file` locations
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the given per-request timeout and user agent
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let url = Url::parse(location).map_err(|_| FetchError::InvalidLocation(location.to_string()))?;

        match url.scheme() {
            "http" | "https" => {
                let response = self.client.get(url).send().await?.error_for_status()?;
                Ok(response.bytes().await?.to_vec())
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| FetchError::InvalidLocation(location.to_string()))?;
                Ok(tokio::fs::read(path).await?)
            }
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }
}
