//! Listing page retrieval (plain HTTP, not browser-driven)

use async_trait::async_trait;
use scout_core::{Result, ScoutError};
use tracing::debug;

/// Source of the listing page text (allows mocking in tests)
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_listing(&self) -> Result<String>;
}

/// GET the listing URL with no extra headers
#[derive(Debug, Clone)]
pub struct HttpListingSource {
    client: reqwest::Client,
    url: String,
}

impl HttpListingSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_listing(&self) -> Result<String> {
        debug!("GET {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ScoutError::Transport(format!("Failed to fetch {}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoutError::Transport(format!(
                "Listing fetch returned {} for {}",
                status, self.url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScoutError::Transport(format!("Failed to read listing body: {}", e)))?;

        debug!("Fetched {} bytes of listing HTML", body.len());
        Ok(body)
    }
}

/// Fixed listing text, or a fixed transport failure
#[derive(Debug, Clone)]
pub struct StaticListing {
    body: std::result::Result<String, String>,
}

impl StaticListing {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: Ok(body.into()),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            body: Err(reason.into()),
        }
    }
}

#[async_trait]
impl ListingSource for StaticListing {
    async fn fetch_listing(&self) -> Result<String> {
        self.body.clone().map_err(ScoutError::Transport)
    }
}
