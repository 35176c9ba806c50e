//! Browser seams used by the orchestrator (allows mocking in tests)

use async_trait::async_trait;

use crate::error::Result;
use crate::observer::RequestListener;

/// A single browser tab the orchestrator drives
#[async_trait]
pub trait EventPage: Send + Sync {
    /// Navigate and wait for the document to load
    async fn goto(&self, url: &str) -> Result<()>;

    /// Click the first element matching `selector`
    ///
    /// Returns `Ok(false)` when nothing matches.
    async fn activate(&self, selector: &str) -> Result<bool>;

    /// Shut the tab and its browser down
    async fn close(&self) -> Result<()>;
}

/// Starts a browser session with the request listener installed
#[async_trait]
pub trait PageLauncher: Send + Sync {
    type Page: EventPage;

    async fn launch(&self, listener: RequestListener) -> Result<Self::Page>;
}
