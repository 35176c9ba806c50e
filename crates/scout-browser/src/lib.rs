//! Browser automation and network observation for Scout
//!
//! This crate drives a single headless Chromium tab through event pages and
//! watches its outbound requests for media manifests.
//!
//! # Architecture
//!
//! - [`browser`]: Chromium lifecycle, request interception, element clicks
//! - [`page`]: the [`EventPage`] / [`PageLauncher`] seams the orchestrator uses
//! - [`navigation`]: bounded-retry navigation state machine
//! - [`observer`]: manifest recognition, correlation tagging, block list
//! - [`mock`]: scriptable in-memory pages for tests
//! - [`error`]: Error types for browser operations
//!
//! # Requirements
//!
//! - Chrome or Chromium installed (found via `CHROME` or the usual paths)

pub mod browser;
pub mod error;
pub mod mock;
pub mod navigation;
pub mod observer;
pub mod page;

// Re-export commonly used types
pub use browser::{BrowserConfig, BrowserSession, ChromeLauncher};
pub use error::{BrowserError, Result};
pub use navigation::{NavigationController, NavigationOutcome, NavigationState};
pub use observer::{
    ManifestMatcher, ObserveOutcome, RequestDecision, RequestFilter, RequestListener,
    StreamObserver,
};
pub use page::{EventPage, PageLauncher};
