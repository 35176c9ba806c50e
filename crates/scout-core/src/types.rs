//! Core type definitions for Scout

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::{Result, ScoutError};

/// Site-relative locator for one event page (e.g. `/event/a`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventRef(String);

impl EventRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token embedded in a media-manifest request path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StreamId(String);

impl StreamId {
    /// Returns `None` for an empty identifier
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StreamId {
    type Error = ScoutError;

    fn try_from(id: String) -> Result<Self> {
        Self::new(id).ok_or_else(|| ScoutError::Other("empty stream id".to_string()))
    }
}

impl From<StreamId> for String {
    fn from(id: StreamId) -> Self {
        id.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One resolved event -> stream mapping, as persisted on disk
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamRecord {
    #[serde(rename = "eventUrl")]
    pub event: EventRef,
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
}

impl StreamRecord {
    pub fn new(event: EventRef, stream_id: StreamId) -> Self {
        Self { event, stream_id }
    }
}

/// Absolute root of the target site, without a trailing slash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRoot(String);

impl SiteRoot {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        Self(root.trim_end_matches('/').to_string())
    }

    /// Decode a base64-encoded root URL
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ScoutError::Config(format!("Invalid base64 site root: {}", e)))?;
        let root = String::from_utf8(bytes)
            .map_err(|e| ScoutError::Config(format!("Site root is not UTF-8: {}", e)))?;
        Ok(Self::new(root))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL of an event page
    pub fn join(&self, event: &EventRef) -> String {
        format!("{}{}", self.0, event.as_str())
    }

    /// Strip the root from an absolute URL; other inputs pass through unchanged
    pub fn relativize(&self, url: &str) -> EventRef {
        match url.strip_prefix(self.0.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => EventRef::new(rest),
            _ => EventRef::new(url),
        }
    }
}

impl std::fmt::Display for SiteRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one navigation window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTag {
    /// Monotonic sequence number, starting at 1
    pub seq: u64,
    pub event: EventRef,
}

/// A stream identifier seen while a navigation window was open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub tag: NavigationTag,
    pub stream_id: StreamId,
}

#[derive(Debug, Default)]
struct CorrelationInner {
    last_seq: AtomicU64,
    current: RwLock<Option<NavigationTag>>,
}

/// Links asynchronous network observations to the event being navigated
///
/// Cloning shares the underlying state. The orchestrator opens a window with
/// [`Correlation::begin`] right before navigating and closes it with
/// [`Correlation::finish`]; observers read the tag with [`Correlation::current`].
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    inner: Arc<CorrelationInner>,
}

impl Correlation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new window for `event`, replacing any previous one
    pub fn begin(&self, event: EventRef) -> NavigationTag {
        let seq = self.inner.last_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let tag = NavigationTag { seq, event };
        let mut current = self
            .inner
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Some(tag.clone());
        tag
    }

    /// Close the current window, returning its tag
    pub fn finish(&self) -> Option<NavigationTag> {
        self.inner
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn current(&self) -> Option<NavigationTag> {
        self.inner
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
