//! Passive request listener
//!
//! Every outbound request of the session goes through a [`RequestListener`]:
//! the [`StreamObserver`] looks for media-manifest requests and the
//! [`RequestFilter`] decides whether the request may proceed. Manifest
//! requests are never blocked or rewritten.

use regex::Regex;
use scout_core::config::ObserverConfig;
use scout_core::{Correlation, Observation, ScoutError, StreamId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::Result;

/// Recognizes `/<segment>/<id>/<manifest file>` request URLs
#[derive(Debug, Clone)]
pub struct ManifestMatcher {
    regex: Regex,
}

impl ManifestMatcher {
    pub fn new(segment: &str, manifest_file: &str) -> Result<Self> {
        let pattern = format!(
            r"/{}/([^/?#]+)/{}(?:[?#]|$)",
            regex::escape(segment.trim_matches('/')),
            regex::escape(manifest_file)
        );
        let regex = Regex::new(&pattern)
            .map_err(|e| ScoutError::Config(format!("Invalid manifest pattern: {}", e)))?;
        Ok(Self { regex })
    }

    pub fn from_config(config: &ObserverConfig) -> Result<Self> {
        Self::new(&config.manifest_segment, &config.manifest_file)
    }

    /// Stream identifier of a manifest request, `None` for anything else
    pub fn stream_id(&self, url: &str) -> Option<StreamId> {
        self.regex
            .captures(url)
            .and_then(|caps| caps.get(1))
            .and_then(|m| StreamId::new(m.as_str()))
    }
}

/// What the observer made of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// Not a manifest request
    Ignored,
    /// Manifest seen inside an open window and forwarded
    Forwarded(Observation),
    /// Manifest seen while no window was open
    Unattributed(StreamId),
}

/// Extracts stream identifiers and tags them with the open navigation window
///
/// Installed once per browser session. Observations go out on an unbounded
/// channel so the callback never waits on the orchestrator.
#[derive(Debug, Clone)]
pub struct StreamObserver {
    matcher: ManifestMatcher,
    correlation: Correlation,
    tx: mpsc::UnboundedSender<Observation>,
    unattributed: Arc<AtomicU64>,
}

impl StreamObserver {
    pub fn channel(
        matcher: ManifestMatcher,
        correlation: Correlation,
    ) -> (Self, mpsc::UnboundedReceiver<Observation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = Self {
            matcher,
            correlation,
            tx,
            unattributed: Arc::new(AtomicU64::new(0)),
        };
        (observer, rx)
    }

    pub fn observe(&self, url: &str) -> ObserveOutcome {
        let Some(stream_id) = self.matcher.stream_id(url) else {
            return ObserveOutcome::Ignored;
        };

        match self.correlation.current() {
            Some(tag) => {
                info!("Matching stream ID found: {} (event {})", stream_id, tag.event);
                let observation = Observation { tag, stream_id };
                if self.tx.send(observation.clone()).is_err() {
                    debug!("Observation receiver dropped");
                }
                ObserveOutcome::Forwarded(observation)
            }
            None => {
                self.unattributed.fetch_add(1, Ordering::Relaxed);
                debug!("Stream ID {} seen outside any navigation window", stream_id);
                ObserveOutcome::Unattributed(stream_id)
            }
        }
    }

    /// Manifest requests dropped because no window was open
    pub fn unattributed(&self) -> u64 {
        self.unattributed.load(Ordering::Relaxed)
    }
}

/// Unconditional URL block list
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    blocked: Vec<String>,
}

impl RequestFilter {
    pub fn new(blocked: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            blocked: blocked
                .into_iter()
                .map(Into::into)
                .filter(|b: &String| !b.is_empty())
                .collect(),
        }
    }

    pub fn blocks(&self, url: &str) -> bool {
        self.blocked.iter().any(|b| url.contains(b.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    Continue,
    Block,
}

/// Per-session request hook combining the observer and the block list
#[derive(Debug, Clone)]
pub struct RequestListener {
    filter: RequestFilter,
    observer: StreamObserver,
}

impl RequestListener {
    pub fn new(filter: RequestFilter, observer: StreamObserver) -> Self {
        Self { filter, observer }
    }

    pub fn handle(&self, url: &str) -> RequestDecision {
        self.observer.observe(url);

        if self.filter.blocks(url) {
            info!("Blocking request to: {}", url);
            RequestDecision::Block
        } else {
            RequestDecision::Continue
        }
    }

    pub fn observer(&self) -> &StreamObserver {
        &self.observer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::EventRef;

    fn matcher() -> ManifestMatcher {
        ManifestMatcher::new("hls", "index.m3u8").unwrap()
    }

    #[test]
    fn test_manifest_matcher() {
        let m = matcher();
        assert_eq!(
            m.stream_id("https://cdn.example/hls/xyz123/index.m3u8"),
            StreamId::new("xyz123")
        );
        assert_eq!(
            m.stream_id("https://cdn.example/live/hls/ab-9_z/index.m3u8?token=t&exp=1"),
            StreamId::new("ab-9_z")
        );
        assert_eq!(m.stream_id("https://cdn.example/hls/xyz123/seg-001.ts"), None);
        assert_eq!(m.stream_id("https://cdn.example/hls//index.m3u8"), None);
        assert_eq!(m.stream_id("https://cdn.example/hls/index.m3u8"), None);
        assert_eq!(m.stream_id("https://cdn.example/hls/x/index.m3u8.bak"), None);
        assert_eq!(m.stream_id("https://www.google-analytics.com/collect"), None);
    }

    #[test]
    fn test_observe_tags_with_open_window() {
        let correlation = Correlation::new();
        let (observer, mut rx) = StreamObserver::channel(matcher(), correlation.clone());

        let tag = correlation.begin(EventRef::new("/event/a"));
        let outcome = observer.observe("https://cdn.example/hls/xyz123/index.m3u8");

        let expected = Observation {
            tag,
            stream_id: StreamId::new("xyz123").unwrap(),
        };
        assert_eq!(outcome, ObserveOutcome::Forwarded(expected.clone()));
        assert_eq!(rx.try_recv().unwrap(), expected);
    }

    #[test]
    fn test_observe_without_window_is_dropped() {
        let correlation = Correlation::new();
        let (observer, mut rx) = StreamObserver::channel(matcher(), correlation.clone());

        correlation.begin(EventRef::new("/event/a"));
        correlation.finish();

        let outcome = observer.observe("https://cdn.example/hls/late/index.m3u8");
        assert_eq!(
            outcome,
            ObserveOutcome::Unattributed(StreamId::new("late").unwrap())
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(observer.unattributed(), 1);
    }

    #[test]
    fn test_observe_ignores_other_requests() {
        let (observer, mut rx) = StreamObserver::channel(matcher(), Correlation::new());
        assert_eq!(
            observer.observe("https://example.test/app.js"),
            ObserveOutcome::Ignored
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(observer.unattributed(), 0);
    }

    #[test]
    fn test_request_filter() {
        let filter = RequestFilter::new(["google-analytics.com", ""]);
        assert!(filter.blocks("https://www.google-analytics.com/g/collect?v=2"));
        assert!(!filter.blocks("https://example.test/event/a"));
        assert!(!RequestFilter::default().blocks("https://www.google-analytics.com/"));
    }

    #[test]
    fn test_listener_never_blocks_manifests() {
        let correlation = Correlation::new();
        let (observer, mut rx) = StreamObserver::channel(matcher(), correlation.clone());
        let listener = RequestListener::new(RequestFilter::new(["google-analytics.com"]), observer);

        correlation.begin(EventRef::new("/event/a"));
        assert_eq!(
            listener.handle("https://cdn.example/hls/xyz123/index.m3u8"),
            RequestDecision::Continue
        );
        assert_eq!(
            listener.handle("https://www.google-analytics.com/collect"),
            RequestDecision::Block
        );
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
