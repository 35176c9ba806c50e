//! Scriptable in-memory browser for tests
//!
//! [`MockLauncher`] hands out [`MockPage`]s that share one [`MockScript`].
//! Pages replay the scripted requests through the installed
//! [`RequestListener`], so the real observer and block list run unchanged.

use async_trait::async_trait;
use scout_core::ScoutError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::Result;
use crate::observer::{RequestDecision, RequestListener};
use crate::page::{EventPage, PageLauncher};

#[derive(Debug, Default)]
struct ScriptState {
    failing: HashSet<String>,
    without_playback: HashSet<String>,
    on_load: HashMap<String, Vec<String>>,
    on_play: HashMap<String, Vec<String>>,
    on_play_later: HashMap<String, Vec<(Duration, String)>>,
    fail_launch: bool,

    current: Option<String>,
    navigations: Vec<String>,
    activations: Vec<String>,
    blocked: Vec<String>,
    closed: bool,
}

/// Shared script and call log
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    state: Arc<Mutex<ScriptState>>,
}

impl MockScript {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every navigation to `url` fails
    pub fn fail_navigation(self, url: impl Into<String>) -> Self {
        self.lock().failing.insert(url.into());
        self
    }

    /// `url` has no playback control
    pub fn without_playback(self, url: impl Into<String>) -> Self {
        self.lock().without_playback.insert(url.into());
        self
    }

    /// Requests issued once `url` has loaded
    pub fn on_load(self, url: impl Into<String>, request: impl Into<String>) -> Self {
        self.lock()
            .on_load
            .entry(url.into())
            .or_default()
            .push(request.into());
        self
    }

    /// Requests issued when playback starts on `url`
    pub fn on_play(self, url: impl Into<String>, request: impl Into<String>) -> Self {
        self.lock()
            .on_play
            .entry(url.into())
            .or_default()
            .push(request.into());
        self
    }

    /// Requests issued `after` playback starts on `url`, from a background task
    pub fn on_play_after(
        self,
        url: impl Into<String>,
        after: Duration,
        request: impl Into<String>,
    ) -> Self {
        self.lock()
            .on_play_later
            .entry(url.into())
            .or_default()
            .push((after, request.into()));
        self
    }

    /// Make [`MockLauncher::launch`] fail
    pub fn fail_launch(self) -> Self {
        self.lock().fail_launch = true;
        self
    }

    /// Every `goto` call in order, including retries
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    /// Number of `goto` calls for `url`
    pub fn navigation_count(&self, url: &str) -> usize {
        self.lock().navigations.iter().filter(|n| *n == url).count()
    }

    /// Pages on which playback was started
    pub fn activations(&self) -> Vec<String> {
        self.lock().activations.clone()
    }

    /// Requests the listener refused
    pub fn blocked(&self) -> Vec<String> {
        self.lock().blocked.clone()
    }

    pub fn closed(&self) -> bool {
        self.lock().closed
    }
}

pub struct MockPage {
    script: MockScript,
    listener: RequestListener,
}

impl MockPage {
    fn replay(&self, requests: Vec<String>) {
        replay(&self.script, &self.listener, requests);
    }
}

fn replay(script: &MockScript, listener: &RequestListener, requests: Vec<String>) {
    for request in requests {
        if listener.handle(&request) == RequestDecision::Block {
            script.lock().blocked.push(request);
        }
    }
}

#[async_trait]
impl EventPage for MockPage {
    async fn goto(&self, url: &str) -> Result<()> {
        let requests = {
            let mut state = self.script.lock();
            state.navigations.push(url.to_string());
            if state.failing.contains(url) {
                state.current = None;
                return Err(ScoutError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_RESET".to_string(),
                });
            }
            state.current = Some(url.to_string());
            state.on_load.get(url).cloned().unwrap_or_default()
        };

        self.replay(requests);
        Ok(())
    }

    async fn activate(&self, _selector: &str) -> Result<bool> {
        let (requests, later) = {
            let mut state = self.script.lock();
            let Some(current) = state.current.clone() else {
                return Ok(false);
            };
            if state.without_playback.contains(&current) {
                return Ok(false);
            }
            state.activations.push(current.clone());
            (
                state.on_play.get(&current).cloned().unwrap_or_default(),
                state.on_play_later.get(&current).cloned().unwrap_or_default(),
            )
        };

        self.replay(requests);
        for (after, request) in later {
            let script = self.script.clone();
            let listener = self.listener.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                replay(&script, &listener, vec![request]);
            });
        }
        Ok(true)
    }

    async fn close(&self) -> Result<()> {
        self.script.lock().closed = true;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    script: MockScript,
}

impl MockLauncher {
    pub fn new(script: MockScript) -> Self {
        Self { script }
    }
}

#[async_trait]
impl PageLauncher for MockLauncher {
    type Page = MockPage;

    async fn launch(&self, listener: RequestListener) -> Result<MockPage> {
        if self.script.lock().fail_launch {
            return Err(ScoutError::Browser(
                "Failed to launch browser: no chromium binary".to_string(),
            ));
        }

        Ok(MockPage {
            script: self.script.clone(),
            listener,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ManifestMatcher, RequestFilter, StreamObserver};
    use scout_core::{Correlation, EventRef};

    #[tokio::test]
    async fn test_mock_page_replays_through_listener() {
        let script = MockScript::new()
            .on_load("https://example.test/event/a", "https://www.google-analytics.com/collect")
            .on_play("https://example.test/event/a", "https://cdn.example/hls/xyz123/index.m3u8");

        let correlation = Correlation::new();
        let matcher = ManifestMatcher::new("hls", "index.m3u8").unwrap();
        let (observer, mut rx) = StreamObserver::channel(matcher, correlation.clone());
        let listener = RequestListener::new(RequestFilter::new(["google-analytics.com"]), observer);

        let page = MockLauncher::new(script.clone()).launch(listener).await.unwrap();
        correlation.begin(EventRef::new("/event/a"));
        page.goto("https://example.test/event/a").await.unwrap();
        assert!(page.activate(".video-button").await.unwrap());

        assert_eq!(rx.try_recv().unwrap().stream_id.as_str(), "xyz123");
        assert_eq!(script.blocked(), vec!["https://www.google-analytics.com/collect"]);
        assert_eq!(script.activations(), vec!["https://example.test/event/a"]);
    }
}
