//! Run orchestration
//!
//! One pass over the listing: load prior results, fetch and extract event
//! references, then for every event not seen before navigate, start playback
//! and wait for the observer. Results are persisted at the end no matter how
//! the browsing phase ended.

use scout_browser::{
    EventPage, ManifestMatcher, NavigationController, PageLauncher, RequestFilter,
    RequestListener, StreamObserver,
};
use scout_core::fail_open::fail_open;
use scout_core::{
    Correlation, EventRef, ListingPattern, NavigationTag, Observation, PersistOutcome,
    ResultStore, Result, ScoutConfig, ScoutError, SiteRoot,
};
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::listing::ListingSource;

/// Everything a run needs besides its collaborators
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub site_root: SiteRoot,
    pub listing: ListingPattern,
    pub manifest: ManifestMatcher,
    pub filter: RequestFilter,
    pub playback_selector: String,
    /// Longest wait for a manifest after playback starts
    pub delay: Duration,
    pub max_retries: u32,
    pub state_file: PathBuf,
}

impl HarvestSettings {
    pub fn from_config(config: &ScoutConfig) -> Result<Self> {
        Ok(Self {
            site_root: config.site_root()?,
            listing: ListingPattern::new(&config.site.marker_class, &config.site.event_prefix)?,
            manifest: ManifestMatcher::from_config(&config.observer)?,
            filter: RequestFilter::new(config.browser.blocked_hosts.iter().cloned()),
            playback_selector: config.harvest.playback_selector.clone(),
            delay: config.harvest.delay(),
            max_retries: config.harvest.max_retries,
            state_file: config.harvest.state_file.clone(),
        })
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Event references on the listing page
    pub listed: usize,
    /// Skipped because they were resolved by an earlier run
    pub skipped: usize,
    /// Events the navigation controller was invoked for
    pub navigated: usize,
    pub navigation_failures: usize,
    pub missing_playback: usize,
    /// Events whose window saw at least one manifest
    pub resolved: usize,
    /// Manifests seen with no window open
    pub unattributed: u64,
    /// Records added to the store
    pub new_records: usize,
    /// Error that ended the browsing phase early
    pub aborted: Option<String>,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "listed {}, skipped {}, navigated {}, navigation failures {}, no playback {}, resolved {}, new records {}",
            self.listed,
            self.skipped,
            self.navigated,
            self.navigation_failures,
            self.missing_playback,
            self.resolved,
            self.new_records
        )?;
        if self.unattributed > 0 {
            write!(f, ", unattributed {}", self.unattributed)?;
        }
        if let Some(reason) = &self.aborted {
            write!(f, " (aborted: {})", reason)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub summary: RunSummary,
    pub persisted: PersistOutcome,
}

pub struct Harvester<S, L> {
    settings: HarvestSettings,
    source: S,
    launcher: L,
    navigator: NavigationController,
}

impl<S, L> Harvester<S, L>
where
    S: ListingSource,
    L: PageLauncher,
{
    pub fn new(settings: HarvestSettings, source: S, launcher: L) -> Self {
        let navigator = NavigationController::new(settings.max_retries);
        Self {
            settings,
            source,
            launcher,
            navigator,
        }
    }

    /// Run to completion
    pub async fn run(&self) -> Result<RunReport> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run until done or until `shutdown` resolves; persists either way
    ///
    /// Only a failure to write the state file is returned as an error.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        let mut store =
            ResultStore::load(&self.settings.state_file, &self.settings.site_root).await;
        let mut summary = RunSummary::default();

        let outcome = tokio::select! {
            result = self.harvest(&mut store, &mut summary) => result,
            _ = shutdown => Err(ScoutError::Other("interrupted".to_string())),
        };

        if let Err(e) = outcome {
            error!("An error occurred: {}", e);
            summary.aborted = Some(e.to_string());
        }

        summary.new_records = store.new_records().len();
        info!("Run finished: {}", summary);

        let persisted = store.persist().await?;
        Ok(RunReport { summary, persisted })
    }

    async fn harvest(&self, store: &mut ResultStore, summary: &mut RunSummary) -> Result<()> {
        info!("Fetching the main page: {}", self.settings.site_root);
        let html = self.source.fetch_listing().await?;
        let events = self.settings.listing.extract(&html);
        summary.listed = events.len();

        if events.is_empty() {
            warn!("No event URLs found on the listing page");
            return Ok(());
        }
        info!("Found {} event URLs. Starting browser...", events.len());

        let correlation = Correlation::new();
        let (observer, observations) =
            StreamObserver::channel(self.settings.manifest.clone(), correlation.clone());
        let listener = RequestListener::new(self.settings.filter.clone(), observer.clone());
        let page = self.launcher.launch(listener).await?;
        let mut collector = Collector::new(observations, store);

        for event in &events {
            if collector.store().already_resolved(event) {
                info!(
                    "Skipping event URL: {} (already in {})",
                    event,
                    collector.store().path().display()
                );
                summary.skipped += 1;
                continue;
            }

            self.visit(&page, &correlation, &mut collector, event, summary)
                .await;
        }

        // The last window stays open until the run ends
        correlation.finish();
        collector.drain();
        summary.unattributed = observer.unattributed();

        fail_open("browser_close", || page.close()).await;
        info!("Browser closed after completing all requests");
        Ok(())
    }

    /// Navigate to one event and collect its stream identifiers
    ///
    /// After a successful navigation the event's window stays open until the
    /// next [`Correlation::begin`], so manifests the page requests later are
    /// still attributed to it.
    #[instrument(skip_all, fields(event = %event))]
    async fn visit<P>(
        &self,
        page: &P,
        correlation: &Correlation,
        collector: &mut Collector<'_>,
        event: &EventRef,
        summary: &mut RunSummary,
    ) where
        P: EventPage,
    {
        let tag = correlation.begin(event.clone());
        let url = self.settings.site_root.join(event);

        summary.navigated += 1;
        let navigation = self.navigator.navigate(page, &url).await;
        if !navigation.succeeded() {
            summary.navigation_failures += 1;
            correlation.finish();
            collector.discard(&tag);
            return;
        }

        match page.activate(&self.settings.playback_selector).await {
            Ok(true) => info!("Clicked on the visible playback control"),
            Ok(false) => {
                info!("No visible playback control found");
                summary.missing_playback += 1;
                collector.drain();
                return;
            }
            Err(e) => {
                warn!("Failed to start playback: {}", e);
                summary.missing_playback += 1;
                collector.drain();
                return;
            }
        }

        info!(
            "Waiting {} seconds for stream manifests...",
            self.settings.delay.as_secs_f64()
        );
        let found = collector.collect_for(&tag, self.settings.delay).await;
        if found > 0 {
            summary.resolved += 1;
        } else {
            info!("No stream manifest observed for {}", event);
        }
    }
}

/// Moves observations from the observer channel into the store
///
/// Observations tagged with a discarded window are dropped whenever they
/// arrive, including ones sent after the window was discarded.
struct Collector<'a> {
    observations: UnboundedReceiver<Observation>,
    store: &'a mut ResultStore,
    discarded: HashSet<u64>,
}

impl<'a> Collector<'a> {
    fn new(observations: UnboundedReceiver<Observation>, store: &'a mut ResultStore) -> Self {
        Self {
            observations,
            store,
            discarded: HashSet::new(),
        }
    }

    fn store(&self) -> &ResultStore {
        &*self.store
    }

    /// Record everything that arrives until `limit` elapses
    ///
    /// Returns how many observations belonged to `tag`. Observations from
    /// earlier windows are recorded under their own tag.
    async fn collect_for(&mut self, tag: &NavigationTag, limit: Duration) -> usize {
        let deadline = Instant::now() + limit;
        let mut found = 0;

        loop {
            match tokio::time::timeout_at(deadline, self.observations.recv()).await {
                Ok(Some(observation)) => {
                    let current = observation.tag.seq == tag.seq;
                    if self.record(observation) && current {
                        found += 1;
                    }
                }
                Ok(None) => {
                    // Observer gone; keep the pacing anyway
                    tokio::time::sleep_until(deadline).await;
                    return found;
                }
                Err(_) => return found,
            }
        }
    }

    /// Drop every observation of `tag`, now and later
    fn discard(&mut self, tag: &NavigationTag) {
        self.discarded.insert(tag.seq);
        self.drain();
    }

    fn drain(&mut self) {
        while let Ok(observation) = self.observations.try_recv() {
            self.record(observation);
        }
    }

    /// Returns false for discarded observations
    fn record(&mut self, observation: Observation) -> bool {
        let Observation { tag, stream_id } = observation;
        if self.discarded.contains(&tag.seq) {
            warn!(
                "Discarding stream ID {} for {} (navigation failed)",
                stream_id, tag.event
            );
            return false;
        }
        if self.store.record(tag.event.clone(), stream_id.clone()) {
            info!("Recorded stream ID {} for {}", stream_id, tag.event);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::StreamId;
    use tokio::sync::mpsc;

    fn observation(seq: u64, event: &str, id: &str) -> Observation {
        Observation {
            tag: NavigationTag {
                seq,
                event: EventRef::new(event),
            },
            stream_id: StreamId::new(id).unwrap(),
        }
    }

    #[test]
    fn test_settings_from_default_config() {
        let settings = HarvestSettings::from_config(&ScoutConfig::default()).unwrap();
        assert_eq!(settings.delay, Duration::from_secs(10));
        assert_eq!(settings.max_retries, 3);
        assert!(settings.filter.blocks("https://www.google-analytics.com/collect"));
        assert_eq!(
            settings.manifest.stream_id("https://cdn/hls/abc/index.m3u8"),
            StreamId::new("abc")
        );
    }

    #[tokio::test]
    async fn test_collect_records_every_manifest_until_deadline() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut store = ResultStore::empty("unused.json");
        let mut collector = Collector::new(rx, &mut store);
        let tag = NavigationTag {
            seq: 2,
            event: EventRef::new("/event/b"),
        };

        tx.send(observation(1, "/event/a", "late111")).unwrap();
        tx.send(observation(2, "/event/b", "bbb222")).unwrap();
        let later = tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            later.send(observation(2, "/event/b", "bbb333")).unwrap();
        });

        let start = Instant::now();
        let found = collector.collect_for(&tag, Duration::from_millis(200)).await;
        assert_eq!(found, 2);
        assert!(start.elapsed() >= Duration::from_millis(200));

        // The late observation keeps its own event
        let records: Vec<_> = store
            .records()
            .iter()
            .map(|r| (r.event.as_str(), r.stream_id.as_str()))
            .collect();
        assert_eq!(
            records,
            vec![
                ("/event/a", "late111"),
                ("/event/b", "bbb222"),
                ("/event/b", "bbb333")
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_times_out_without_observation() {
        let (_tx, rx) = mpsc::unbounded_channel::<Observation>();
        let mut store = ResultStore::empty("unused.json");
        let mut collector = Collector::new(rx, &mut store);
        let tag = NavigationTag {
            seq: 1,
            event: EventRef::new("/event/a"),
        };

        let found = collector.collect_for(&tag, Duration::from_millis(20)).await;
        assert_eq!(found, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_discard_drops_failed_navigation() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut store = ResultStore::empty("unused.json");
        let mut collector = Collector::new(rx, &mut store);
        let correlation = Correlation::new();
        let earlier = correlation.begin(EventRef::new("/event/a"));
        let failed = correlation.begin(EventRef::new("/event/b"));

        tx.send(observation(earlier.seq, "/event/a", "aaa111")).unwrap();
        tx.send(observation(failed.seq, "/event/b", "bbb222")).unwrap();
        collector.discard(&failed);
        assert_eq!(collector.store().len(), 1);
        assert_eq!(collector.store().records()[0].event, EventRef::new("/event/a"));
    }

    #[test]
    fn test_discarded_window_ignores_late_sends() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut store = ResultStore::empty("unused.json");
        let mut collector = Collector::new(rx, &mut store);
        let correlation = Correlation::new();
        let failed = correlation.begin(EventRef::new("/event/b"));

        // Tag read before the window was discarded, sent after
        let stale = correlation.current().unwrap();
        collector.discard(&failed);
        tx.send(Observation {
            tag: stale,
            stream_id: StreamId::new("bbb222").unwrap(),
        })
        .unwrap();
        tx.send(observation(failed.seq + 1, "/event/c", "ccc333")).unwrap();
        collector.drain();

        let events: Vec<_> = store.records().iter().map(|r| r.event.as_str()).collect();
        assert_eq!(events, vec!["/event/c"]);
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            listed: 2,
            navigated: 2,
            navigation_failures: 1,
            resolved: 1,
            new_records: 1,
            aborted: Some("Transport error: refused".to_string()),
            ..RunSummary::default()
        };
        let line = summary.to_string();
        assert!(line.contains("listed 2"));
        assert!(line.contains("navigation failures 1"));
        assert!(line.ends_with("(aborted: Transport error: refused)"));
    }
}
