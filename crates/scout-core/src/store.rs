//! Persisted event -> stream mapping
//!
//! The store is seeded from the state file at start, accumulates records in
//! memory during the run and is written back in full at the end. Nothing is
//! written incrementally, so the file only ever holds a complete collection.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::fail_open::fail_open_or_default;
use crate::types::{EventRef, SiteRoot, StreamId, StreamRecord};
use crate::{Result, ScoutError};

/// What [`ResultStore::persist`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The state file was replaced with this many records
    Written { records: usize },
    /// Nothing collected; the state file was left untouched
    SkippedEmpty,
}

/// In-memory result collection backed by a JSON state file
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    /// Events present before this run started
    resolved_before_run: HashSet<EventRef>,
    records: Vec<StreamRecord>,
    seen: HashSet<StreamRecord>,
    loaded_count: usize,
}

impl ResultStore {
    /// An empty store that will persist to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            resolved_before_run: HashSet::new(),
            records: Vec::new(),
            seen: HashSet::new(),
            loaded_count: 0,
        }
    }

    /// Load prior results from `path`
    ///
    /// A missing, unreadable or corrupt file yields an empty store; this never
    /// fails. Absolute event URLs under `site_root` are stored site-relative.
    pub async fn load(path: impl Into<PathBuf>, site_root: &SiteRoot) -> Self {
        let path = path.into();
        let prior = fail_open_or_default("load_results", || read_records(&path)).await;

        let mut store = Self::empty(path);
        for record in prior {
            let event = site_root.relativize(record.event.as_str());
            store.resolved_before_run.insert(event.clone());
            store.insert(StreamRecord::new(event, record.stream_id));
        }
        store.loaded_count = store.records.len();

        info!(
            "Loaded {} existing stream records from {}",
            store.loaded_count,
            store.path.display()
        );
        store
    }

    /// True if the event had a record before this run, whatever its stream id
    pub fn already_resolved(&self, event: &EventRef) -> bool {
        self.resolved_before_run.contains(event)
    }

    /// Add a record unless the identical pair is already present
    ///
    /// Returns whether the record was inserted.
    pub fn record(&mut self, event: EventRef, stream_id: StreamId) -> bool {
        let inserted = self.insert(StreamRecord::new(event, stream_id));
        if !inserted {
            debug!("Duplicate stream record ignored");
        }
        inserted
    }

    fn insert(&mut self, record: StreamRecord) -> bool {
        if self.seen.contains(&record) {
            return false;
        }
        self.seen.insert(record.clone());
        self.records.push(record);
        true
    }

    pub fn records(&self) -> &[StreamRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records added since load
    pub fn new_records(&self) -> &[StreamRecord] {
        &self.records[self.loaded_count..]
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the state file with the full collection
    ///
    /// Writes a sibling temp file and renames it into place. An empty
    /// collection is not written, so a fruitless run cannot erase history.
    pub async fn persist(&self) -> Result<PersistOutcome> {
        if self.records.is_empty() {
            warn!("No stream records collected, skipping save");
            return Ok(PersistOutcome::SkippedEmpty);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(&self.records)?;
        let tmp_path = temp_path(&self.path);
        fs::write(&tmp_path, content).await?;
        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            if let Err(cleanup) = fs::remove_file(&tmp_path).await {
                debug!("Failed to remove {}: {}", tmp_path.display(), cleanup);
            }
            return Err(ScoutError::Storage(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            )));
        }

        info!(
            "Saved {} stream records to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(PersistOutcome::Written {
            records: self.records.len(),
        })
    }
}

async fn read_records(path: &Path) -> Result<Vec<StreamRecord>> {
    if !path.exists() {
        debug!("No state file at {}", path.display());
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).await?;
    let entries: Vec<serde_json::Value> = serde_json::from_str(&content).map_err(|e| {
        ScoutError::Storage(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<StreamRecord>(entry) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping invalid entry {} in {}: {}", index, path.display(), e),
        }
    }
    Ok(records)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn root() -> SiteRoot {
        SiteRoot::new("https://example.test")
    }

    fn sid(id: &str) -> StreamId {
        StreamId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = ResultStore::load(dir.path().join("event-ids.json"), &root()).await;
        assert!(store.is_empty());
        assert!(!store.already_resolved(&EventRef::new("/event/a")));
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event-ids.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = ResultStore::load(&path, &root()).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_load_wrong_shape_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event-ids.json");
        std::fs::write(&path, r#"{"eventUrl": "/event/a", "streamId": "x"}"#).unwrap();

        let store = ResultStore::load(&path, &root()).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_load_skips_entries_without_stream_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event-ids.json");
        std::fs::write(
            &path,
            r#"[
                {"eventUrl": "/event/a", "streamId": ""},
                {"eventUrl": "/event/b"},
                {"eventUrl": "/event/c", "streamId": "ccc777"}
            ]"#,
        )
        .unwrap();

        let store = ResultStore::load(&path, &root()).await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].event, EventRef::new("/event/c"));
        assert!(!store.already_resolved(&EventRef::new("/event/a")));
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut store = ResultStore::empty("unused.json");
        assert!(store.record(EventRef::new("/event/a"), sid("xyz123")));
        assert!(!store.record(EventRef::new("/event/a"), sid("xyz123")));
        assert_eq!(store.len(), 1);

        // Same event, different stream is a distinct record
        assert!(store.record(EventRef::new("/event/a"), sid("abc999")));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_new_records_are_not_already_resolved() {
        let mut store = ResultStore::empty("unused.json");
        store.record(EventRef::new("/event/a"), sid("xyz123"));
        assert!(!store.already_resolved(&EventRef::new("/event/a")));
        assert_eq!(store.new_records().len(), 1);
    }

    #[tokio::test]
    async fn test_persist_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("event-ids.json");

        let mut store = ResultStore::empty(&path);
        store.record(EventRef::new("/event/a"), sid("xyz123"));
        store.record(EventRef::new("/event/b"), sid("qrs456"));
        assert_eq!(
            store.persist().await.unwrap(),
            PersistOutcome::Written { records: 2 }
        );
        assert!(!temp_path(&path).exists());

        let loaded = ResultStore::load(&path, &root()).await;
        let before: HashSet<_> = store.records().iter().cloned().collect();
        let after: HashSet<_> = loaded.records().iter().cloned().collect();
        assert_eq!(before, after);
        assert!(loaded.already_resolved(&EventRef::new("/event/a")));
        assert!(loaded.already_resolved(&EventRef::new("/event/b")));
        assert!(loaded.new_records().is_empty());
    }

    #[tokio::test]
    async fn test_persist_empty_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event-ids.json");
        std::fs::write(&path, "previous content").unwrap();

        let store = ResultStore::empty(&path);
        assert_eq!(store.persist().await.unwrap(), PersistOutcome::SkippedEmpty);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous content");
    }

    #[tokio::test]
    async fn test_failed_replace_removes_temp_file() {
        let dir = tempdir().unwrap();
        // A non-empty directory in the way makes the rename fail
        let path = dir.path().join("event-ids.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let mut store = ResultStore::empty(&path);
        store.record(EventRef::new("/event/a"), sid("xyz123"));

        let err = store.persist().await.unwrap_err();
        assert!(matches!(err, ScoutError::Storage(_)));
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_persist_keeps_loaded_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event-ids.json");
        std::fs::write(
            &path,
            r#"[{"eventUrl": "/event/a", "streamId": "xyz123"}]"#,
        )
        .unwrap();

        let mut store = ResultStore::load(&path, &root()).await;
        store.record(EventRef::new("/event/c"), sid("ccc777"));
        store.persist().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                { "eventUrl": "/event/a", "streamId": "xyz123" },
                { "eventUrl": "/event/c", "streamId": "ccc777" }
            ])
        );
    }

    #[tokio::test]
    async fn test_load_normalizes_absolute_urls_and_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event-ids.json");
        std::fs::write(
            &path,
            r#"[
                {"eventUrl": "https://example.test/event/a", "streamId": "xyz123"},
                {"eventUrl": "/event/a", "streamId": "xyz123"}
            ]"#,
        )
        .unwrap();

        let store = ResultStore::load(&path, &root()).await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].event, EventRef::new("/event/a"));
        assert!(store.already_resolved(&EventRef::new("/event/a")));
    }
}
