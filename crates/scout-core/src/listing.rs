//! Event reference extraction from the listing page
//!
//! The listing has a narrow, stable shape, so a regex over the raw text is
//! enough: `<a class="list-group-item" href="/event/...">`.

use regex::Regex;

use crate::types::EventRef;
use crate::{Result, ScoutError};

/// Compiled anchor pattern for one marker class and event path prefix
#[derive(Debug, Clone)]
pub struct ListingPattern {
    regex: Regex,
}

impl ListingPattern {
    pub fn new(marker_class: &str, event_prefix: &str) -> Result<Self> {
        let pattern = format!(
            r#"<a\s+class="{}"\s+href="({}[^"]+)""#,
            regex::escape(marker_class),
            regex::escape(event_prefix)
        );
        let regex = Regex::new(&pattern)
            .map_err(|e| ScoutError::Config(format!("Invalid listing pattern: {}", e)))?;
        Ok(Self { regex })
    }

    /// Event references in document order; duplicates are kept
    pub fn extract(&self, html: &str) -> Vec<EventRef> {
        self.regex
            .captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .map(|m| EventRef::new(m.as_str()))
            .collect()
    }
}
