//! Configuration management for Scout
//!
//! Every setting has a compiled-in default, so a run needs no config file at
//! all. An optional `scout.toml` overrides individual values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::SiteRoot;
use crate::{Result, ScoutError};

/// File name looked up in the working directory by [`ScoutConfig::load_or_default`]
pub const CONFIG_FILE_NAME: &str = "scout.toml";

/// Top-level Scout configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoutConfig {
    /// Target site and listing shape
    #[serde(default)]
    pub site: SiteConfig,

    /// Browser launch settings
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Manifest recognition rule
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Run pacing and persistence
    #[serde(default)]
    pub harvest: HarvestConfig,
}

/// Target site and listing markup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site root URL, base64-encoded
    #[serde(default = "default_root_b64")]
    pub root_b64: String,

    /// Class carried by event anchors on the listing page
    #[serde(default = "default_marker_class")]
    pub marker_class: String,

    /// Path prefix of event pages
    #[serde(default = "default_event_prefix")]
    pub event_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Outbound proxy, e.g. `socks5://127.0.0.1:9150`. Empty means direct.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Fixed user-agent; a random one from the built-in pool when unset
    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub mute_audio: bool,

    #[serde(default = "default_true")]
    pub bypass_csp: bool,

    /// Requests whose URL contains any of these are aborted
    #[serde(default = "default_blocked_hosts")]
    pub blocked_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Path segment preceding the stream identifier
    #[serde(default = "default_manifest_segment")]
    pub manifest_segment: String,

    /// Manifest file name following the stream identifier
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Persisted event -> stream mapping
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Upper bound on the wait for a manifest after playback starts
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Navigation attempts per event
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// CSS selector of the playback control
    #[serde(default = "default_playback_selector")]
    pub playback_selector: String,
}

// Default value providers
fn default_root_b64() -> String {
    "aHR0cHM6Ly90aGV0dmFwcC50bw==".to_string()
}

fn default_marker_class() -> String {
    "list-group-item".to_string()
}

fn default_event_prefix() -> String {
    "/event/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

fn default_blocked_hosts() -> Vec<String> {
    vec!["google-analytics.com".to_string()]
}

fn default_manifest_segment() -> String {
    "hls".to_string()
}

fn default_manifest_file() -> String {
    "index.m3u8".to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from("event-ids.json")
}

fn default_delay_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_playback_selector() -> String {
    r#".video-button:not([style*="display: none"])"#.to_string()
}

impl ScoutConfig {
    /// Load `scout.toml` from `dir` or fall back to defaults
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load an explicit config file; a missing file is an error
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ScoutError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn site_root(&self) -> Result<SiteRoot> {
        SiteRoot::from_base64(&self.site.root_b64)
    }
}

impl BrowserSettings {
    /// Proxy server, treating an empty string as unset
    pub fn proxy_server(&self) -> Option<&str> {
        self.proxy.as_deref().filter(|p| !p.trim().is_empty())
    }
}

impl HarvestConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            root_b64: default_root_b64(),
            marker_class: default_marker_class(),
            event_prefix: default_event_prefix(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            proxy: None,
            user_agent: None,
            navigation_timeout_secs: default_navigation_timeout_secs(),
            mute_audio: true,
            bypass_csp: true,
            blocked_hosts: default_blocked_hosts(),
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            manifest_segment: default_manifest_segment(),
            manifest_file: default_manifest_file(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            delay_ms: default_delay_ms(),
            max_retries: default_max_retries(),
            playback_selector: default_playback_selector(),
        }
    }
}
