//! Browser lifecycle management using Chrome DevTools Protocol

use async_trait::async_trait;
use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision};
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::FailRequest;
use headless_chrome::protocol::cdp::Network::ErrorReason;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::seq::SliceRandom;
use scout_core::config::BrowserSettings;
use scout_core::ScoutError;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Result;
use crate::observer::{RequestDecision, RequestListener};
use crate::page::{EventPage, PageLauncher};

/// Desktop user-agents picked from when none is configured
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
];

/// Pick a user-agent from the built-in pool
pub fn random_user_agent() -> String {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
        .to_string()
}

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// User agent string
    pub user_agent: Option<String>,
    /// Outbound proxy server
    pub proxy_server: Option<String>,
    /// Pass `--mute-audio`
    pub mute_audio: bool,
    /// Disable page content-security-policy so interception sees everything
    pub bypass_csp: bool,
    /// Navigation timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            user_agent: None,
            proxy_server: None,
            mute_audio: true,
            bypass_csp: true,
            timeout_seconds: 30,
        }
    }
}

impl BrowserConfig {
    /// Build from the `[browser]` config section, choosing a random
    /// user-agent when none is set
    pub fn from_settings(settings: &BrowserSettings) -> Self {
        Self {
            headless: settings.headless,
            user_agent: Some(
                settings
                    .user_agent
                    .clone()
                    .unwrap_or_else(random_user_agent),
            ),
            proxy_server: settings.proxy_server().map(str::to_string),
            mute_audio: settings.mute_audio,
            bypass_csp: settings.bypass_csp,
            timeout_seconds: settings.navigation_timeout_secs,
            ..Self::default()
        }
    }
}

/// Run `f` on the blocking pool so the caller's task can still be cancelled
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ScoutError::Browser(format!("Browser task failed: {}", e)))?
}

/// Active browser session with Chrome DevTools Protocol
pub struct BrowserSession {
    /// Underlying browser instance (kept alive for tab lifetime)
    #[allow(dead_code)]
    browser: Browser,
    /// Current active tab
    tab: Arc<Tab>,
    /// Configuration
    config: BrowserConfig,
}

impl BrowserSession {
    /// Launch browser with custom configuration
    pub async fn launch_with_config(config: BrowserConfig) -> Result<Self> {
        info!(
            "Launching browser (headless: {}, proxy: {})",
            config.headless,
            config.proxy_server.as_deref().unwrap_or("none")
        );

        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            .proxy_server(config.proxy_server.as_deref())
            .idle_browser_timeout(Duration::from_secs(config.timeout_seconds.max(1) * 10))
            .build()
            .map_err(|e| ScoutError::Browser(format!("Failed to launch browser: {}", e)))?;

        let user_agent_arg: Option<String> = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));
        if let Some(ref ua_arg) = user_agent_arg {
            launch_options.args.push(OsStr::new(ua_arg));
        }
        if config.mute_audio {
            launch_options.args.push(OsStr::new("--mute-audio"));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| ScoutError::Browser(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| ScoutError::Browser(format!("Failed to create tab: {}", e)))?;

        tab.set_default_timeout(Duration::from_secs(config.timeout_seconds));

        if config.bypass_csp {
            tab.call_method(Page::SetBypassCSP { enabled: true })
                .map_err(|e| ScoutError::Browser(format!("Failed to bypass CSP: {}", e)))?;
        }

        info!("Browser launched successfully");

        Ok(Self {
            browser,
            tab,
            config,
        })
    }

    /// Route every request of the tab through `listener`
    pub fn install_listener(&self, listener: RequestListener) -> Result<()> {
        let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
            move |_transport: Arc<Transport>, _session_id: SessionId, event: RequestPausedEvent| {
                match listener.handle(&event.params.request.url) {
                    RequestDecision::Continue => RequestPausedDecision::Continue(None),
                    RequestDecision::Block => RequestPausedDecision::Fail(FailRequest {
                        request_id: event.params.request_id,
                        error_reason: ErrorReason::BlockedByClient,
                    }),
                }
            },
        );

        self.tab
            .enable_fetch(None, None)
            .map_err(|e| ScoutError::Browser(format!("Failed to enable fetch domain: {}", e)))?;
        self.tab
            .enable_request_interception(interceptor)
            .map_err(|e| ScoutError::Browser(format!("Failed to intercept requests: {}", e)))?;

        debug!("Request listener installed");
        Ok(())
    }

    /// headless_chrome blocks on the DevTools connection, so tab calls go
    /// through [`run_blocking`]
    async fn with_tab<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Arc<Tab>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        run_blocking(move || f(tab)).await
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);

        let target = url.to_string();
        let timeout_seconds = self.config.timeout_seconds;
        self.with_tab(move |tab| {
            tab.navigate_to(&target).map_err(|e| ScoutError::Navigation {
                url: target.clone(),
                reason: e.to_string(),
            })?;

            tab.wait_until_navigated()
                .map_err(|e| ScoutError::Navigation {
                    url: target.clone(),
                    reason: format!("timeout after {}s: {}", timeout_seconds, e),
                })?;
            Ok(())
        })
        .await?;

        info!("Successfully navigated to {}", url);
        Ok(())
    }

    /// Click the first element matching `selector`
    pub async fn click_first(&self, selector: &str) -> Result<bool> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            let element = match tab.find_element(&selector) {
                Ok(element) => element,
                Err(e) => {
                    debug!("No element for {}: {}", selector, e);
                    return Ok(false);
                }
            };

            element
                .click()
                .map_err(|e| ScoutError::Browser(format!("Failed to click {}: {}", selector, e)))?;

            Ok(true)
        })
        .await
    }
}

#[async_trait]
impl EventPage for BrowserSession {
    async fn goto(&self, url: &str) -> Result<()> {
        self.navigate(url).await
    }

    async fn activate(&self, selector: &str) -> Result<bool> {
        self.click_first(selector).await
    }

    async fn close(&self) -> Result<()> {
        info!("Closing browser session");
        self.with_tab(|tab| {
            tab.close(true)
                .map_err(|e| ScoutError::Browser(format!("Failed to close tab: {}", e)))?;
            Ok(())
        })
        .await
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        debug!("BrowserSession dropped, browser will be cleaned up");
    }
}

/// Launches headless Chromium sessions
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PageLauncher for ChromeLauncher {
    type Page = BrowserSession;

    async fn launch(&self, listener: RequestListener) -> Result<BrowserSession> {
        let session = BrowserSession::launch_with_config(self.config.clone()).await?;
        session.install_listener(listener)?;
        Ok(session)
    }
}
