//! Bounded-retry navigation
//!
//! A navigation runs through `Pending -> Attempting(n) -> Succeeded | Exhausted`.
//! The first successful attempt ends it; after `max_attempts` failures it is
//! exhausted and the caller skips the event. Exhaustion is not an error.

use tracing::{info, warn};

use crate::page::EventPage;

/// Default number of navigation attempts per event
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    Pending,
    Attempting { attempt: u32 },
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl NavigationState {
    /// Pure transition on the outcome of the current attempt
    ///
    /// `Pending` moves to the first attempt regardless of `ok`; terminal
    /// states never change.
    pub fn advance(self, ok: bool, max_attempts: u32) -> Self {
        match self {
            Self::Pending => Self::Attempting { attempt: 1 },
            Self::Attempting { attempt } if ok => Self::Succeeded { attempts: attempt },
            Self::Attempting { attempt } if attempt >= max_attempts => {
                Self::Exhausted { attempts: attempt }
            }
            Self::Attempting { attempt } => Self::Attempting {
                attempt: attempt + 1,
            },
            terminal => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Exhausted { .. })
    }
}

/// Terminal result of [`NavigationController::navigate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOutcome {
    pub state: NavigationState,
    /// Cause of the last failed attempt
    pub last_error: Option<String>,
}

impl NavigationOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.state, NavigationState::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self.state {
            NavigationState::Succeeded { attempts } | NavigationState::Exhausted { attempts } => {
                attempts
            }
            NavigationState::Attempting { attempt } => attempt,
            NavigationState::Pending => 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NavigationController {
    max_attempts: u32,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl NavigationController {
    /// `max_attempts` below 1 is treated as 1
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn navigate<P>(&self, page: &P, url: &str) -> NavigationOutcome
    where
        P: EventPage + ?Sized,
    {
        let mut state = NavigationState::Pending.advance(false, self.max_attempts);
        let mut last_error = None;

        while let NavigationState::Attempting { attempt } = state {
            info!("Attempt {}: Navigating to event URL: {}", attempt, url);

            let ok = match page.goto(url).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        "Error navigating to {} (attempt {}/{}): {}",
                        url, attempt, self.max_attempts, e
                    );
                    last_error = Some(e.to_string());
                    false
                }
            };

            state = state.advance(ok, self.max_attempts);
        }

        if let NavigationState::Exhausted { attempts } = state {
            warn!("Failed to navigate to {} after {} attempts", url, attempts);
        }

        NavigationOutcome { state, last_error }
    }
}
