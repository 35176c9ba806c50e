//! Browser error types - re-exports the unified ScoutError from scout-core
//!
//! Browser failures use these variants:
//! - Browser(String) - launch, tab, interception and element errors
//! - Navigation { url, reason } - a single failed navigation attempt
//!
//! Messages should name the operation that failed.

pub use scout_core::{Result, ScoutError};

pub type BrowserError = ScoutError;
