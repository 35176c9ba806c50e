//! # scout-core
//!
//! Core types for Scout, which resolves live-event pages to the stream
//! identifiers their players request.
//!
//! - [`listing`]: event references from the listing page
//! - [`store`]: the persisted event -> stream mapping
//! - [`config`]: compiled-in defaults with optional TOML overrides
//! - [`Correlation`]: links a network observation to the event being navigated

mod error;
mod types;

pub mod config;
pub mod fail_open;
pub mod listing;
pub mod store;

pub use config::ScoutConfig;
pub use error::{Result, ScoutError};
pub use listing::ListingPattern;
pub use store::{PersistOutcome, ResultStore};
pub use types::*;
