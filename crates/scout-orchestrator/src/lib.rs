//! # scout-orchestrator
//!
//! Sequences a Scout run:
//! - Listing fetch over plain HTTP ([`ListingSource`])
//! - Per-event navigation, playback and manifest wait ([`Harvester`])
//! - Final persistence of the result store, also after failures

mod harvester;
mod listing;

pub use harvester::{HarvestSettings, Harvester, RunReport, RunSummary};
pub use listing::{HttpListingSource, ListingSource, StaticListing};
