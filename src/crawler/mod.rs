//! Crawler module for listing walks and detail page processing
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching behind the `PageSource` seam
//! - Walking listing pages up to the newest stored item
//! - The bounded worker pool that processes detail pages
//! - Overall run coordination

mod coordinator;
mod fetcher;
mod listing;
mod pool;

pub use coordinator::{run_harvest, HarvestSummary, Harvester};
pub use fetcher::{build_http_client, user_agent_string, FetchError, HttpSource, PageSource};
pub use listing::{CandidateItem, ListingCrawler, StopReason};
pub use pool::{ItemHandler, PoolError, WorkerPool};
