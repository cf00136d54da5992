//! Listing-Harvester: an incremental listing-site record harvester
//!
//! This crate walks the result pages of a paginated listing site, hands every
//! discovered item to a bounded pool of workers that fetch its detail page and
//! run a declarative rule table against it, and merges the accepted records into
//! a CSV table. A crawl stops as soon as it reaches an item captured by a
//! previous run.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;

use thiserror::Error;

pub use crawler::{FetchError, PoolError};
pub use extract::Rejection;
pub use output::TableError;

/// Main error type for harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction failed for {url}: {source}")]
    Extraction {
        url: String,
        #[source]
        source: Rejection,
    },

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
///
/// Every variant is fatal: a run never starts with a configuration that
/// failed to load.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector for '{owner}': {message}")]
    InvalidSelector { owner: String, message: String },
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_harvest, CandidateItem, HarvestSummary, Harvester};
pub use extract::{FieldRule, FieldValue, Record, RuleSet};
pub use output::{RecordTable, ResultSink};
