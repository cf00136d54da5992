//! Output module for accepted records
//!
//! This module handles:
//! - Collecting records from concurrent workers (`sink`)
//! - Reading, merging, and writing the CSV table (`table`)
//! - Run counters and table statistics (`stats`)

mod sink;
pub mod stats;
mod table;

pub use sink::ResultSink;
pub use stats::{load_statistics, print_statistics, HarvestStats, StatsSnapshot, TableStatistics};
pub use table::{RecordTable, Row, TableError, TableResult};
