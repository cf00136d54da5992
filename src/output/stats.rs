//! Run statistics
//!
//! This module provides live counters for a harvest run and a summary of a
//! persisted table for the `--stats` mode.

use crate::output::table::RecordTable;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-item outcome counters, shared by the producer and all workers
#[derive(Debug, Default)]
pub struct HarvestStats {
    submitted: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`HarvestStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl HarvestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a submission and returns the new total
    pub fn record_submitted(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// A record was filtered out by a validity rule
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A fetch or conversion failed
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Items whose handling finished, whatever the outcome
    pub fn completed(&self) -> u64 {
        self.accepted + self.rejected + self.failed
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} submitted, {} accepted, {} rejected, {} failed",
            self.submitted, self.accepted, self.rejected, self.failed
        )
    }
}

/// Summary of a persisted table
#[derive(Debug, Clone, PartialEq)]
pub struct TableStatistics {
    pub rows: usize,
    pub columns: Vec<String>,
    /// Id the next run would stop at
    pub cursor: Option<String>,
    pub newest: Option<String>,
    pub oldest: Option<String>,
}

/// Computes statistics for a table
pub fn load_statistics(table: &RecordTable, order_column: &str) -> TableStatistics {
    let ordered = table.sorted_ids(order_column);
    let order_value = |id: &str| {
        table
            .get(id)
            .and_then(|row| row.get(order_column))
            .filter(|value| !value.is_empty())
            .cloned()
    };

    TableStatistics {
        rows: table.len(),
        columns: table.columns().to_vec(),
        cursor: table.latest_id(order_column).map(str::to_string),
        newest: ordered.first().and_then(|id| order_value(*id)),
        oldest: ordered.iter().rev().find_map(|id| order_value(*id)),
    }
}

/// Prints table statistics to stdout in a formatted manner
pub fn print_statistics(stats: &TableStatistics) {
    println!("=== Table Statistics ===\n");

    println!("Overview:");
    println!("  Rows: {}", stats.rows);
    println!("  Columns: {}", stats.columns.join(", "));
    println!();

    match &stats.cursor {
        Some(cursor) => println!("Next run stops at id: {}", cursor),
        None => println!("No cursor: the next run walks every listing page"),
    }

    if let (Some(newest), Some(oldest)) = (&stats.newest, &stats.oldest) {
        println!("Date range: {} .. {}", oldest, newest);
    }
}
