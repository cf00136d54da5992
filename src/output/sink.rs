//! Shared accumulator for accepted records

use crate::extract::Record;
use crate::output::table::RecordTable;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Collects records from all workers
///
/// `accept` may be called concurrently from any number of workers.
/// `finalize` consumes the sink, so it can only run once every other handle is
/// gone.
#[derive(Debug, Default)]
pub struct ResultSink {
    records: Mutex<Vec<Record>>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an accepted record
    pub fn accept(&self, record: Record) {
        self.lock().push(record);
    }

    /// Number of records accepted so far
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Merges the accepted records into the prior table
    ///
    /// `columns` (the persisted rule names) are added to the table so the
    /// header is complete even for fields no record carried. On id collision
    /// the record from this run replaces the prior row.
    pub fn finalize(self, mut prior: RecordTable, columns: &[String]) -> RecordTable {
        let records = self
            .records
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let accepted = records.len();

        prior.add_columns(columns);
        let added = prior.merge(records);

        tracing::info!(
            "Merged {} records ({} new ids, {} replaced)",
            accepted,
            added,
            accepted - added
        );
        prior
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
