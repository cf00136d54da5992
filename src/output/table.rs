//! CSV record table
//!
//! The persisted state of the harvester is one CSV file with a header row and
//! one row per record, keyed by the `id` column. The table is read once at
//! startup (to find the crawl cursor and to merge into) and written once at the
//! end of a run.

use crate::extract::Record;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Errors reading or writing the CSV table
#[derive(Debug, Error)]
pub enum TableError {
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path} has no 'id' column")]
    MissingIdColumn { path: String },

    #[error("{path}, line {line}: empty id")]
    EmptyId { path: String, line: u64 },
}

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;

/// Cell values of one row by column name, `id` excluded
pub type Row = HashMap<String, String>;

/// An in-memory table of records keyed by id
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTable {
    columns: Vec<String>,
    rows: HashMap<String, Row>,
}

impl Default for RecordTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordTable {
    /// Creates an empty table with the `id` and `url` columns
    pub fn new() -> Self {
        Self {
            columns: vec!["id".to_string(), "url".to_string()],
            rows: HashMap::new(),
        }
    }

    /// Loads a table from a CSV file
    ///
    /// A missing file is an empty table (first run). An unreadable or
    /// malformed file is an error.
    pub fn load(path: &Path) -> TableResult<Self> {
        let origin = path.display().to_string();
        match File::open(path) {
            Ok(file) => {
                let table = Self::from_reader(file, &origin)?;
                tracing::info!("Loaded {} rows from {}", table.len(), origin);
                Ok(table)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No table at {}, starting empty", origin);
                Ok(Self::new())
            }
            Err(source) => Err(TableError::Io {
                path: origin,
                source,
            }),
        }
    }

    /// Reads a table from CSV text; `origin` names the source in errors
    pub fn from_reader<R: Read>(reader: R, origin: &str) -> TableResult<Self> {
        let csv_error = |source| TableError::Csv {
            path: origin.to_string(),
            source,
        };

        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers().map_err(csv_error)?.clone();
        let mut table = Self::new();

        if headers.is_empty() {
            return Ok(table);
        }

        let id_index = headers
            .iter()
            .position(|h| h == "id")
            .ok_or_else(|| TableError::MissingIdColumn {
                path: origin.to_string(),
            })?;
        table.add_columns(headers.iter());

        for result in reader.records() {
            let record = result.map_err(csv_error)?;
            let id = record.get(id_index).unwrap_or("").trim();
            if id.is_empty() {
                return Err(TableError::EmptyId {
                    path: origin.to_string(),
                    line: record.position().map(|p| p.line()).unwrap_or(0),
                });
            }

            let row: Row = headers
                .iter()
                .zip(record.iter())
                .filter(|(column, _)| *column != "id")
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .collect();

            if table.rows.insert(id.to_string(), row).is_some() {
                tracing::warn!("Duplicate id {} in {}, keeping the later row", id, origin);
            }
        }

        Ok(table)
    }

    /// Appends columns that are not present yet, keeping their order
    pub fn add_columns<I, S>(&mut self, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for column in columns {
            let column = column.as_ref();
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.to_string());
            }
        }
    }

    /// Inserts or replaces the row for a record
    ///
    /// Returns true if the id was not in the table before.
    pub fn upsert(&mut self, record: &Record) -> bool {
        self.add_columns(record.fields.keys());

        let mut row: Row = record
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();
        row.insert("url".to_string(), record.url.clone());

        self.rows.insert(record.id.clone(), row).is_none()
    }

    /// Upserts every record; new rows win over existing ones
    ///
    /// Returns the number of ids that were not in the table before.
    pub fn merge<I: IntoIterator<Item = Record>>(&mut self, records: I) -> usize {
        records
            .into_iter()
            .filter(|record| self.upsert(record))
            .count()
    }

    /// The id of the newest row: greatest non-empty value in `order_column`
    ///
    /// Dates are stored as `%Y-%m-%d %H:%M:%S`, so the greatest string is the
    /// latest date. Returns `None` when no row has a value in that column.
    pub fn latest_id(&self, order_column: &str) -> Option<&str> {
        self.rows
            .iter()
            .filter_map(|(id, row)| {
                row.get(order_column)
                    .filter(|value| !value.is_empty())
                    .map(|value| (value, id))
            })
            .max()
            .map(|(_, id)| id.as_str())
    }

    /// Ids ordered by `order_column` descending (rows without a value last),
    /// then by id
    pub fn sorted_ids(&self, order_column: &str) -> Vec<&str> {
        let mut ids: Vec<(&str, &str)> = self
            .rows
            .iter()
            .map(|(id, row)| {
                let key = row.get(order_column).map(String::as_str).unwrap_or("");
                (key, id.as_str())
            })
            .collect();
        ids.sort_by(|a, b| b.0.cmp(a.0).then_with(|| a.1.cmp(b.1)));
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Writes the table as CSV, rows ordered by [`Self::sorted_ids`]
    pub fn to_writer<W: Write>(&self, writer: W, order_column: &str, origin: &str) -> TableResult<()> {
        let csv_error = |source| TableError::Csv {
            path: origin.to_string(),
            source,
        };

        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns).map_err(csv_error)?;

        for id in self.sorted_ids(order_column) {
            let row = &self.rows[id];
            let cells = self.columns.iter().map(|column| {
                if column == "id" {
                    id
                } else {
                    row.get(column).map(String::as_str).unwrap_or("")
                }
            });
            writer.write_record(cells).map_err(csv_error)?;
        }

        writer.flush().map_err(|source| TableError::Io {
            path: origin.to_string(),
            source,
        })
    }

    /// Writes the table to `path` through a temporary file renamed into place
    pub fn write(&self, path: &Path, order_column: &str) -> TableResult<()> {
        let origin = path.display().to_string();
        let io_error = |source| TableError::Io {
            path: origin.clone(),
            source,
        };

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = Path::new(&tmp_name);

        let file = File::create(tmp_path).map_err(io_error)?;
        self.to_writer(file, order_column, &origin)?;
        std::fs::rename(tmp_path, path).map_err(io_error)?;

        tracing::info!("Wrote {} rows to {}", self.len(), origin);
        Ok(())
    }

    /// Gets a row by id
    pub fn get(&self, id: &str) -> Option<&Row> {
        self.rows.get(id)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
