//! Typed field values and the records built from them

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;

/// Storage format for dates; lexical order matches chronological order.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A converted field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Date(NaiveDateTime),
}

impl FieldValue {
    /// Returns the integer payload, if this is a numeric value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

/// A validated record extracted from one detail page
///
/// Records are only ever built by the extraction engine, and only after every
/// evaluated rule passed.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// External identifier from the listing page
    pub id: String,

    /// Detail page URL
    pub url: String,

    /// Persisted fields by rule name
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub(crate) fn new(id: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            fields: BTreeMap::new(),
        }
    }

    /// Gets a field by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}
