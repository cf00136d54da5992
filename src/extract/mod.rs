//! Declarative extraction and validation
//!
//! This module turns a parsed detail page into a validated [`Record`]:
//! - `rules`: the [`FieldRule`] data model and its compiled [`RuleSet`]
//! - `engine`: the interpreter that applies a rule set to one document
//! - `value`: typed field values and records

mod engine;
mod rules;
mod value;

pub use engine::Rejection;
pub use rules::{Accessor, ConverterKind, FieldRule, Predicate, RuleSet, ValidityKind};
pub use value::{FieldValue, Record, DATE_FORMAT};
