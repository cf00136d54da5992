//! Declarative field rules
//!
//! A [`FieldRule`] describes where a value lives on a detail page, how to read
//! it, how to convert it, and what makes it valid. Rules are plain data loaded
//! from the `[[rules]]` section of the configuration; converters and validity
//! checks are closed sets of tagged variants so the whole rule table stays
//! serializable and testable.

use crate::extract::value::FieldValue;
use crate::ConfigError;
use chrono::{NaiveDate, NaiveDateTime};
use scraper::{Html, Node, Selector};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// One declarative extraction instruction
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    /// Output column name
    pub name: String,

    /// CSS selector locating candidate nodes
    pub selector: String,

    /// Keep only matched nodes whose text contains this substring
    #[serde(default, rename = "text-contains")]
    pub text_contains: Option<String>,

    /// Read the next element sibling of the matched node instead of the node
    #[serde(default, rename = "next-sibling")]
    pub next_sibling: bool,

    #[serde(default)]
    pub accessor: Accessor,

    /// Whether an empty selection rejects the record (otherwise it is skipped)
    #[serde(default = "default_true")]
    pub required: bool,

    #[serde(default)]
    pub converter: ConverterKind,

    #[serde(default)]
    pub validity: ValidityKind,

    /// Whether the converted value is written into the record
    #[serde(default = "default_true")]
    pub persist: bool,
}

fn default_true() -> bool {
    true
}

/// How a located node is read
///
/// Written in configuration as `"text"`, `"html"` or `"attr:<name>"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Accessor {
    /// Concatenated text content, trimmed
    #[default]
    Text,

    /// Inner HTML, trimmed
    InnerHtml,

    /// A named attribute
    Attribute(String),
}

impl TryFrom<String> for Accessor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "text" => Ok(Self::Text),
            "html" => Ok(Self::InnerHtml),
            other => match other.strip_prefix("attr:") {
                Some(name) if !name.trim().is_empty() => {
                    Ok(Self::Attribute(name.trim().to_string()))
                }
                _ => Err(format!(
                    "unknown accessor '{}' (expected \"text\", \"html\" or \"attr:<name>\")",
                    other
                )),
            },
        }
    }
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::InnerHtml => f.write_str("html"),
            Self::Attribute(name) => write!(f, "attr:{}", name),
        }
    }
}

/// Conversion applied to the raw accessed value
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConverterKind {
    #[default]
    Identity,

    /// First run of ASCII digits, parsed as an integer
    Integer,

    /// First run of ASCII digits, kept as text
    Digits,

    /// Date or date-time in the given strftime format
    Date { format: String },

    /// Markup reduced to text: `<br>` tags become spaces, other tags are
    /// stripped, entities decoded, whitespace collapsed
    Normalize,
}

impl ConverterKind {
    /// Converts a raw value
    ///
    /// # Returns
    ///
    /// * `Ok(FieldValue)` - The typed value
    /// * `Err(String)` - Why the raw value could not be interpreted
    pub fn convert(&self, raw: &str) -> Result<FieldValue, String> {
        match self {
            Self::Identity => Ok(FieldValue::Text(raw.to_string())),
            Self::Integer => {
                let digits = first_digit_run(raw).ok_or_else(|| "no digits found".to_string())?;
                digits
                    .parse::<i64>()
                    .map(FieldValue::Integer)
                    .map_err(|e| e.to_string())
            }
            Self::Digits => first_digit_run(raw)
                .map(|digits| FieldValue::Text(digits.to_string()))
                .ok_or_else(|| "no digits found".to_string()),
            Self::Date { format } => parse_date(raw.trim(), format).map(FieldValue::Date),
            Self::Normalize => Ok(FieldValue::Text(normalize_text(raw))),
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer)
    }
}

/// Returns the first run of consecutive ASCII digits in `s`
fn first_digit_run(s: &str) -> Option<&str> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

fn parse_date(raw: &str, format: &str) -> Result<NaiveDateTime, String> {
    match NaiveDateTime::parse_from_str(raw, format) {
        Ok(datetime) => Ok(datetime),
        Err(datetime_err) => NaiveDate::parse_from_str(raw, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or_else(|| datetime_err.to_string()),
    }
}

/// Reads markup as plain text: `<br>` becomes a space, other tags are
/// dropped, entities are decoded, and whitespace is collapsed.
fn normalize_text(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let mut text = String::with_capacity(raw.len());
    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(chunk) => text.push_str(chunk),
            Node::Element(element) if element.name() == "br" => text.push(' '),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validity constraint on a converted value
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ValidityKind {
    #[default]
    Always,

    /// Inclusive numeric range
    Range { min: i64, max: i64 },

    Predicate { check: Predicate },
}

/// Closed set of boolean checks on a converted value
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Predicate {
    /// Always passes
    Accept,

    /// Always fails: any record where this field is present is dropped
    Reject,

    NonEmpty,
    Contains(String),
    Excludes(String),
}

impl Predicate {
    pub fn test(&self, value: &FieldValue) -> bool {
        let text = value.to_string();
        match self {
            Self::Accept => true,
            Self::Reject => false,
            Self::NonEmpty => !text.trim().is_empty(),
            Self::Contains(needle) => text.contains(needle.as_str()),
            Self::Excludes(needle) => !text.contains(needle.as_str()),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => f.write_str("accept"),
            Self::Reject => f.write_str("reject"),
            Self::NonEmpty => f.write_str("non-empty"),
            Self::Contains(needle) => write!(f, "contains {:?}", needle),
            Self::Excludes(needle) => write!(f, "excludes {:?}", needle),
        }
    }
}

/// A rule with its selector parsed
#[derive(Debug)]
pub(crate) struct CompiledRule {
    pub(crate) rule: FieldRule,
    pub(crate) selector: Selector,
}

/// An ordered, compiled rule table
///
/// Read-only after construction; share it between workers behind an `Arc`.
#[derive(Debug)]
pub struct RuleSet {
    pub(crate) rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compiles and validates a rule table
    ///
    /// # Errors
    ///
    /// * `ConfigError::InvalidSelector` - A selector does not parse
    /// * `ConfigError::Validation` - Duplicate or reserved names, inverted
    ///   ranges, ranges on non-numeric converters, empty date formats
    pub fn compile(rules: &[FieldRule]) -> Result<Self, ConfigError> {
        let mut names = HashSet::new();
        let mut compiled = Vec::with_capacity(rules.len());

        for rule in rules {
            let name = rule.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Validation(
                    "rule name cannot be empty".to_string(),
                ));
            }
            if name == "id" || name == "url" {
                return Err(ConfigError::Validation(format!(
                    "rule name '{}' is reserved",
                    name
                )));
            }
            if !names.insert(name.to_string()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate rule name '{}'",
                    name
                )));
            }

            if let ValidityKind::Range { min, max } = rule.validity {
                if min > max {
                    return Err(ConfigError::Validation(format!(
                        "rule '{}': range min {} is greater than max {}",
                        name, min, max
                    )));
                }
                if !rule.converter.is_numeric() {
                    return Err(ConfigError::Validation(format!(
                        "rule '{}': a range check needs the integer converter",
                        name
                    )));
                }
            }

            if let ConverterKind::Date { format } = &rule.converter {
                if format.trim().is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "rule '{}': date format cannot be empty",
                        name
                    )));
                }
            }

            let selector =
                Selector::parse(&rule.selector).map_err(|e| ConfigError::InvalidSelector {
                    owner: format!("rule '{}'", name),
                    message: format!("{:?}", e),
                })?;

            let mut rule = rule.clone();
            rule.name = name.to_string();
            compiled.push(CompiledRule { rule, selector });
        }

        Ok(Self { rules: compiled })
    }

    /// Names of the rules whose values end up in records, in rule order
    pub fn persisted_columns(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter(|c| c.rule.persist)
            .map(|c| c.rule.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
