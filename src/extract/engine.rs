//! Rule interpreter
//!
//! Applies a [`RuleSet`] to one parsed detail page. Evaluation follows rule
//! order and stops at the first rejection, so a record is either returned with
//! every evaluated rule satisfied or not returned at all.

use crate::crawler::CandidateItem;
use crate::extract::rules::{Accessor, CompiledRule, RuleSet, ValidityKind};
use crate::extract::value::{FieldValue, Record};
use scraper::{ElementRef, Html};
use thiserror::Error;

/// Why a detail page did not produce a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("required field '{field}' not found")]
    MissingField { field: String },

    #[error("field '{field}': cannot interpret {raw:?}: {reason}")]
    Conversion {
        field: String,
        raw: String,
        reason: String,
    },

    #[error("field '{field}': {value} outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("field '{field}': {value:?} failed check '{check}'")]
    PredicateFailed {
        field: String,
        value: String,
        check: String,
    },
}

impl Rejection {
    /// True for values the page carried but could not be interpreted.
    ///
    /// Everything else is an expected filtering outcome.
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, Self::Conversion { .. })
    }
}

impl RuleSet {
    /// Extracts a validated record from a detail page
    ///
    /// The record is seeded with the item's `id` and `url`; every rule marked
    /// `persist` that was evaluated adds its converted value.
    ///
    /// # Example
    ///
    /// ```
    /// use listing_harvester::crawler::CandidateItem;
    /// use listing_harvester::extract::{FieldRule, RuleSet};
    /// use scraper::Html;
    ///
    /// let rules: Vec<FieldRule> = vec![toml::from_str(
    ///     r#"
    ///     name = "rooms"
    ///     selector = "span.rooms"
    ///     converter = { kind = "integer" }
    ///     validity = { kind = "range", min = 2, max = 6 }
    ///     "#,
    /// )
    /// .unwrap()];
    /// let rule_set = RuleSet::compile(&rules).unwrap();
    ///
    /// let doc = Html::parse_document(r#"<span class="rooms">4 Zimmer</span>"#);
    /// let item = CandidateItem::new("https://example.com/ad/1", "1");
    /// let record = rule_set.extract(&doc, &item).unwrap();
    /// assert_eq!(record.get("rooms").unwrap().to_string(), "4");
    /// ```
    pub fn extract(&self, document: &Html, item: &CandidateItem) -> Result<Record, Rejection> {
        let mut record = Record::new(&item.external_id, &item.detail_url);

        for compiled in &self.rules {
            let rule = &compiled.rule;

            let Some(node) = compiled.first_match(document) else {
                if rule.required {
                    return Err(Rejection::MissingField {
                        field: rule.name.clone(),
                    });
                }
                tracing::trace!("Optional field '{}' absent, skipping", rule.name);
                continue;
            };

            // A matched node without readable content is tolerated even for
            // required rules.
            let Some(raw) = read_node(node, &rule.accessor) else {
                tracing::trace!("Field '{}' matched but empty, skipping", rule.name);
                continue;
            };

            let value = rule
                .converter
                .convert(&raw)
                .map_err(|reason| Rejection::Conversion {
                    field: rule.name.clone(),
                    raw: raw.clone(),
                    reason,
                })?;

            check_validity(&rule.name, &rule.validity, &value)?;

            if rule.persist {
                record.fields.insert(rule.name.clone(), value);
            }
        }

        Ok(record)
    }
}

impl CompiledRule {
    /// Finds the node this rule reads from, after the text and sibling filters
    fn first_match<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        document
            .select(&self.selector)
            .filter(|element| match &self.rule.text_contains {
                Some(needle) => element.text().collect::<String>().contains(needle.as_str()),
                None => true,
            })
            .filter_map(|element| {
                if self.rule.next_sibling {
                    element.next_siblings().find_map(ElementRef::wrap)
                } else {
                    Some(element)
                }
            })
            .next()
    }
}

/// Reads a node; `None` when the value is absent or blank
fn read_node(node: ElementRef<'_>, accessor: &Accessor) -> Option<String> {
    let raw = match accessor {
        Accessor::Text => node.text().collect::<String>(),
        Accessor::InnerHtml => node.inner_html(),
        Accessor::Attribute(name) => node.value().attr(name)?.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn check_validity(field: &str, validity: &ValidityKind, value: &FieldValue) -> Result<(), Rejection> {
    match validity {
        ValidityKind::Always => Ok(()),
        ValidityKind::Range { min, max } => {
            let Some(n) = value.as_integer() else {
                return Err(Rejection::Conversion {
                    field: field.to_string(),
                    raw: value.to_string(),
                    reason: "range check on a non-numeric value".to_string(),
                });
            };
            if *min <= n && n <= *max {
                Ok(())
            } else {
                Err(Rejection::OutOfRange {
                    field: field.to_string(),
                    value: n,
                    min: *min,
                    max: *max,
                })
            }
        }
        ValidityKind::Predicate { check } => {
            if check.test(value) {
                Ok(())
            } else {
                Err(Rejection::PredicateFailed {
                    field: field.to_string(),
                    value: value.to_string(),
                    check: check.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::rules::{ConverterKind, FieldRule, Predicate};

    fn rule(name: &str, selector: &str) -> FieldRule {
        FieldRule {
            name: name.to_string(),
            selector: selector.to_string(),
            text_contains: None,
            next_sibling: false,
            accessor: Accessor::Text,
            required: true,
            converter: ConverterKind::Identity,
            validity: ValidityKind::Always,
            persist: true,
        }
    }

    fn integer_rule(name: &str, selector: &str, min: i64, max: i64) -> FieldRule {
        FieldRule {
            converter: ConverterKind::Integer,
            validity: ValidityKind::Range { min, max },
            ..rule(name, selector)
        }
    }

    fn item() -> CandidateItem {
        CandidateItem::new("https://example.com/ad/42", "42")
    }

    const DETAIL_PAGE: &str = r#"
        <html><body>
        <div id="box-maincontent">
            <span id="advert-info-dateTime">07.03.2019 09:05</span>
            <div class="box-body">
                <span>Grundfläche 500 m²</span>
                <span>Wohnfläche 120 m²</span>
                <span>Zimmer 4</span>
            </div>
            <div class="price-box"><div id="priceBox-price">€ 650</div></div>
            <div class="additional-prices">
                <span>Kaution</span><span>1300</span>
                <dd itemprop="Address">Hauptstraße 1<br>1010 Wien</dd>
                <span class="empty">   </span>
            </div>
        </div>
        </body></html>
    "#;

    fn extract(rules: Vec<FieldRule>) -> Result<Record, Rejection> {
        let set = RuleSet::compile(&rules).unwrap();
        let doc = Html::parse_document(DETAIL_PAGE);
        set.extract(&doc, &item())
    }

    #[test]
    fn test_full_record_extracted() {
        let mut size = integer_rule("house_size", "div.box-body span", 50, 140);
        size.text_contains = Some("Wohnfläche".to_string());
        let mut deposit = integer_rule("deposit", "div.additional-prices span", 0, 2000);
        deposit.text_contains = Some("Kaution".to_string());
        deposit.next_sibling = true;
        let date = FieldRule {
            converter: ConverterKind::Date {
                format: "%d.%m.%Y %H:%M".to_string(),
            },
            ..rule("date", "#advert-info-dateTime")
        };
        let address = FieldRule {
            accessor: Accessor::InnerHtml,
            converter: ConverterKind::Normalize,
            ..rule("address", "dd[itemprop=Address]")
        };

        let record = extract(vec![
            date,
            size,
            integer_rule("overall_price", "#priceBox-price", 400, 800),
            deposit,
            address,
        ])
        .unwrap();

        assert_eq!(record.id, "42");
        assert_eq!(record.url, "https://example.com/ad/42");
        assert_eq!(record.get("date").unwrap().to_string(), "2019-03-07 09:05:00");
        assert_eq!(record.get("house_size"), Some(&FieldValue::Integer(120)));
        assert_eq!(record.get("overall_price"), Some(&FieldValue::Integer(650)));
        assert_eq!(record.get("deposit"), Some(&FieldValue::Integer(1300)));
        assert_eq!(
            record.get("address"),
            Some(&FieldValue::Text("Hauptstraße 1 1010 Wien".to_string()))
        );
    }

    #[test]
    fn test_html_address_stored_as_plain_text() {
        let address = FieldRule {
            accessor: Accessor::InnerHtml,
            converter: ConverterKind::Normalize,
            ..rule("address", "dd[itemprop=Address]")
        };
        let set = RuleSet::compile(&[address]).unwrap();
        let doc = Html::parse_document(
            r#"<dl><dd itemprop="Address">Haupt &amp; Co<br>1010 <b>Wien</b></dd></dl>"#,
        );

        let record = set.extract(&doc, &item()).unwrap();

        assert_eq!(
            record.get("address"),
            Some(&FieldValue::Text("Haupt & Co 1010 Wien".to_string()))
        );
    }

    #[test]
    fn test_optional_empty_selection_is_skipped() {
        let missing = FieldRule {
            required: false,
            ..rule("balcony", "#balcony")
        };
        let record = extract(vec![missing, rule("price", "#priceBox-price")]).unwrap();

        assert!(record.get("balcony").is_none());
        assert_eq!(record.fields.len(), 1);
    }

    #[test]
    fn test_required_empty_selection_rejects() {
        let result = extract(vec![rule("price", "#priceBox-price"), rule("balcony", "#balcony")]);
        assert_eq!(
            result,
            Err(Rejection::MissingField {
                field: "balcony".to_string()
            })
        );
    }

    #[test]
    fn test_text_filter_counts_as_selection() {
        let mut garage = rule("garage", "div.box-body span");
        garage.text_contains = Some("Garage".to_string());
        assert!(matches!(
            extract(vec![garage]),
            Err(Rejection::MissingField { .. })
        ));
    }

    #[test]
    fn test_matched_but_blank_is_skipped_even_when_required() {
        let record = extract(vec![rule("note", "span.empty")]).unwrap();
        assert!(record.get("note").is_none());
    }

    #[test]
    fn test_missing_attribute_is_skipped() {
        let href = FieldRule {
            accessor: Accessor::Attribute("href".to_string()),
            ..rule("link", "#priceBox-price")
        };
        let record = extract(vec![href]).unwrap();
        assert!(record.fields.is_empty());
    }

    #[test]
    fn test_out_of_range_rejects_whole_record() {
        let mut size = integer_rule("house_size", "div.box-body span", 50, 110);
        size.text_contains = Some("Wohnfläche".to_string());
        let result = extract(vec![rule("price", "#priceBox-price"), size]);
        assert_eq!(
            result,
            Err(Rejection::OutOfRange {
                field: "house_size".to_string(),
                value: 120,
                min: 50,
                max: 110,
            })
        );
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        assert!(extract(vec![integer_rule("price", "#priceBox-price", 650, 650)]).is_ok());
        assert!(extract(vec![integer_rule("price", "#priceBox-price", 651, 900)]).is_err());
    }

    #[test]
    fn test_conversion_failure_is_hard_rejection() {
        let date = FieldRule {
            converter: ConverterKind::Date {
                format: "%Y-%m-%d".to_string(),
            },
            ..rule("date", "#advert-info-dateTime")
        };
        let result = extract(vec![date]);
        let rejection = result.unwrap_err();
        assert!(rejection.is_parse_failure());
    }

    #[test]
    fn test_predicate_reject_drops_record() {
        let mut provision = rule("provision", "div.additional-prices span");
        provision.text_contains = Some("Kaution".to_string());
        provision.validity = ValidityKind::Predicate {
            check: Predicate::Reject,
        };
        let rejection = extract(vec![provision]).unwrap_err();
        assert!(matches!(rejection, Rejection::PredicateFailed { .. }));
        assert!(!rejection.is_parse_failure());
    }

    #[test]
    fn test_unpersisted_rule_gates_without_storing() {
        let gate = FieldRule {
            persist: false,
            ..integer_rule("price_gate", "#priceBox-price", 400, 800)
        };
        let record = extract(vec![gate]).unwrap();
        assert!(record.fields.is_empty());
        assert_eq!(record.id, "42");
    }

    #[test]
    fn test_short_circuit_stops_before_later_rules() {
        // The second rule would reject with MissingField if evaluated.
        let result = extract(vec![
            integer_rule("price", "#priceBox-price", 0, 10),
            rule("balcony", "#balcony"),
        ]);
        assert!(matches!(result, Err(Rejection::OutOfRange { .. })));
    }
}
