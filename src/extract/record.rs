//! Record Extractor: selector rules in, element records out.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ExtractError;
use crate::extract::selector::SelectorRule;

/// Normalised view of one matched element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub tag: String,
    /// Own attributes, plus one nested map per child element keyed by the
    /// child's tag name.
    pub attributes: Map<String, Value>,
    pub text: String,
    pub raw: String,
}

impl ElementRecord {
    pub fn from_element(el: ElementRef<'_>) -> Self {
        Self {
            tag: el.value().name().to_string(),
            attributes: extract_attributes(el),
            text: el.text().collect::<String>().trim().to_string(),
            raw: el.html(),
        }
    }
}

/// Rule index to the records it matched, in document order.
pub type Extraction = BTreeMap<usize, Vec<ElementRecord>>;

/// Flattens an element's attributes recursively.
///
/// Children are visited in document order and stored under their tag name,
/// so when several children share a tag the last one wins. A child whose tag
/// equals one of the element's own attribute names replaces that attribute.
pub fn extract_attributes(el: ElementRef<'_>) -> Map<String, Value> {
    let mut attributes: Map<String, Value> = el
        .value()
        .attrs()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect();

    for child in el.children().filter_map(ElementRef::wrap) {
        let nested = extract_attributes(child);
        attributes.insert(child.value().name().to_string(), Value::Object(nested));
    }
    attributes
}

/// Applies every rule to `html`. Any invalid rule fails the whole call so
/// callers never see a partially populated mapping.
pub fn extract(html: &str, rules: &[SelectorRule]) -> Result<Extraction, ExtractError> {
    let compiled = rules
        .iter()
        .map(SelectorRule::compile)
        .collect::<Result<Vec<_>, _>>()?;

    let document = Html::parse_document(html);
    let mut extraction = Extraction::new();
    for (index, rule) in compiled.iter().enumerate() {
        let records: Vec<ElementRecord> = rule
            .select(&document)
            .into_iter()
            .map(ElementRecord::from_element)
            .collect();
        debug!(rule = ?rules[index], matches = records.len(), "Selector applied");
        extraction.insert(index, records);
    }
    Ok(extraction)
}

/// Decodes selector rules supplied as a step parameter.
pub fn rules_from_value(value: &Value) -> Result<Vec<SelectorRule>, ExtractError> {
    let items = value
        .as_array()
        .ok_or_else(|| ExtractError::InvalidRule("selectors must be a list".into()))?;
    items.iter().map(SelectorRule::from_value).collect()
}

/// JSON shape handed between steps: `{"<index>": [record, ...]}`.
pub fn extraction_to_value(extraction: &Extraction) -> Value {
    let map: Map<String, Value> = extraction
        .iter()
        .map(|(index, records)| {
            let records = records
                .iter()
                .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
                .collect();
            (index.to_string(), Value::Array(records))
        })
        .collect();
    Value::Object(map)
}

/// Inverse of [`extraction_to_value`]; entries that are not valid records are
/// reported as an error.
pub fn extraction_from_value(value: &Value) -> Result<Extraction, ExtractError> {
    let map = value
        .as_object()
        .ok_or_else(|| ExtractError::InvalidRule("extracted data must be a mapping".into()))?;
    map.iter()
        .map(|(key, records)| {
            let index = key
                .parse::<usize>()
                .map_err(|_| ExtractError::InvalidRule(format!("'{key}' is not a rule index")))?;
            let records = serde_json::from_value::<Vec<ElementRecord>>(records.clone())
                .map_err(|e| ExtractError::InvalidRule(e.to_string()))?;
            Ok((index, records))
        })
        .collect()
}
