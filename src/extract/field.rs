//! Field Projector: named field rules applied to extracted element records.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::extract::record::{ElementRecord, Extraction};
use crate::extract::xpath::{XNode, XPath, string_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Xpath,
    Html,
    Text,
    Attribute,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    #[default]
    Text,
    Attribute,
    Element,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub kind: FieldType,
    /// The expression evaluated for `xpath` fields.
    #[serde(default, alias = "attribute", alias = "path")]
    pub xpath: Option<String>,
    #[serde(default)]
    pub extract: ExtractMode,
    #[serde(default)]
    pub attribute_name: Option<String>,
}

impl FieldRule {
    pub fn xpath(expression: &str, extract: ExtractMode) -> Self {
        Self {
            kind: FieldType::Xpath,
            xpath: Some(expression.to_string()),
            extract,
            attribute_name: None,
        }
    }

    pub fn xpath_attribute(expression: &str, attribute_name: &str) -> Self {
        Self {
            attribute_name: Some(attribute_name.to_string()),
            ..Self::xpath(expression, ExtractMode::Attribute)
        }
    }
}

/// One projected row: field name to value (null when nothing was found).
pub type Row = Map<String, Value>;

pub type Projection = BTreeMap<usize, Vec<Row>>;

/// Projects every record through every field rule. Never fails: each field
/// that cannot be produced is null.
pub fn project(extracted: &Extraction, fields: &BTreeMap<String, FieldRule>) -> Projection {
    extracted
        .iter()
        .map(|(index, records)| {
            let rows = records.iter().map(|record| project_record(record, fields)).collect();
            (*index, rows)
        })
        .collect()
}

pub fn project_record(record: &ElementRecord, fields: &BTreeMap<String, FieldRule>) -> Row {
    fields
        .iter()
        .map(|(name, rule)| (name.clone(), project_field(record, name, rule)))
        .collect()
}

fn project_field(record: &ElementRecord, name: &str, rule: &FieldRule) -> Value {
    match rule.kind {
        FieldType::Xpath => xpath_field(record, name, rule),
        // Reserved field types: nothing is defined for them yet.
        FieldType::Html | FieldType::Text | FieldType::Attribute => Value::Null,
        FieldType::Unknown => {
            warn!(field = name, "Unknown field type, yielding null");
            Value::Null
        }
    }
}

fn xpath_field(record: &ElementRecord, name: &str, rule: &FieldRule) -> Value {
    let Some(expression) = rule.xpath.as_deref() else {
        warn!(field = name, "xpath field has no expression");
        return Value::Null;
    };
    let xpath = match XPath::parse(expression) {
        Ok(x) => x,
        Err(e) => {
            warn!(field = name, error = %e, "Invalid xpath, yielding null");
            return Value::Null;
        }
    };

    let fragment = reparse(record);
    let top = record_element(&fragment, &record.tag);
    let matches = xpath.select_within(top);
    let Some(first) = matches.first() else {
        debug!(field = name, xpath = xpath.as_str(), "No match for field");
        return Value::Null;
    };

    match rule.extract {
        ExtractMode::Text => Value::String(string_value(first, Some(top))),
        ExtractMode::Attribute => {
            let Some(attr) = rule.attribute_name.as_deref() else {
                warn!(field = name, "extract mode 'attribute' without attribute_name");
                return Value::Null;
            };
            match first {
                XNode::Element(el) => el
                    .value()
                    .attr(attr)
                    .map(|v| Value::String(v.to_string()))
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            }
        }
        ExtractMode::Element => match first {
            XNode::Element(el) => Value::String(el.html()),
            XNode::Root => Value::String(top.html()),
            other => Value::String(string_value(other, None)),
        },
        ExtractMode::Unknown => {
            warn!(field = name, "Unknown extract mode, yielding null");
            Value::Null
        }
    }
}

/// Parses a record's markup inside the parents its tag requires, so table
/// parts keep their structure.
fn reparse(record: &ElementRecord) -> Html {
    let (open, close) = match record.tag.as_str() {
        "tr" => ("<table><tbody>", "</tbody></table>"),
        "td" | "th" => ("<table><tbody><tr>", "</tr></tbody></table>"),
        "thead" | "tbody" | "tfoot" | "caption" | "colgroup" => ("<table>", "</table>"),
        "col" => ("<table><colgroup>", "</colgroup></table>"),
        _ => ("", ""),
    };
    Html::parse_fragment(&format!("{open}{}{close}", record.raw))
}

/// The first element named `tag`, or the fragment root when parsing dropped it.
fn record_element<'a>(fragment: &'a Html, tag: &str) -> ElementRef<'a> {
    let root = fragment.root_element();
    root.descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| *el != root && el.value().name().eq_ignore_ascii_case(tag))
        .unwrap_or(root)
}

/// Decodes the `fields` step parameter.
pub fn fields_from_value(value: &Value) -> Result<BTreeMap<String, FieldRule>, serde_json::Error> {
    serde_json::from_value(value.clone())
}

pub fn projection_to_value(projection: &Projection) -> Value {
    let map: Map<String, Value> = projection
        .iter()
        .map(|(index, rows)| {
            let rows = rows.iter().cloned().map(Value::Object).collect();
            (index.to_string(), Value::Array(rows))
        })
        .collect();
    Value::Object(map)
}
