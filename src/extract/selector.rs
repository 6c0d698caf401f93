//! Selector rules: how candidate nodes are found in a document.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ExtractError;
use crate::extract::xpath::XPath;

/// Tag/class/id/attribute filters, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchRule {
    pub tag: Option<String>,
    pub classes: Vec<String>,
    pub id: Option<String>,
    pub attrs: BTreeMap<String, AttrFilter>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AttrFilter {
    /// `true` requires presence, `false` requires absence.
    Present(bool),
    Equals(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawSelectorRule")]
pub enum SelectorRule {
    Match(MatchRule),
    Css(String),
    XPath(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassFilter {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawSelectorRule {
    #[serde(default, alias = "name")]
    tag: Option<String>,
    #[serde(default, alias = "class_")]
    class: Option<ClassFilter>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    attrs: BTreeMap<String, AttrFilter>,
    #[serde(default)]
    css: Option<String>,
    #[serde(default)]
    xpath: Option<String>,
}

impl TryFrom<RawSelectorRule> for SelectorRule {
    type Error = String;

    fn try_from(raw: RawSelectorRule) -> Result<Self, Self::Error> {
        if let Some(xpath) = raw.xpath {
            return Ok(SelectorRule::XPath(xpath));
        }
        if let Some(css) = raw.css {
            return Ok(SelectorRule::Css(css));
        }

        let classes = match raw.class {
            Some(ClassFilter::One(s)) => s.split_whitespace().map(str::to_string).collect(),
            Some(ClassFilter::Many(list)) => list,
            None => Vec::new(),
        };
        let rule = MatchRule {
            tag: raw.tag,
            classes,
            id: raw.id,
            attrs: raw.attrs,
        };
        if rule == MatchRule::default() {
            return Err("selector rule needs at least one of tag, class, id, attrs, css or xpath".into());
        }
        Ok(SelectorRule::Match(rule))
    }
}

impl SelectorRule {
    pub fn tag(tag: &str) -> Self {
        SelectorRule::Match(MatchRule {
            tag: Some(tag.to_string()),
            ..MatchRule::default()
        })
    }

    pub fn tag_class(tag: &str, class: &str) -> Self {
        SelectorRule::Match(MatchRule {
            tag: Some(tag.to_string()),
            classes: vec![class.to_string()],
            ..MatchRule::default()
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, ExtractError> {
        serde_json::from_value(value.clone()).map_err(|e| ExtractError::InvalidRule(e.to_string()))
    }

    /// Compiles the rule once so it can be applied to many documents.
    pub fn compile(&self) -> Result<CompiledRule, ExtractError> {
        Ok(match self {
            SelectorRule::Match(rule) => CompiledRule::Match(rule.clone()),
            SelectorRule::Css(css) => CompiledRule::Css(parse_css(css)?),
            SelectorRule::XPath(expr) => CompiledRule::XPath(XPath::parse(expr)?),
        })
    }
}

#[derive(Debug)]
pub enum CompiledRule {
    Match(MatchRule),
    Css(Selector),
    XPath(XPath),
}

impl CompiledRule {
    /// Matched elements in document order. XPath results that are not
    /// elements (text, attributes) are skipped.
    pub fn select<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        match self {
            CompiledRule::Match(rule) => document
                .root_element()
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|el| rule.matches(el))
                .collect(),
            CompiledRule::Css(selector) => document.select(selector).collect(),
            CompiledRule::XPath(xpath) => xpath
                .select_document(document)
                .into_iter()
                .filter_map(|n| n.as_element())
                .collect(),
        }
    }
}

impl MatchRule {
    pub fn matches(&self, el: &ElementRef<'_>) -> bool {
        let element = el.value();
        if let Some(tag) = &self.tag {
            if !element.name().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| element.classes().any(|have| have == c)) {
            return false;
        }
        if let Some(id) = &self.id {
            if element.id() != Some(id.as_str()) {
                return false;
            }
        }
        self.attrs.iter().all(|(name, filter)| match filter {
            AttrFilter::Present(wanted) => element.attr(name).is_some() == *wanted,
            AttrFilter::Equals(value) => element.attr(name) == Some(value.as_str()),
        })
    }
}

pub fn parse_css(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::InvalidSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}
