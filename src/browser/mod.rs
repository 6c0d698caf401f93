//! The page-driver seam used by navigation and page-scrape capabilities.

pub mod http;

use std::fmt::{self, Debug};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html};

use crate::error::BrowserError;
use crate::extract::selector::{AttrFilter, MatchRule, SelectorRule};

pub use http::HttpBrowser;

/// Locator strategies, named as Selenium names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum By {
    Id,
    Name,
    ClassName,
    TagName,
    CssSelector,
    XPath,
    LinkText,
    PartialLinkText,
}

impl FromStr for By {
    type Err = BrowserError;

    /// Accepts both the constant names (`CSS_SELECTOR`) and their string
    /// values (`css selector`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', " ");
        Ok(match normalized.as_str() {
            "id" => By::Id,
            "name" => By::Name,
            "class name" => By::ClassName,
            "tag name" => By::TagName,
            "css selector" | "css" => By::CssSelector,
            "xpath" => By::XPath,
            "link text" => By::LinkText,
            "partial link text" => By::PartialLinkText,
            _ => return Err(BrowserError::UnknownLocator(s.to_string())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub by: By,
    pub value: String,
}

impl Locator {
    pub fn new(by: By, value: impl Into<String>) -> Self {
        Self { by, value: value.into() }
    }

    pub fn body() -> Self {
        Self::new(By::TagName, "body")
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}='{}'", self.by, self.value)
    }
}

/// A page driver: one current page, element lookup on it, bounded waits.
#[async_trait]
pub trait Browser: Send + Sync + Debug {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Outer markup of the first element matching `locator`, if any.
    async fn find(&self, locator: &Locator) -> Result<Option<String>, BrowserError>;

    /// Resolves once `locator` is present, or fails with `BrowserError::Timeout`.
    async fn wait_until_present(&self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError>;
}

/// Finds the first element of `html` matching `locator` and returns its
/// outer markup.
pub fn locate(html: &str, locator: &Locator) -> Result<Option<String>, BrowserError> {
    let rule = match locator.by {
        By::Id => SelectorRule::Match(MatchRule {
            id: Some(locator.value.clone()),
            ..MatchRule::default()
        }),
        By::Name => SelectorRule::Match(MatchRule {
            attrs: [("name".to_string(), AttrFilter::Equals(locator.value.clone()))]
                .into_iter()
                .collect(),
            ..MatchRule::default()
        }),
        By::ClassName => SelectorRule::Match(MatchRule {
            classes: vec![locator.value.clone()],
            ..MatchRule::default()
        }),
        By::TagName => SelectorRule::tag(&locator.value),
        By::CssSelector => SelectorRule::Css(locator.value.clone()),
        By::XPath => SelectorRule::XPath(locator.value.clone()),
        By::LinkText | By::PartialLinkText => {
            let document = Html::parse_document(html);
            let wanted = locator.value.trim();
            let exact = locator.by == By::LinkText;
            let found = document
                .root_element()
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|el| el.value().name() == "a")
                .find(|el| {
                    let text = el.text().collect::<String>();
                    let text = text.trim();
                    if exact { text == wanted } else { text.contains(wanted) }
                })
                .map(|el| el.html());
            return Ok(found);
        }
    };

    let compiled = rule.compile()?;
    let document = Html::parse_document(html);
    Ok(compiled.select(&document).first().map(|el| el.html()))
}
