use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use anyhow::{Result, anyhow};
use reqwest::Client;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::browser::Browser;
use crate::dsl::EngineSettings;
use crate::runtime::store::ConfigStore;

pub mod extract;
pub mod http;
pub mod page;
pub mod source;

/// The fixed set of capabilities a state may name as its `method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    ScrapePage,
    ExtractData,
    ProjectFields,
    GotoLink,
    GotoNextPage,
    CallApi,
    SendData,
    FetchSource,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::ScrapePage,
        Capability::ExtractData,
        Capability::ProjectFields,
        Capability::GotoLink,
        Capability::GotoNextPage,
        Capability::CallApi,
        Capability::SendData,
        Capability::FetchSource,
    ];

    /// The action name used in workflow documents.
    pub fn name(self) -> &'static str {
        match self {
            Capability::ScrapePage => "scrap_page",
            Capability::ExtractData => "extract_data",
            Capability::ProjectFields => "project_fields",
            Capability::GotoLink => "goto_link",
            Capability::GotoNextPage => "goto_next_page",
            Capability::CallApi => "call_api",
            Capability::SendData => "send_data",
            Capability::FetchSource => "fetch_source",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Substituted parameters of one step invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// First of `keys` that is declared, for parameters with aliases.
    pub fn get_any(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|k| self.0.get(*k))
    }

    pub fn require(&self, key: &str) -> Result<&Value> {
        self.0
            .get(key)
            .ok_or_else(|| anyhow!("Missing required parameter: {}", key))
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| anyhow!("Parameter '{}' must be a string", key))
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// What a handler can see of the run that invoked it.
pub struct ActionContext<'a> {
    pub state: &'a str,
    pub history: &'a BTreeMap<String, Value>,
    pub settings: &'a EngineSettings,
    pub browser: &'a dyn Browser,
    pub store: &'a ConfigStore,
    pub sources: &'a DashMap<String, Value>,
}

/// A capability implementation.
///
/// Expected failures (timeouts, missing elements, bad HTTP status) are
/// returned as `Ok(Value::Null)`. An `Err` aborts the run.
#[async_trait]
pub trait ActionHandler: Send + Sync + Debug {
    fn capability(&self) -> Capability;
    fn validate(&self, params: &Params) -> Result<()>;
    async fn execute(&self, params: Params, ctx: &ActionContext<'_>) -> Result<Value>;
}

/// One handler per capability, sharing `client` for outbound HTTP.
pub fn standard_actions(client: Client) -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(page::ScrapPageAction),
        Arc::new(page::GotoLinkAction),
        Arc::new(page::GotoNextPageAction),
        Arc::new(extract::ExtractDataAction),
        Arc::new(extract::ProjectFieldsAction),
        Arc::new(http::CallApiAction::new(client.clone())),
        Arc::new(http::SendDataAction::new(client)),
        Arc::new(source::FetchSourceAction),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_names_round_trip() {
        for capability in Capability::ALL {
            assert_eq!(Capability::from_name(capability.name()), Some(capability));
        }
        assert_eq!(Capability::from_name("scrape_page"), None);
        assert_eq!(Capability::from_name(""), None);
    }

    #[test]
    fn standard_set_covers_every_capability() {
        let mut covered: Vec<_> = standard_actions(Client::new())
            .iter()
            .map(|h| h.capability())
            .collect();
        covered.sort();
        assert_eq!(covered, Capability::ALL.to_vec());
    }

    #[test]
    fn params_report_missing_keys() {
        let params: Params = [("link".to_string(), Value::from("http://x"))].into_iter().collect();
        assert_eq!(params.require_str("link").unwrap(), "http://x");
        let err = params.require("by").unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: by");
    }
}
