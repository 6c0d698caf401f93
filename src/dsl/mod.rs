pub mod builder;

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Marker that substitutes the previous step's result into a parameter.
pub const PREVIOUS_RESULT: &str = "{previous_result}";

/// A workflow document: the state graph plus free-form settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    pub initial_state: String,
    #[serde(
        default,
        rename = "userAgent",
        alias = "user_agent",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "EngineSettings::is_default")]
    pub settings: EngineSettings,
    pub states: BTreeMap<String, StepConfig>,
    /// Unrecognised top-level keys, kept so persistence does not drop them.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl WorkflowConfig {
    pub fn step(&self, state: &str) -> Option<&StepConfig> {
        self.states.get(state)
    }
}

/// One node of the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepConfig {
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub next_state: Option<NextState>,
}

/// A step parameter, decided when the document is loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Literal(Value),
    PreviousResult,
}

impl ParamValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        ParamValue::Literal(value.into())
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Literal(v) => v.serialize(serializer),
            ParamValue::PreviousResult => serializer.serialize_str(PREVIOUS_RESULT),
        }
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) if s == PREVIOUS_RESULT => ParamValue::PreviousResult,
            other => ParamValue::Literal(other),
        })
    }
}

/// How the state after a step is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NextState {
    Static(String),
    When(WhenBranch),
    OnResult(NullBranch),
}

/// `{ when: "<expr>", then: a, else: b }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhenBranch {
    pub when: String,
    #[serde(default)]
    pub then: Option<String>,
    #[serde(default, rename = "else")]
    pub otherwise: Option<String>,
}

/// `{ on_null: a, otherwise: b }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NullBranch {
    #[serde(default)]
    pub on_null: Option<String>,
    #[serde(default)]
    pub otherwise: Option<String>,
}

impl NextState {
    pub fn to(state: &str) -> Self {
        NextState::Static(state.to_string())
    }

    pub fn on_null(on_null: Option<&str>, otherwise: Option<&str>) -> Self {
        NextState::OnResult(NullBranch {
            on_null: on_null.map(str::to_string),
            otherwise: otherwise.map(str::to_string),
        })
    }

    pub fn when(expr: &str, then: Option<&str>, otherwise: Option<&str>) -> Self {
        NextState::When(WhenBranch {
            when: expr.to_string(),
            then: then.map(str::to_string),
            otherwise: otherwise.map(str::to_string),
        })
    }

    /// Every state name this transition can reach.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            NextState::Static(s) => vec![s.as_str()],
            NextState::When(b) => b.then.iter().chain(b.otherwise.iter()).map(String::as_str).collect(),
            NextState::OnResult(b) => b.on_null.iter().chain(b.otherwise.iter()).map(String::as_str).collect(),
        }
    }
}

/// What happens after a step produced a null result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullPolicy {
    /// The null flows into the next step and its next-state resolution.
    #[default]
    Continue,
    /// The run stops right after the step that returned null.
    Halt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    pub on_null: NullPolicy,
    pub page_timeout_secs: u64,
    pub api_timeout_secs: u64,
    pub settle_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_dump: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_steps: None,
            on_null: NullPolicy::Continue,
            page_timeout_secs: 10,
            api_timeout_secs: 10,
            settle_ms: 0,
            raw_dump: None,
        }
    }
}

impl EngineSettings {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}
