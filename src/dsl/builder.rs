use crate::dsl::{EngineSettings, NextState, NullPolicy, ParamValue, StepConfig, WorkflowConfig};
use std::collections::BTreeMap;
use serde_json::Value;

pub struct WorkflowBuilder {
    initial_state: String,
    user_agent: Option<String>,
    settings: EngineSettings,
    states: BTreeMap<String, StepConfig>,
    extra: BTreeMap<String, serde_yaml::Value>,
}

impl WorkflowBuilder {
    pub fn new(initial_state: &str) -> Self {
        Self {
            initial_state: initial_state.to_string(),
            user_agent: None,
            settings: EngineSettings::default(),
            states: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    pub fn max_steps(mut self, limit: usize) -> Self {
        self.settings.max_steps = Some(limit);
        self
    }

    pub fn on_null(mut self, policy: NullPolicy) -> Self {
        self.settings.on_null = policy;
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn extra(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn state(self, name: &str, method: &str) -> StateBuilder {
        StateBuilder {
            workflow_builder: self,
            name: name.to_string(),
            method: method.to_string(),
            parameters: BTreeMap::new(),
            next_state: None,
        }
    }

    pub fn build(self) -> WorkflowConfig {
        WorkflowConfig {
            initial_state: self.initial_state,
            user_agent: self.user_agent,
            settings: self.settings,
            states: self.states,
            extra: self.extra,
        }
    }
}

pub struct StateBuilder {
    workflow_builder: WorkflowBuilder,
    name: String,
    method: String,
    parameters: BTreeMap<String, ParamValue>,
    next_state: Option<NextState>,
}

impl StateBuilder {
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), ParamValue::Literal(value.into()));
        self
    }

    /// Feeds the previous step's result into `key`.
    pub fn previous_result(mut self, key: &str) -> Self {
        self.parameters.insert(key.to_string(), ParamValue::PreviousResult);
        self
    }

    pub fn next(mut self, state: &str) -> Self {
        self.next_state = Some(NextState::to(state));
        self
    }

    pub fn next_state(mut self, next: NextState) -> Self {
        self.next_state = Some(next);
        self
    }

    pub fn build(mut self) -> WorkflowBuilder {
        self.workflow_builder.states.insert(
            self.name,
            StepConfig {
                method: self.method,
                parameters: self.parameters,
                next_state: self.next_state,
            },
        );
        self.workflow_builder
    }
}
