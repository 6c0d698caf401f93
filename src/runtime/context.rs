use std::collections::BTreeMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Per-run state, threaded through each step by value.
///
/// Nothing here is shared between runs; it is dropped when the run ends.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    /// State about to execute; `None` once the run reached a terminal state.
    pub current_state: Option<String>,
    pub previous_result: Value,
    pub history: BTreeMap<String, Value>,
    pub steps: usize,
    /// Set when the null policy stopped the run after this state.
    pub halted_at: Option<String>,
}

impl ExecutionContext {
    pub fn new(initial_state: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            current_state: Some(initial_state.into()),
            previous_result: Value::Null,
            history: BTreeMap::new(),
            steps: 0,
            halted_at: None,
        }
    }

    /// Stores `result` as both the previous result and the state's history entry.
    pub fn record(&mut self, state: &str, result: Value) {
        self.history.insert(state.to_string(), result.clone());
        self.previous_result = result;
        self.steps += 1;
    }

    pub fn is_finished(&self) -> bool {
        self.current_state.is_none()
    }
}
