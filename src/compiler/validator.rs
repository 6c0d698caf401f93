//! Static checks over a loaded workflow.
//!
//! The engine does not require a validated graph: unknown states and actions
//! are still reported when a run reaches them. Validation surfaces them early.

use std::collections::HashSet;

use evalexpr::{DefaultNumericTypes, build_operator_tree};

use crate::actions::Capability;
use crate::dsl::{NextState, WorkflowConfig};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    MissingInitialState(String),
    UnknownAction { state: String, action: String },
    UnknownTarget { state: String, target: String },
    InvalidCondition { state: String, reason: String },
    Unreachable(String),
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Issue::MissingInitialState(s) => write!(f, "initial state '{s}' is not defined"),
            Issue::UnknownAction { state, action } => {
                write!(f, "state '{state}' uses unknown action '{action}'")
            }
            Issue::UnknownTarget { state, target } => {
                write!(f, "state '{state}' transitions to undefined state '{target}'")
            }
            Issue::InvalidCondition { state, reason } => {
                write!(f, "state '{state}' has an invalid condition: {reason}")
            }
            Issue::Unreachable(s) => write!(f, "state '{s}' is unreachable from the initial state"),
        }
    }
}

pub fn check(config: &WorkflowConfig) -> Vec<Issue> {
    let mut issues = Vec::new();

    if !config.states.contains_key(&config.initial_state) {
        issues.push(Issue::MissingInitialState(config.initial_state.clone()));
    }

    for (state, step) in &config.states {
        if Capability::from_name(&step.method).is_none() {
            issues.push(Issue::UnknownAction {
                state: state.clone(),
                action: step.method.clone(),
            });
        }
        let Some(next) = &step.next_state else {
            continue;
        };
        for target in next.targets() {
            if !config.states.contains_key(target) {
                issues.push(Issue::UnknownTarget {
                    state: state.clone(),
                    target: target.to_string(),
                });
            }
        }
        if let NextState::When(branch) = next {
            if let Err(e) = build_operator_tree::<DefaultNumericTypes>(&branch.when) {
                issues.push(Issue::InvalidCondition {
                    state: state.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let reachable = reachable_states(config);
    for state in config.states.keys() {
        if !reachable.contains(state.as_str()) {
            issues.push(Issue::Unreachable(state.clone()));
        }
    }
    issues
}

/// Fails on the first issue that would stop a run; unreachable states are tolerated.
pub fn validate(config: &WorkflowConfig) -> Result<(), ConfigError> {
    match check(config).into_iter().find(|i| !matches!(i, Issue::Unreachable(_))) {
        Some(issue) => Err(ConfigError::Validation(issue.to_string())),
        None => Ok(()),
    }
}

fn reachable_states(config: &WorkflowConfig) -> HashSet<&str> {
    let mut seen = HashSet::new();
    let mut stack = vec![config.initial_state.as_str()];
    while let Some(state) = stack.pop() {
        let Some(step) = config.states.get(state) else {
            continue;
        };
        if !seen.insert(state) {
            continue;
        }
        if let Some(next) = &step.next_state {
            stack.extend(next.targets());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::builder::WorkflowBuilder;

    #[test]
    fn clean_graph_has_no_issues() {
        let config = WorkflowBuilder::new("a")
            .state("a", "goto_link").param("link", "http://x").next("b").build()
            .state("b", "scrap_page").param("by", "TAG_NAME").param("value", "body").build()
            .build();
        assert!(check(&config).is_empty());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn reports_structural_problems() {
        let config = WorkflowBuilder::new("start")
            .state("a", "teleport")
                .next_state(NextState::when("len >", Some("ghost"), None))
                .build()
            .build();
        let issues = check(&config);
        assert!(issues.contains(&Issue::MissingInitialState("start".into())));
        assert!(issues.contains(&Issue::UnknownAction { state: "a".into(), action: "teleport".into() }));
        assert!(issues.contains(&Issue::UnknownTarget { state: "a".into(), target: "ghost".into() }));
        assert!(issues.iter().any(|i| matches!(i, Issue::InvalidCondition { .. })));
        assert!(issues.contains(&Issue::Unreachable("a".into())));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn cycles_are_allowed() {
        let config = WorkflowBuilder::new("page")
            .state("page", "goto_next_page")
                .param("base_url", "http://x/?p={i}")
                .param("next_page", 1)
                .next("scrape")
                .build()
            .state("scrape", "scrap_page")
                .next_state(NextState::on_null(None, Some("page")))
                .build()
            .build();
        assert!(check(&config).is_empty());
    }
}
