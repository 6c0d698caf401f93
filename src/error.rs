use thiserror::Error;

use crate::extract::navigate::PathKind;

/// Structural failures that terminate a workflow run.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("State '{0}' is not defined in the workflow graph")]
    UnknownState(String),

    #[error("State '{state}' names an unknown action '{action}'")]
    UnknownAction { state: String, action: String },

    #[error("Action '{action}' used by state '{state}' has no registered handler")]
    ActionNotRegistered { state: String, action: String },

    #[error("Run exceeded the configured limit of {limit} steps (last state: '{state}')")]
    StepLimitExceeded { limit: usize, state: String },

    #[error("Action in state '{state}' failed: {source}")]
    Action {
        state: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while loading, validating or persisting a workflow document.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write workflow file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid workflow document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Workflow validation failed: {0}")]
    Validation(String),

    #[error("State '{state}' has no parameter '{name}' to write back")]
    MissingWriteBack { state: String, name: String },
}

/// Failures of the structured-extraction subsystem.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("Invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid XPath expression '{expression}': {reason}")]
    InvalidXPath { expression: String, reason: String },

    #[error("Invalid selector rule: {0}")]
    InvalidRule(String),
}

/// Raised by the nested navigation resolver at the exact failing segment.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot resolve {kind} '{key}' at path segment {position}")]
pub struct NavigationError {
    pub kind: PathKind,
    pub key: String,
    pub position: usize,
}

/// Failures reported by a browser driver.
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(std::time::Duration, String),

    #[error("No page has been loaded yet")]
    NoPage,

    #[error("Request to '{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Unknown locator strategy '{0}'")]
    UnknownLocator(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
