use std::fs;
use std::path::Path;

use tracing::info;

use crate::dsl::{ParamValue, WorkflowConfig};
use crate::error::ConfigError;

pub fn load_workflow_from_yaml(file_path: impl AsRef<Path>) -> Result<WorkflowConfig, ConfigError> {
    let path = file_path.as_ref();
    let yaml_content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_workflow(&yaml_content)
}

pub fn parse_workflow(yaml_content: &str) -> Result<WorkflowConfig, ConfigError> {
    Ok(serde_yaml::from_str(yaml_content)?)
}

pub fn save_workflow_to_yaml(config: &WorkflowConfig, file_path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = file_path.as_ref();
    let text = serde_yaml::to_string(config)?;
    fs::write(path, text).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Human-readable table of states, methods, transitions and parameters.
pub fn describe(config: &WorkflowConfig) -> String {
    let mut out = String::new();
    out.push_str(&format!("Initial state: {}\n", config.initial_state));
    if let Some(ua) = &config.user_agent {
        out.push_str(&format!("User agent: {ua}\n"));
    }
    for (state, step) in &config.states {
        out.push_str(&format!(">State: {state}\n"));
        out.push_str(&format!("    Method: {}\n", step.method));
        let next = match &step.next_state {
            Some(next) => serde_json::to_string(next).unwrap_or_default(),
            None => "null".to_string(),
        };
        out.push_str(&format!("    Next state: {next}\n"));
        if !step.parameters.is_empty() {
            out.push_str("    Parameters:\n");
            for (key, value) in &step.parameters {
                let shown = match value {
                    ParamValue::PreviousResult => "<previous result>".to_string(),
                    ParamValue::Literal(v) => v.to_string(),
                };
                out.push_str(&format!("        {key}: {shown}\n"));
            }
        }
    }
    out
}

pub fn log_description(config: &WorkflowConfig) {
    for line in describe(config).lines() {
        info!("{}", line);
    }
}
