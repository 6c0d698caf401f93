use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::compiler::loader::parse_workflow;
use crate::dsl::{EngineSettings, ParamValue, StepConfig, WorkflowConfig};
use crate::error::ConfigError;

/// Owns the workflow document a run executes, and the file it came from.
///
/// Parameter write-backs modify the document and persist it under one lock,
/// so runs sharing a store never interleave a read-modify-write. Separate
/// processes pointing at the same file get no such guarantee.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    config: Mutex<WorkflowConfig>,
}

impl ConfigStore {
    /// A store whose write-backs are never persisted.
    pub fn in_memory(config: WorkflowConfig) -> Self {
        Self {
            path: None,
            config: Mutex::new(config),
        }
    }

    pub fn with_path(config: WorkflowConfig, path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            config: Mutex::new(config),
        }
    }

    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::with_path(parse_workflow(&text)?, path))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn step(&self, state: &str) -> Option<StepConfig> {
        self.config.lock().await.step(state).cloned()
    }

    pub async fn settings(&self) -> EngineSettings {
        self.config.lock().await.settings.clone()
    }

    pub async fn initial_state(&self) -> String {
        self.config.lock().await.initial_state.clone()
    }

    /// Replaces parameter `name` of `state` with `value` and persists the
    /// whole document before releasing the lock.
    pub async fn write_back(&self, state: &str, name: &str, value: Value) -> Result<(), ConfigError> {
        let mut config = self.config.lock().await;
        let slot = config
            .states
            .get_mut(state)
            .and_then(|step| step.parameters.get_mut(name))
            .ok_or_else(|| ConfigError::MissingWriteBack {
                state: state.to_string(),
                name: name.to_string(),
            })?;
        *slot = ParamValue::Literal(value);

        if let Some(path) = &self.path {
            let text = serde_yaml::to_string(&*config)?;
            tokio::fs::write(path, text)
                .await
                .map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
            debug!(state, parameter = name, path = %path.display(), "Configuration persisted");
        }
        Ok(())
    }
}
