use async_trait::async_trait;
use serde_json::Value;
use anyhow::{Result, anyhow};
use std::collections::VecDeque;
use tracing::debug;

use crate::actions::{ActionContext, ActionHandler, Capability, Params};
use crate::extract::navigate::{PathSegment, resolve};

/// Drills into a value produced earlier in the run, or into a source
/// registered on the engine.
///
/// Resolution failures are returned as errors carrying the
/// [`NavigationError`](crate::error::NavigationError), which ends the run.
#[derive(Debug)]
pub struct FetchSourceAction;

#[async_trait]
impl ActionHandler for FetchSourceAction {
    fn capability(&self) -> Capability {
        Capability::FetchSource
    }

    fn validate(&self, params: &Params) -> Result<()> {
        params.require_str("source")?;
        if let Some(path) = params.get("path") {
            parse_path(path)?;
        }
        Ok(())
    }

    async fn execute(&self, params: Params, ctx: &ActionContext<'_>) -> Result<Value> {
        let name = params.require_str("source")?;
        let path = match params.get("path") {
            Some(path) => parse_path(path)?,
            None => VecDeque::new(),
        };

        let root = match ctx.history.get(name) {
            Some(value) => value.clone(),
            None => ctx
                .sources
                .get(name)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| anyhow!("Unknown data source '{}'", name))?,
        };

        debug!(state = ctx.state, source = name, segments = path.len(), "Resolving nested path");
        Ok(resolve(&root, path)?)
    }
}

fn parse_path(value: &Value) -> Result<VecDeque<PathSegment>> {
    match value {
        Value::Null => Ok(VecDeque::new()),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                PathSegment::from_value(item)
                    .ok_or_else(|| anyhow!("Path segment {} is not a (kind, key) pair: {}", i, item))
            })
            .collect(),
        other => Err(anyhow!("Parameter 'path' must be a list, got {}", other)),
    }
}
