use async_trait::async_trait;
use serde_json::Value;
use anyhow::{Result, anyhow};
use tracing::{debug, warn};

use crate::actions::{ActionContext, ActionHandler, Capability, Params};
use crate::extract::field::{fields_from_value, project, projection_to_value};
use crate::extract::record::{extract, extraction_from_value, extraction_to_value, rules_from_value};

#[derive(Debug)]
pub struct ExtractDataAction;

#[async_trait]
impl ActionHandler for ExtractDataAction {
    fn capability(&self) -> Capability {
        Capability::ExtractData
    }

    fn validate(&self, params: &Params) -> Result<()> {
        params.require("raw_data")?;
        params.require("selectors")?;
        Ok(())
    }

    async fn execute(&self, params: Params, ctx: &ActionContext<'_>) -> Result<Value> {
        let html = match params.require("raw_data")? {
            Value::String(html) => html,
            Value::Null => {
                debug!(state = ctx.state, "No markup to extract from");
                return Ok(Value::Null);
            }
            other => {
                warn!(state = ctx.state, kind = json_kind(other), "raw_data is not markup");
                return Ok(Value::Null);
            }
        };

        if let Some(path) = &ctx.settings.raw_dump {
            if let Err(e) = tokio::fs::write(path, html.as_bytes()).await {
                warn!(state = ctx.state, path = %path, error = %e, "Failed to dump raw markup");
            }
        }

        let rules = match rules_from_value(params.require("selectors")?) {
            Ok(rules) => rules,
            Err(e) => {
                warn!(state = ctx.state, error = %e, "Extraction failed");
                return Ok(Value::Null);
            }
        };

        match extract(html, &rules) {
            Ok(extraction) => Ok(extraction_to_value(&extraction)),
            Err(e) => {
                warn!(state = ctx.state, error = %e, "Extraction failed");
                Ok(Value::Null)
            }
        }
    }
}

/// Applies named field rules to records produced by `extract_data`.
#[derive(Debug)]
pub struct ProjectFieldsAction;

const RECORD_KEYS: [&str; 2] = ["records", "extracted"];

#[async_trait]
impl ActionHandler for ProjectFieldsAction {
    fn capability(&self) -> Capability {
        Capability::ProjectFields
    }

    fn validate(&self, params: &Params) -> Result<()> {
        if params.get_any(&RECORD_KEYS).is_none() {
            return Err(anyhow!("Missing required parameter: records"));
        }
        params.require("fields")?;
        Ok(())
    }

    async fn execute(&self, params: Params, ctx: &ActionContext<'_>) -> Result<Value> {
        let records = params
            .get_any(&RECORD_KEYS)
            .ok_or_else(|| anyhow!("Missing required parameter: records"))?;
        if records.is_null() {
            debug!(state = ctx.state, "No records to project");
            return Ok(Value::Null);
        }

        let extraction = match extraction_from_value(records) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(state = ctx.state, error = %e, "Projection failed");
                return Ok(Value::Null);
            }
        };
        let fields = match fields_from_value(params.require("fields")?) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(state = ctx.state, error = %e, "Invalid field rules");
                return Ok(Value::Null);
            }
        };

        Ok(projection_to_value(&project(&extraction, &fields)))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
