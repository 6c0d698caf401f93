use async_trait::async_trait;
use serde_json::Value;
use anyhow::{Result, anyhow};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{info, warn};

use crate::actions::{ActionContext, ActionHandler, Capability, Params};

const URL_KEYS: [&str; 2] = ["api_url", "url"];

/// `GET` against an external API, returning the parsed JSON body.
#[derive(Debug)]
pub struct CallApiAction {
    client: Client,
}

impl CallApiAction {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionHandler for CallApiAction {
    fn capability(&self) -> Capability {
        Capability::CallApi
    }

    fn validate(&self, params: &Params) -> Result<()> {
        if params.get_any(&URL_KEYS).is_none() {
            return Err(anyhow!("Missing required parameter: api_url"));
        }
        Ok(())
    }

    async fn execute(&self, params: Params, ctx: &ActionContext<'_>) -> Result<Value> {
        let url = params
            .get_any(&URL_KEYS)
            .ok_or_else(|| anyhow!("Missing required parameter: api_url"))?;
        let Some(url) = url.as_str() else {
            warn!(state = ctx.state, "API url is not a string");
            return Ok(Value::Null);
        };

        let timeout = params.u64("timeout").unwrap_or(ctx.settings.api_timeout_secs);
        let mut builder = self.client.get(url).timeout(Duration::from_secs(timeout));

        if let Some(query) = params.get("params").and_then(|v| v.as_object()) {
            let pairs: Vec<(&str, String)> = query
                .iter()
                .map(|(k, v)| (k.as_str(), scalar_to_string(v)))
                .collect();
            builder = builder.query(&pairs);
        }

        if let Some(headers) = params.get("headers").and_then(|v| v.as_object()) {
            for (k, v) in headers {
                if let Some(v_str) = v.as_str() {
                    builder = builder.header(k, v_str);
                }
            }
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(state = ctx.state, url, error = %e, "API request failed");
                return Ok(Value::Null);
            }
        };
        let status = response.status();
        if !status.is_success() {
            warn!(state = ctx.state, url, status = status.as_u16(), "API returned an error status");
            return Ok(Value::Null);
        }

        match response.json::<Value>().await {
            Ok(json) => Ok(json),
            Err(e) => {
                warn!(state = ctx.state, url, error = %e, "API response is not JSON");
                Ok(Value::Null)
            }
        }
    }
}

/// `POST`s `data` as JSON to `address` and reports the status code.
#[derive(Debug)]
pub struct SendDataAction {
    client: Client,
}

impl SendDataAction {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionHandler for SendDataAction {
    fn capability(&self) -> Capability {
        Capability::SendData
    }

    fn validate(&self, params: &Params) -> Result<()> {
        params.require("data")?;
        params.require("address")?;
        Ok(())
    }

    async fn execute(&self, params: Params, ctx: &ActionContext<'_>) -> Result<Value> {
        let data = params.require("data")?;
        let Some(address) = params.require("address")?.as_str() else {
            warn!(state = ctx.state, "Submission address is not a string");
            return Ok(Value::Null);
        };

        let body = serde_json::to_string(data)?;
        let response = self
            .client
            .post(address)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(state = ctx.state, address, error = %e, "Submission failed");
                return Ok(Value::Null);
            }
        };
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        info!(state = ctx.state, address, status, body = %text, "Data submitted");

        Ok(Value::from(status))
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
