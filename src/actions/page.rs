use async_trait::async_trait;
use serde_json::{Value, json};
use anyhow::{Result, anyhow};
use std::time::Duration;
use tracing::{info, warn};

use crate::actions::{ActionContext, ActionHandler, Capability, Params};
use crate::browser::{By, Locator};

/// Placeholder in `base_url` replaced by the page index.
pub const PAGE_PLACEHOLDER: &str = "{i}";

#[derive(Debug)]
pub struct ScrapPageAction;

#[async_trait]
impl ActionHandler for ScrapPageAction {
    fn capability(&self) -> Capability {
        Capability::ScrapePage
    }

    fn validate(&self, params: &Params) -> Result<()> {
        params.require("by")?;
        params.require("value")?;
        Ok(())
    }

    async fn execute(&self, params: Params, ctx: &ActionContext<'_>) -> Result<Value> {
        let by = params.require_str("by")?;
        let value = params.require_str("value")?;

        let by = match by.parse::<By>() {
            Ok(by) => by,
            Err(e) => {
                warn!(state = ctx.state, error = %e, "Cannot scrape page");
                return Ok(Value::Null);
            }
        };
        let locator = Locator::new(by, value);

        let limit = Duration::from_secs(ctx.settings.page_timeout_secs);
        if let Err(e) = ctx.browser.wait_until_present(&Locator::body(), limit).await {
            warn!(state = ctx.state, error = %e, "Page body never became present");
            return Ok(Value::Null);
        }

        match ctx.browser.find(&locator).await {
            Ok(Some(html)) => Ok(Value::String(html)),
            Ok(None) => {
                warn!(state = ctx.state, %locator, "No such element");
                Ok(Value::Null)
            }
            Err(e) => {
                warn!(state = ctx.state, %locator, error = %e, "Scraping failed");
                Ok(Value::Null)
            }
        }
    }
}

#[derive(Debug)]
pub struct GotoLinkAction;

#[async_trait]
impl ActionHandler for GotoLinkAction {
    fn capability(&self) -> Capability {
        Capability::GotoLink
    }

    fn validate(&self, params: &Params) -> Result<()> {
        params.require("link")?;
        Ok(())
    }

    async fn execute(&self, params: Params, ctx: &ActionContext<'_>) -> Result<Value> {
        let Some(link) = params.require("link")?.as_str() else {
            warn!(state = ctx.state, "Link is not a string, skipping navigation");
            return Ok(Value::Null);
        };
        if let Err(e) = ctx.browser.navigate(link).await {
            warn!(state = ctx.state, link, error = %e, "Navigation failed");
            return Ok(Value::Null);
        }
        settle(ctx).await;
        Ok(json!({ "url": link }))
    }
}

/// Navigates to `base_url` with `{i}` replaced by `next_page`.
///
/// `next_page + 1` is written back to the executing state and persisted
/// before the request goes out; the URL uses the index read at call time.
#[derive(Debug)]
pub struct GotoNextPageAction;

#[async_trait]
impl ActionHandler for GotoNextPageAction {
    fn capability(&self) -> Capability {
        Capability::GotoNextPage
    }

    fn validate(&self, params: &Params) -> Result<()> {
        let base_url = params.require_str("base_url")?;
        if !base_url.contains(PAGE_PLACEHOLDER) {
            return Err(anyhow!("base_url '{}' has no {} placeholder", base_url, PAGE_PLACEHOLDER));
        }
        params.require("next_page")?;
        Ok(())
    }

    async fn execute(&self, params: Params, ctx: &ActionContext<'_>) -> Result<Value> {
        let base_url = params.require_str("base_url")?;
        let page = params
            .require("next_page")?
            .as_i64()
            .ok_or_else(|| anyhow!("Parameter 'next_page' must be an integer"))?;

        let url = base_url.replace(PAGE_PLACEHOLDER, &page.to_string());
        ctx.store.write_back(ctx.state, "next_page", json!(page + 1)).await?;
        info!(state = ctx.state, page, url = %url, "Advancing to page");

        if let Err(e) = ctx.browser.navigate(&url).await {
            warn!(state = ctx.state, url = %url, error = %e, "Navigation failed");
            return Ok(Value::Null);
        }
        settle(ctx).await;
        Ok(json!({ "url": url, "page": page }))
    }
}

async fn settle(ctx: &ActionContext<'_>) {
    if ctx.settings.settle_ms > 0 {
        tokio::time::sleep(Duration::from_millis(ctx.settings.settle_ms)).await;
    }
}
