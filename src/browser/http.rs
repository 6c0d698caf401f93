//! A page driver that loads documents over plain HTTP.
//!
//! No script execution: the current page is whatever the server returned.
//! Waiting for an element re-fetches the current URL until it shows up or
//! the deadline passes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::browser::{Browser, Locator, locate};
use crate::error::BrowserError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct Page {
    url: String,
    html: String,
}

#[derive(Debug)]
pub struct HttpBrowser {
    client: Client,
    page: RwLock<Option<Page>>,
    poll_interval: Duration,
}

impl HttpBrowser {
    pub fn new(user_agent: Option<&str>) -> Result<Self, BrowserError> {
        let mut builder = Client::builder();
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua);
        }
        Ok(Self {
            client: builder.build()?,
            page: RwLock::new(None),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn current_url(&self) -> Option<String> {
        self.page.read().await.as_ref().map(|p| p.url.clone())
    }

    async fn fetch(&self, url: &str) -> Result<String, BrowserError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BrowserError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let html = self.fetch(url).await?;
        debug!(url, bytes = html.len(), "Page loaded");
        *self.page.write().await = Some(Page {
            url: url.to_string(),
            html,
        });
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> Result<Option<String>, BrowserError> {
        let page = self.page.read().await;
        let page = page.as_ref().ok_or(BrowserError::NoPage)?;
        locate(&page.html, locator)
    }

    async fn wait_until_present(&self, locator: &Locator, limit: Duration) -> Result<(), BrowserError> {
        let poll = async {
            loop {
                if self.find(locator).await?.is_some() {
                    return Ok::<(), BrowserError>(());
                }
                sleep(self.poll_interval).await;
                if let Some(url) = self.current_url().await {
                    self.navigate(&url).await?;
                }
            }
        };
        match timeout(limit, poll).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout(limit, locator.to_string())),
        }
    }
}
