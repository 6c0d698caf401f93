#![allow(dead_code)]

use async_trait::async_trait;
use scrapeflow::browser::{Browser, Locator, locate};
use scrapeflow::error::BrowserError;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// In-memory page driver: URLs map to fixed markup.
#[derive(Debug, Default)]
pub struct MockBrowser {
    pages: HashMap<String, String>,
    fallback: Option<String>,
    current: Mutex<Option<String>>,
    pub visited: Mutex<Vec<String>>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Markup served for any URL without an explicit page.
    pub fn fallback(mut self, html: &str) -> Self {
        self.fallback = Some(html.to_string());
        self
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    fn current_html(&self) -> Result<String, BrowserError> {
        self.current.lock().unwrap().clone().ok_or(BrowserError::NoPage)
    }
}

#[async_trait]
impl Browser for MockBrowser {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.visited.lock().unwrap().push(url.to_string());
        let html = self
            .pages
            .get(url)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| BrowserError::Status { url: url.to_string(), status: 404 })?;
        *self.current.lock().unwrap() = Some(html);
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> Result<Option<String>, BrowserError> {
        locate(&self.current_html()?, locator)
    }

    async fn wait_until_present(&self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError> {
        match self.find(locator).await? {
            Some(_) => Ok(()),
            None => Err(BrowserError::Timeout(timeout, locator.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub type Route = (u16, &'static str, String);

/// A one-connection-per-request HTTP/1.1 stub.
///
/// `respond` maps (method, path) to (status, content type, body).
pub struct StubServer {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&str, &str) -> Route + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        let respond = Arc::new(respond);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let recorded = recorded.clone();
                let respond = respond.clone();
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut socket).await else {
                        return;
                    };
                    let path = request.target.split('?').next().unwrap_or("").to_string();
                    let (status, content_type, body) = respond(&request.method, &path);
                    recorded.lock().unwrap().push(request);
                    let response = format!(
                        "HTTP/1.1 {status} STUB\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    Some(RecordedRequest { method, target, headers, body })
}

pub const LISTINGS: &str = r#"<html><body>
  <div class="listing" data-id="1"><a href="/one">One</a><span class="price">10</span></div>
  <div class="other"><a href="/skip">Skip</a></div>
  <div class="listing" data-id="2"><a href="/two">Two</a><span class="price">20</span></div>
  <div class="listing" data-id="3"><span class="price">30</span></div>
</body></html>"#;
