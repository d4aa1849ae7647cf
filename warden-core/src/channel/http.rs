//! HTTP control endpoint.
//!
//! For servers that expose an admin API instead of RCON. `open` checks
//! that the base URL answers at all; commands are plain requests whose
//! response body is the reply.
//!
//! ```text
//! players              GET  <base>/players
//! GET /players         GET  <base>/players
//! POST /say hello all  POST <base>/say   (body "hello all")
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Url};
use tracing::debug;

use crate::channel::{ControlChannel, Reply};
use crate::error::WardenError;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

// ── HttpTarget ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq)]
pub struct HttpTarget {
    /// Stored without a trailing `/`.
    pub base_url: String,
    /// Sent with every request, e.g. an API key.
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl HttpTarget {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: BTreeMap::new(),
            timeout,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_configured(&self) -> bool {
        Url::parse(&self.base_url).is_ok()
    }

    pub fn port(&self) -> Option<u16> {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|url| url.port_or_known_default())
    }

    /// `base_url` joined with `path`; an empty path is the base itself.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    fn header_map(&self) -> Result<HeaderMap, WardenError> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WardenError::Config(format!("bad header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| WardenError::Config(format!("bad value for header {name}: {e}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

impl fmt::Display for HttpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url)
    }
}

impl fmt::Debug for HttpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Header values often carry credentials.
        f.debug_struct("HttpTarget")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ── Command mapping ──────────────────────────────────────────────

/// Split a console-style command into method, path and body.
fn parse_command(command: &str) -> (Method, &str, Option<&str>) {
    let command = command.trim();
    let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));
    match verb {
        "POST" => match rest.split_once(' ') {
            Some((path, body)) => (Method::POST, path, Some(body)),
            None => (Method::POST, rest, None),
        },
        "GET" => (Method::GET, rest.trim(), None),
        _ => (Method::GET, command, None),
    }
}

// ── HttpChannel ──────────────────────────────────────────────────

pub struct HttpChannel {
    target: HttpTarget,
    client: Option<Client>,
}

impl HttpChannel {
    pub fn new(target: HttpTarget) -> Self {
        Self {
            target,
            client: None,
        }
    }

    pub fn target(&self) -> &HttpTarget {
        &self.target
    }

    pub async fn get(&self, path: &str) -> Result<String, WardenError> {
        let request = self.client()?.get(self.target.url(path));
        fetch(request).await
    }

    pub async fn post(&self, path: &str, body: impl Into<String>) -> Result<String, WardenError> {
        let request = self.client()?.post(self.target.url(path)).body(body.into());
        fetch(request).await
    }

    fn client(&self) -> Result<&Client, WardenError> {
        self.client
            .as_ref()
            .ok_or_else(|| WardenError::NotConnected(self.target.to_string()))
    }
}

async fn fetch(request: RequestBuilder) -> Result<String, WardenError> {
    let res = request.send().await?;
    let status = res.status();
    if status.is_success() {
        Ok(res.text().await?)
    } else {
        let body = res.text().await.unwrap_or_default();
        Err(WardenError::UnexpectedStatus { status, body })
    }
}

#[async_trait]
impl ControlChannel for HttpChannel {
    /// Any HTTP answer from the base URL, error statuses included, counts
    /// as reachable.
    async fn open(&mut self) -> Result<(), WardenError> {
        if self.client.is_some() {
            return Ok(());
        }
        let client = Client::builder()
            .timeout(self.target.timeout)
            .default_headers(self.target.header_map()?)
            .build()?;
        let res = client.get(&self.target.base_url).send().await?;
        debug!("{} is reachable ({})", self.target, res.status());
        self.client = Some(client);
        Ok(())
    }

    async fn send_command(&mut self, command: &str) -> Result<Reply, WardenError> {
        let (method, path, body) = parse_command(command);
        let url = self.target.url(path);
        let mut request = self.client()?.request(method, url);
        if let Some(body) = body {
            request = request.body(body.to_string());
        }
        fetch(request).await.map(Reply::Response)
    }

    fn close(&mut self) {
        self.client = None;
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    fn is_enabled(&self) -> bool {
        self.target.is_configured()
    }
}

impl fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpChannel")
            .field("target", &self.target)
            .field("open", &self.client.is_some())
            .finish()
    }
}
