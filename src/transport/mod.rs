//! Request transport
//!
//! The engine hands a [`RenderedRequest`] to a [`Transport`] and gets back a
//! [`RawResponse`]. [`ReqwestTransport`] is the HTTP implementation.

use std::future::Future;
use std::time::{Duration, Instant};
use reqwest::{Client, Method};
use serde::Serialize;
use url::Url;

use crate::errors::{PulserunError, Result};
use crate::template::RenderedRequest;

/// What came back for one request
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub latency_ms: u64,
    pub size_bytes: u64,
}

impl RawResponse {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
            latency_ms: 0,
            size_bytes: body.len() as u64,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends rendered requests
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: &RenderedRequest) -> impl Future<Output = Result<RawResponse>> + Send;
}

/// Client settings for [`ReqwestTransport`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Option<Duration>,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub insecure: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            follow_redirects: true,
            max_redirects: 10,
            insecure: false,
        }
    }
}

/// HTTP transport over a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(concat!("pulserun/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Duration::from_secs(30));

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        if config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &RenderedRequest) -> Result<RawResponse> {
        let url: Url = request.url.parse()
            .map_err(|e| PulserunError::Argument(format!("Invalid URL '{}': {}", request.url, e)))?;
        let method: Method = request.method.parse()
            .map_err(|e| PulserunError::Argument(format!("Invalid method '{}': {}", request.method, e)))?;

        let start = Instant::now();
        let mut builder = self.client.request(method, url);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).to_string()))
            .collect();
        let bytes = response.bytes().await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        Ok(RawResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).to_string(),
            latency_ms,
            size_bytes: bytes.len() as u64,
        })
    }
}
