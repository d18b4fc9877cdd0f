//! Minimal HTTP transport used by the Vault client, health probes and tunnel checks

use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::trace;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

/// An outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Extra headers
    pub headers: Vec<(String, String)>,
    /// JSON body
    pub body: Option<serde_json::Value>,
    /// Total request timeout
    pub timeout: Duration,
    /// Skip TLS certificate verification
    pub insecure: bool,
}

impl HttpRequest {
    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: Duration::from_secs(10),
            insecure: false,
        }
    }

    /// A GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// A POST request with a JSON body
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        let mut request = Self::new(Method::Post, url);
        request.body = Some(body);
        request
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accept any TLS certificate
    pub fn insecure(mut self) -> Self {
        self.insecure = true;
        self
    }

    /// Value of header `name`, compared case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Body as text
    pub body: String,
}

impl HttpResponse {
    /// Response with `status` and `body`
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| Error::Http(format!("invalid JSON response: {}", e)))
    }
}

/// Sends HTTP requests.
///
/// Transport failures (connection refused, timeout, TLS) are errors; any
/// status code, including 4xx and 5xx, is a successful [`HttpResponse`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request` and wait for the full response
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by blocking `reqwest` clients run on smol's blocking pool
#[derive(Debug, Clone)]
pub struct BlockingHttp {
    verified: reqwest::blocking::Client,
    insecure: reqwest::blocking::Client,
}

impl BlockingHttp {
    /// Build the verifying and the certificate-agnostic clients
    pub fn new() -> Result<Self> {
        let build = |accept_invalid: bool| {
            reqwest::blocking::Client::builder()
                .danger_accept_invalid_certs(accept_invalid)
                .build()
                .map_err(|e| Error::Http(format!("failed to build HTTP client: {}", e)))
        };
        Ok(Self {
            verified: build(false)?,
            insecure: build(true)?,
        })
    }
}

fn send_blocking(client: &reqwest::blocking::Client, request: HttpRequest) -> Result<HttpResponse> {
    let mut builder = match request.method {
        Method::Get => client.get(&request.url),
        Method::Post => client.post(&request.url),
    }
    .timeout(request.timeout);

    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let response = builder
        .send()
        .map_err(|e| Error::Http(format!("{}: {}", request.url, e)))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .map_err(|e| Error::Http(format!("{}: {}", request.url, e)))?;
    Ok(HttpResponse { status, body })
}

#[async_trait]
impl HttpTransport for BlockingHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        trace!("{:?} {}", request.method, request.url);
        let client = if request.insecure {
            self.insecure.clone()
        } else {
            self.verified.clone()
        };
        smol::unblock(move || send_blocking(&client, request)).await
    }
}
