use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl Request {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            timeout,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            timeout,
        }
    }
}

/// How a finished HTTP exchange should be treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// 5xx, worth another attempt
    Retryable,
    Fatal,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn class(&self) -> StatusClass {
        match self.status {
            200..=299 => StatusClass::Success,
            500..=599 => StatusClass::Retryable,
            _ => StatusClass::Fatal,
        }
    }

    pub fn is_success(&self) -> bool {
        self.class() == StatusClass::Success
    }

    /// Parse the body as JSON. A body that isn't JSON is a schema problem, not a
    /// network one, so it's never retried.
    pub fn json(&self, url: &str) -> Result<serde_json::Value> {
        serde_json::from_str(&self.body).map_err(|e| Error::schema(url, e.to_string()))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, req: &Request) -> Result<Response>;
}

/// The real thing, backed by a shared reqwest client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ixpscan/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, req: &Request) -> Result<Response> {
        let builder = match req.method {
            Method::Get => self.client.get(&req.url),
            Method::Post => self.client.post(&req.url),
        };
        let builder = match &req.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let network_err = |e: reqwest::Error| {
            let (url, reason) = (req.url.clone(), e.to_string());
            if e.is_builder() {
                Error::InvalidRequest { url, reason }
            } else {
                Error::TransientNetwork { url, reason }
            }
        };

        let response = builder
            .timeout(req.timeout)
            .send()
            .await
            .map_err(network_err)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(network_err)?;

        Ok(Response { status, body })
    }
}
