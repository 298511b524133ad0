use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::json;

use crate::{
    error::{Error, Result},
    net::{Request, Transport},
};

/// Somewhere a finished report can be published for sharing.
#[async_trait]
pub trait ReportLink: Send + Sync {
    /// Publish the report text, returning a URL people can open.
    async fn publish(&self, text: &str) -> Result<String>;
}

/// Public plaintext snippets on glot.io.
pub struct GlotSnippets {
    transport: Arc<dyn Transport>,
    api_url: String,
    timeout: Duration,
}

impl GlotSnippets {
    pub fn new(
        transport: Arc<dyn Transport>,
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            api_url: api_url.into(),
            timeout,
        }
    }

    /// `https://glot.io/api/snippets` -> `https://glot.io/snippets/{id}`
    fn snippet_url(&self, id: &str) -> String {
        let base = self.api_url.trim_end_matches('/').replacen("/api/", "/", 1);
        format!("{base}/{id}")
    }
}

#[async_trait]
impl ReportLink for GlotSnippets {
    async fn publish(&self, text: &str) -> Result<String> {
        let payload = json!({
            "language": "plaintext",
            "title": "Report",
            "public": true,
            "files": [{"name": "report.txt", "content": text}],
        });
        let resp = self
            .transport
            .request(&Request::post_json(&self.api_url, payload, self.timeout))
            .await?;
        if !resp.is_success() {
            return Err(Error::HttpStatus {
                url: self.api_url.clone(),
                status: resp.status,
            });
        }

        let data = resp.json(&self.api_url)?;
        let id = data
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| Error::schema(&self.api_url, "snippet without an id"))?;
        Ok(self.snippet_url(id))
    }
}
