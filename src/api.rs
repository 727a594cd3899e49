use crate::types::GenerateRequest;
use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Url;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// HTTP client for the generation backend. The base URL is an explicit
/// constructor parameter so the whole request path can be pointed at a test
/// listener.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
}

/// Raw success reply from `POST /generate`, before response processing.
#[derive(Debug)]
pub struct GenerateReply {
    pub disposition: Option<String>,
    pub body: Bytes,
}

impl Client {
    pub fn new(base_url: Option<&str>) -> Result<Self> {
        let url = base_url
            .map(Url::parse)
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL))
            .context("invalid backend base URL")?;
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url: url })
    }

    /// Probes the backend root, which reports service status as JSON.
    pub async fn health(&self) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(self.base_url.clone())
            .send()
            .await
            .context("backend health request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("backend responded with status {}", response.status());
        }
        response.json().await.context("failed to decode health payload")
    }

    /// Requests one generated track. Any non-2xx status is a uniform
    /// failure; the caller does not get to inspect the code further. On
    /// success the body is read in full here, so a mid-read fault surfaces
    /// as an error from this call rather than from response processing.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateReply> {
        let url = self.base_url.join("generate").context("failed to build generate URL")?;
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .context("generation request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("backend responded with status {}", response.status());
        }
        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await.context("failed to read audio payload")?;
        Ok(GenerateReply { disposition, body })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}
