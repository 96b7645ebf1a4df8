//! API client for the price scanner

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the scanner's HTTP surface
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Invalid API URL: {}", base_url);
        }

        Ok(Self { client, base_url })
    }

    /// Build a URL from path segments, percent-encoding each one
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;
        Self::execute(self.client.get(url)).await
    }

    pub async fn post<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;
        Self::execute(self.client.post(url)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let url = self.url(segments)?;
        Self::execute(self.client.put(url).json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;
        Self::execute(self.client.delete(url)).await
    }

    async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;
        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;

        if status.is_success() {
            return serde_json::from_str(&body).context("Failed to parse response");
        }

        // An override that was applied but not saved comes back as a 500
        // with the full response body
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            if let Ok(parsed) = serde_json::from_str(&body) {
                return Ok(parsed);
            }
        }

        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        anyhow::bail!("API error ({}): {}", status, message)
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    pub display_name: String,
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    pub state: String,
    pub paused: bool,
    pub tick_count: u64,
    pub generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanControlResponse {
    pub changed: bool,
    pub status: ScanStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub generation: u64,
    pub result: ScanResult,
    pub published_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScanResult {
    Empty,
    Detected {
        label: String,
        confidence: f32,
        record: PriceRecord,
        source: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<PriceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelList {
    pub classifier_ready: bool,
    pub labels: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideResponse {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<PriceRecord>,
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
