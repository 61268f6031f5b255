// Serper (Google Search) fetcher. Organic results only.

use std::sync::Arc;
use std::time::Duration;

use creatorsignal_common::{HarvestError, RateLimiter, Result};
use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const ORIGIN: &str = "serper";

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchHit>,
}

/// One organic search result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

pub struct SerperFetcher {
    api_key: String,
    url: String,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
}

impl SerperFetcher {
    pub fn new(api_key: &str, url: &str, limiter: Arc<RateLimiter>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarvestError::Config(format!("failed to build search HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.to_string(),
            url: url.to_string(),
            client,
            limiter,
        })
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        info!(query, max_results, "Serper search");

        let body = serde_json::json!({
            "q": query,
            "num": max_results,
        });

        self.limiter.acquire(1).await;
        let resp = self
            .client
            .post(&self.url)
            .header("X-API-KEY", &self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            warn!(query, ?retry_after, "Serper rate limited");
            return Err(HarvestError::RateLimited {
                origin: ORIGIN.to_string(),
                retry_after,
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HarvestError::external(ORIGIN, Some(status.as_u16()), body));
        }

        let data: SerperResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                return request_error(e);
            }
            HarvestError::external(ORIGIN, Some(status.as_u16()), format!("malformed response: {e}"))
        })?;

        let hits: Vec<SearchHit> = data
            .organic
            .into_iter()
            .filter(|hit| !hit.link.is_empty())
            .take(max_results)
            .collect();

        info!(query, count = hits.len(), "Serper search complete");
        Ok(hits)
    }
}

fn request_error(e: reqwest::Error) -> HarvestError {
    if e.is_timeout() {
        HarvestError::Timeout {
            origin: ORIGIN.to_string(),
            message: e.to_string(),
        }
    } else {
        HarvestError::external(ORIGIN, None, format!("request failed: {e}"))
    }
}
