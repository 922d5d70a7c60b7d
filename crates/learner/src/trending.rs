//! Trending topic discovery.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

/// A best-effort source of currently popular topic names.  Failures are
/// never fatal; the scheduler just skips the trending bucket for that roll.
#[async_trait]
pub trait TrendingProvider: Send + Sync {
    async fn trending(&self, limit: usize) -> Result<Vec<String>>;
}

const FEED_API: &str = "https://en.wikipedia.org/api/rest_v1/feed/featured";

/// Wikipedia's most-read feed as a trending signal.
pub struct WikipediaTrending {
    client: reqwest::Client,
}

impl WikipediaTrending {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TrendingProvider for WikipediaTrending {
    async fn trending(&self, limit: usize) -> Result<Vec<String>> {
        let today = Utc::now();
        let url = format!("{FEED_API}/{}", today.format("%Y/%m/%d"));
        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("trending feed error: {}", resp.status());
        }

        let json: serde_json::Value = resp.json().await?;
        let articles = json["mostread"]["articles"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut out = Vec::new();
        for article in articles {
            if out.len() >= limit {
                break;
            }
            let Some(title) = article["normalizedtitle"].as_str() else {
                continue;
            };
            // Skip navigation pages and namespaced entries.
            if title == "Main Page" || title.contains(':') {
                continue;
            }
            out.push(title.replace('_', " "));
        }

        debug!(count = out.len(), "trending topics fetched");
        Ok(out)
    }
}
