//! Brave Search API adapter (requires a subscription token).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AdapterKind, RawCandidate, SearchAdapter};

const SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

pub struct BraveAdapter {
    client: reqwest::Client,
    api_key: String,
}

impl BraveAdapter {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchAdapter for BraveAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Brave
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawCandidate>> {
        let count = limit.to_string();
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query), ("count", count.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("brave search error: {}", resp.status());
        }

        let json: serde_json::Value = resp.json().await?;
        let mut out = Vec::new();
        if let Some(results) = json["web"]["results"].as_array() {
            for item in results.iter().take(limit) {
                let title = item["title"].as_str().unwrap_or("").trim();
                let description = item["description"].as_str().unwrap_or("").trim();
                if title.is_empty() || description.is_empty() {
                    continue;
                }
                let url = item["url"].as_str().map(str::trim).map(String::from);
                let published_at = item["page_age"]
                    .as_str()
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                out.push(RawCandidate {
                    title: title.to_string(),
                    snippet: description.to_string(),
                    url,
                    published_at,
                });
            }
        }
        Ok(out)
    }
}
