//! SerpAPI adapter — structured Google results behind a paid key.
//! Replaces the HTML Google adapter when configured.

use anyhow::Result;
use async_trait::async_trait;

use super::{AdapterKind, RawCandidate, SearchAdapter};

const SEARCH_URL: &str = "https://serpapi.com/search.json";

pub struct SerpApiAdapter {
    client: reqwest::Client,
    api_key: String,
}

impl SerpApiAdapter {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchAdapter for SerpApiAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::SerpApi
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawCandidate>> {
        let num = limit.to_string();
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("num", num.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("serpapi error: {}", resp.status());
        }

        let json: serde_json::Value = resp.json().await?;
        let mut out = Vec::new();
        if let Some(results) = json["organic_results"].as_array() {
            for item in results.iter().take(limit) {
                let title = item["title"].as_str().unwrap_or("").trim();
                let snippet = item["snippet"].as_str().unwrap_or("").trim();
                if title.is_empty() || snippet.is_empty() {
                    continue;
                }
                let url = item["link"].as_str().map(str::trim).map(String::from);
                out.push(RawCandidate {
                    title: title.to_string(),
                    snippet: snippet.to_string(),
                    url,
                    published_at: None,
                });
            }
        }
        Ok(out)
    }
}
