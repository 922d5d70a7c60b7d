//! Wikipedia adapter — REST page summaries with an action-API search
//! fallback when the direct summary misses.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{AdapterKind, RawCandidate, SearchAdapter};

const SUMMARY_API: &str = "https://en.wikipedia.org/api/rest_v1/page/summary";
const SEARCH_API: &str = "https://en.wikipedia.org/w/api.php";

/// Summaries shorter than this are treated as a miss and routed through the
/// search fallback instead.
const MIN_EXTRACT_CHARS: usize = 100;

pub struct WikipediaAdapter {
    client: reqwest::Client,
}

impl WikipediaAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch the page summary for one exact title.  `Ok(None)` on 404 or a
    /// too-short extract.
    async fn summary(&self, title: &str) -> Result<Option<RawCandidate>> {
        let encoded = utf8_percent_encode(title, NON_ALPHANUMERIC).to_string();
        let resp = self
            .client
            .get(format!("{SUMMARY_API}/{encoded}"))
            .header("Accept", "application/json")
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            anyhow::bail!("wikipedia summary error: {}", resp.status());
        }

        let json: serde_json::Value = resp.json().await?;
        let extract = json["extract"].as_str().unwrap_or("").trim();
        if extract.len() < MIN_EXTRACT_CHARS {
            return Ok(None);
        }

        let page_title = json["title"].as_str().unwrap_or(title).trim();
        let url = json["content_urls"]["desktop"]["page"]
            .as_str()
            .map(String::from);
        let published_at = json["timestamp"]
            .as_str()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Some(RawCandidate {
            title: page_title.to_string(),
            snippet: extract.to_string(),
            url,
            published_at,
        }))
    }

    /// Action-API title search used when the direct summary misses.
    async fn search_titles(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(SEARCH_API)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", &limit.to_string()),
                ("format", "json"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("wikipedia search error: {}", resp.status());
        }

        let json: serde_json::Value = resp.json().await?;
        let hits = json["query"]["search"].as_array().cloned().unwrap_or_default();
        Ok(hits
            .iter()
            .filter_map(|hit| hit["title"].as_str())
            .map(String::from)
            .collect())
    }
}

#[async_trait]
impl SearchAdapter for WikipediaAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Encyclopedia
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawCandidate>> {
        if let Some(direct) = self.summary(query).await? {
            return Ok(vec![direct]);
        }

        let mut out = Vec::new();
        for title in self.search_titles(query, limit.max(1) + 1).await? {
            if out.len() >= limit {
                break;
            }
            if let Some(candidate) = self.summary(&title).await? {
                out.push(candidate);
            }
        }
        Ok(out)
    }
}
