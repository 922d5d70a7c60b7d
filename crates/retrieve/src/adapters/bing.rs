//! Bing HTML results adapter.

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{AdapterKind, RawCandidate, SearchAdapter};

const SEARCH_URL: &str = "https://www.bing.com/search";

const MIN_SNIPPET_CHARS: usize = 20;

pub struct BingAdapter {
    client: reqwest::Client,
}

impl BingAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchAdapter for BingAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Bing
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawCandidate>> {
        let count = limit.to_string();
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("setlang", "en-US"),
                ("cc", "US"),
            ])
            .header("Accept", "text/html")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("bing error: {}", resp.status());
        }

        let body = resp.text().await?;
        Ok(parse_results(&body, limit))
    }
}

// `Html` is !Send — parsing stays in a sync scope with no awaits.
fn parse_results(body: &str, limit: usize) -> Vec<RawCandidate> {
    let doc = Html::parse_document(body);
    let result_sel = Selector::parse("li.b_algo").expect("static selector");
    let link_sel = Selector::parse("h2 a").expect("static selector");
    let snippet_sel = Selector::parse("p").expect("static selector");

    let mut out = Vec::new();
    for item in doc.select(&result_sel).take(limit + 6) {
        if out.len() >= limit {
            break;
        }
        let Some(link) = item.select(&link_sel).next() else {
            continue;
        };
        let Some(snippet_el) = item.select(&snippet_sel).next() else {
            continue;
        };

        let title = link.text().collect::<String>().trim().to_string();
        let snippet = snippet_el.text().collect::<String>().trim().to_string();
        if title.is_empty() || snippet.len() < MIN_SNIPPET_CHARS {
            continue;
        }

        let url = link
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(String::from);
        out.push(RawCandidate {
            title,
            snippet,
            url,
            published_at: None,
        });
    }
    out
}
