//! Best-effort Google HTML adapter.
//!
//! May be blocked in some environments; the SerpAPI adapter replaces this
//! one whenever a key is configured.

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{AdapterKind, RawCandidate, SearchAdapter};

const SEARCH_URL: &str = "https://www.google.com/search";

const MIN_SNIPPET_CHARS: usize = 20;

pub struct GoogleAdapter {
    client: reqwest::Client,
}

impl GoogleAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchAdapter for GoogleAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Google
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawCandidate>> {
        let num = limit.to_string();
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query), ("num", num.as_str()), ("hl", "en"), ("gl", "us")])
            .header("Accept", "text/html")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("google error: {}", resp.status());
        }

        let body = resp.text().await?;
        Ok(parse_results(&body, limit))
    }
}

// `Html` is !Send — parsing stays in a sync scope with no awaits.
fn parse_results(body: &str, limit: usize) -> Vec<RawCandidate> {
    let doc = Html::parse_document(body);
    let result_sel = Selector::parse("div.tF2Cxc").expect("static selector");
    let title_sel = Selector::parse("h3").expect("static selector");
    let link_sel = Selector::parse("a").expect("static selector");
    // Google has shipped both container classes for the snippet block.
    let snippet_sel = Selector::parse("div.VwiC3b, div.IsZvec").expect("static selector");

    let mut out = Vec::new();
    for item in doc.select(&result_sel).take(limit + 6) {
        if out.len() >= limit {
            break;
        }
        let Some(title_el) = item.select(&title_sel).next() else {
            continue;
        };
        let Some(link) = item.select(&link_sel).next() else {
            continue;
        };
        let Some(snippet_el) = item.select(&snippet_sel).next() else {
            continue;
        };

        let title = title_el.text().collect::<String>().trim().to_string();
        let snippet = snippet_el.text().collect::<String>().trim().to_string();
        if title.is_empty() || snippet.len() < MIN_SNIPPET_CHARS {
            continue;
        }

        let url = link
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|href| href.starts_with("http"))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_result_containers() {
        let body = r#"
            <div class="tF2Cxc">
              <a href="https://example.com/quic"><h3>QUIC protocol</h3></a>
              <div class="VwiC3b">QUIC is a UDP-based transport protocol designed for multiplexed connections.</div>
            </div>
        "#;
        let results = parse_results(body, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "QUIC protocol");
        assert_eq!(results[0].url.as_deref(), Some("https://example.com/quic"));
    }
}
