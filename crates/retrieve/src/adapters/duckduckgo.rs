//! DuckDuckGo HTML results adapter.

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use super::{AdapterKind, RawCandidate, SearchAdapter};

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";

/// Raw snippets shorter than this are noise rows (ads, nav fragments).
const MIN_SNIPPET_CHARS: usize = 20;

pub struct DuckDuckGoAdapter {
    client: reqwest::Client,
}

impl DuckDuckGoAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchAdapter for DuckDuckGoAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::DuckDuckGo
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawCandidate>> {
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query)])
            .header("Accept", "text/html")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("duckduckgo error: {}", resp.status());
        }

        let body = resp.text().await?;
        Ok(parse_results(&body, limit))
    }
}

// `Html` is !Send — parsing stays in a sync scope with no awaits.
fn parse_results(body: &str, limit: usize) -> Vec<RawCandidate> {
    let doc = Html::parse_document(body);
    let result_sel = Selector::parse("div.result").expect("static selector");
    let title_sel = Selector::parse("a.result__a").expect("static selector");
    let snippet_sel = Selector::parse("a.result__snippet").expect("static selector");

    let mut out = Vec::new();
    // Take extra rows so noise filtering doesn't starve the quota.
    for result in doc.select(&result_sel).take(limit + 6) {
        if out.len() >= limit {
            break;
        }
        let Some(link) = result.select(&title_sel).next() else {
            continue;
        };
        let Some(snippet_el) = result.select(&snippet_sel).next() else {
            continue;
        };

        let title = link.text().collect::<String>().trim().to_string();
        let snippet = snippet_el.text().collect::<String>().trim().to_string();
        if title.is_empty() || snippet.len() < MIN_SNIPPET_CHARS {
            continue;
        }

        let url = link.value().attr("href").map(unwrap_redirect);
        out.push(RawCandidate {
            title,
            snippet,
            url,
            published_at: None,
        });
    }
    out
}

/// DuckDuckGo wraps result links in a redirect; the real target sits in the
/// `uddg` query parameter.
fn unwrap_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "uddg")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_result_rows() {
        let body = r#"
            <div class="result">
              <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Ftcp&rut=abc">TCP explained</a>
              <a class="result__snippet">TCP is a connection-oriented transport protocol used on the internet.</a>
            </div>
            <div class="result">
              <a class="result__a" href="https://other.example/">Short</a>
              <a class="result__snippet">too short</a>
            </div>
        "#;
        let results = parse_results(body, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "TCP explained");
        assert_eq!(results[0].url.as_deref(), Some("https://example.com/tcp"));
    }

    #[test]
    fn redirect_unwrap_falls_back_to_raw_href() {
        assert_eq!(
            unwrap_redirect("https://plain.example/page"),
            "https://plain.example/page"
        );
    }
}
