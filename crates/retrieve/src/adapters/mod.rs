//! Per-source retrieval adapters.
//!
//! Each adapter turns one upstream (an encyclopedia API, an HTML results
//! page, a paid search API) into a list of raw candidates.  Adapters do no
//! cleaning beyond dropping obviously empty rows; normalization, quality
//! filtering, and deduplication happen in the retriever.

mod bing;
mod brave;
mod duckduckgo;
mod google;
mod serpapi;
mod wikipedia;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use bing::BingAdapter;
pub use brave::BraveAdapter;
pub use duckduckgo::DuckDuckGoAdapter;
pub use google::GoogleAdapter;
pub use serpapi::SerpApiAdapter;
pub use wikipedia::WikipediaAdapter;

/// Closed set of candidate sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Encyclopedia,
    DuckDuckGo,
    Bing,
    Google,
    Brave,
    SerpApi,
}

impl AdapterKind {
    pub fn slug(&self) -> &'static str {
        match self {
            AdapterKind::Encyclopedia => "encyclopedia",
            AdapterKind::DuckDuckGo => "duckduckgo",
            AdapterKind::Bing => "bing",
            AdapterKind::Google => "google",
            AdapterKind::Brave => "brave",
            AdapterKind::SerpApi => "serpapi",
        }
    }

    /// Baseline confidence declared for candidates from this source.
    pub fn base_confidence(&self) -> f32 {
        match self {
            AdapterKind::Encyclopedia => 0.9,
            AdapterKind::DuckDuckGo | AdapterKind::Bing | AdapterKind::Google => 0.7,
            AdapterKind::Brave | AdapterKind::SerpApi => 0.8,
        }
    }

    /// Result quota for one query against this source.  Comparison queries
    /// need breadth; per-topic sub-queries run with a reduced allowance.
    pub fn quota(&self, comparison: bool, sub_query: bool) -> usize {
        if sub_query {
            return 3;
        }
        match self {
            AdapterKind::Encyclopedia => {
                if comparison {
                    2
                } else {
                    1
                }
            }
            AdapterKind::DuckDuckGo | AdapterKind::Bing | AdapterKind::Google => {
                if comparison {
                    6
                } else {
                    4
                }
            }
            AdapterKind::Brave | AdapterKind::SerpApi => {
                if comparison {
                    3
                } else {
                    2
                }
            }
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// An unranked result row as the upstream returned it.
#[derive(Debug, Clone)]
pub struct RawCandidate {
    pub title: String,
    pub snippet: String,
    pub url: Option<String>,
    /// Source-declared publication timestamp, when one was present.
    pub published_at: Option<DateTime<Utc>>,
}

/// One retrieval source.  Implementations must be side-effect free beyond
/// the outbound request; failures are reported, never retried internally.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawCandidate>>;
}
