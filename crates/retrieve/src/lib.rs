//! Multi-engine retrieval: fan a query out to every configured source
//! adapter under rate limits, normalize and deduplicate what comes back,
//! and return the top-K reranked candidates.
//!
//! The retriever never writes anywhere and never fails as a whole: each
//! adapter's errors, timeouts, and empty pages degrade to an empty list
//! for that adapter only.

pub mod adapters;
pub mod query;
pub mod rate_limit;
pub mod rerank;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::debug;

use thor_config::RetrievalConfig;
use thor_store::NewKnowledge;

use adapters::{
    AdapterKind, BingAdapter, BraveAdapter, DuckDuckGoAdapter, GoogleAdapter, RawCandidate,
    SearchAdapter, SerpApiAdapter, WikipediaAdapter,
};
use rate_limit::RateLimiter;
use rerank::{Rankable, RerankOptions};

/// Stored bodies are capped to keep snippets snippet-sized.
const MAX_CONTENT_CHARS: usize = 700;

/// A cleaned, scored-ready candidate.  Discarded after each query unless
/// the caller persists it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub title: String,
    pub content: String,
    pub adapter: AdapterKind,
    pub url: Option<String>,
    pub confidence: f32,
    pub published_at: Option<DateTime<Utc>>,
    pub fingerprint: String,
    /// Position within the producing adapter's result list.
    pub adapter_rank: usize,
}

impl Candidate {
    pub fn into_new_knowledge(self, topic_id: u64) -> NewKnowledge {
        NewKnowledge {
            topic_id,
            title: self.title,
            content: self.content,
            source_adapter: self.adapter.slug().to_string(),
            url: self.url,
            confidence: self.confidence,
            fingerprint: self.fingerprint,
            published_at: self.published_at,
        }
    }
}

impl Rankable for Candidate {
    fn title(&self) -> &str {
        &self.title
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn source_slug(&self) -> &str {
        self.adapter.slug()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    fn tie_break(&self) -> usize {
        self.adapter_rank
    }
}

pub struct Retriever {
    adapters: Vec<Arc<dyn SearchAdapter>>,
    limiter: RateLimiter,
    config: RetrievalConfig,
}

impl Retriever {
    /// Build the production adapter set: Wikipedia, DuckDuckGo, Bing, and
    /// Google — with SerpAPI replacing Google and Brave joining when their
    /// keys are configured.
    pub fn new(config: RetrievalConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.adapter_timeout_secs))
            .build()?;

        let mut adapters: Vec<Arc<dyn SearchAdapter>> = vec![
            Arc::new(WikipediaAdapter::new(client.clone())),
            Arc::new(DuckDuckGoAdapter::new(client.clone())),
            Arc::new(BingAdapter::new(client.clone())),
        ];
        if let Some(key) = config.serpapi_key() {
            adapters.push(Arc::new(SerpApiAdapter::new(client.clone(), key)));
        } else {
            adapters.push(Arc::new(GoogleAdapter::new(client.clone())));
        }
        if let Some(key) = config.brave_key() {
            adapters.push(Arc::new(BraveAdapter::new(client, key)));
        }

        Ok(Self::with_adapters(config, adapters))
    }

    /// Assemble a retriever over an explicit adapter set.
    pub fn with_adapters(
        config: RetrievalConfig,
        adapters: Vec<Arc<dyn SearchAdapter>>,
    ) -> Self {
        let limiter = RateLimiter::new(Duration::from_millis(config.min_request_interval_ms));
        Self {
            adapters,
            limiter,
            config,
        }
    }

    /// Research `raw_query` across all adapters and return the top-K ranked
    /// candidates.  Returns an empty list when every adapter fails or
    /// nothing survives normalization.
    pub async fn search(&self, raw_query: &str) -> Vec<Candidate> {
        let enhanced = query::enhance_programming_query(raw_query);
        let comparison = query::is_comparison_query(&enhanced);

        let mut queries = vec![enhanced.clone()];
        if comparison {
            if let Some((first, second)) = query::split_comparison_topics(&enhanced) {
                debug!(%first, %second, "comparison query: researching both sides individually");
                queries.push(first);
                queries.push(second);
            }
        }

        let mut merged: Vec<Candidate> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (index, q) in queries.iter().enumerate() {
            let sub_query = index > 0;
            let batches = join_all(
                self.adapters
                    .iter()
                    .map(|adapter| self.run_adapter(adapter.as_ref(), q, comparison, sub_query)),
            )
            .await;
            for batch in batches {
                for candidate in batch {
                    if seen.insert(candidate.fingerprint.clone()) {
                        merged.push(candidate);
                    }
                }
            }
        }

        let limit = if comparison {
            self.config.comparison_top_k
        } else {
            self.config.top_k
        };
        rerank::rerank(
            raw_query,
            merged,
            &RerankOptions {
                limit,
                diversify: comparison,
                per_source_cap: self.config.per_source_cap,
            },
        )
    }

    /// One adapter, one query: rate-limit gate, independent timeout, then
    /// normalization.  All failure modes collapse to an empty list.
    async fn run_adapter(
        &self,
        adapter: &dyn SearchAdapter,
        q: &str,
        comparison: bool,
        sub_query: bool,
    ) -> Vec<Candidate> {
        let kind = adapter.kind();
        let quota = kind.quota(comparison, sub_query);

        self.limiter.acquire(kind).await;

        let budget = Duration::from_secs(self.config.adapter_timeout_secs);
        let raw = match tokio::time::timeout(budget, adapter.search(q, quota)).await {
            Ok(Ok(results)) => results,
            Ok(Err(err)) => {
                debug!(adapter = %kind, error = %err, "adapter failed");
                return Vec::new();
            }
            Err(_) => {
                debug!(adapter = %kind, budget_secs = budget.as_secs(), "adapter timed out");
                return Vec::new();
            }
        };

        raw.into_iter()
            .enumerate()
            .filter_map(|(rank, candidate)| self.clean_candidate(kind, rank, candidate))
            .collect()
    }

    fn clean_candidate(
        &self,
        kind: AdapterKind,
        rank: usize,
        raw: RawCandidate,
    ) -> Option<Candidate> {
        let title = thor_normalize::collapse_whitespace(&raw.title);
        let mut content = thor_normalize::normalize(&raw.snippet);
        if content.chars().count() > MAX_CONTENT_CHARS {
            content = content.chars().take(MAX_CONTENT_CHARS).collect();
        }
        if title.is_empty() || !thor_normalize::acceptable(&content, self.config.min_content_chars)
        {
            return None;
        }

        let fingerprint = thor_normalize::fingerprint(&title, &content, kind.slug());
        Some(Candidate {
            title,
            content,
            adapter: kind,
            url: raw.url.filter(|u| !u.trim().is_empty()),
            confidence: kind.base_confidence(),
            published_at: raw.published_at,
            fingerprint,
            adapter_rank: rank,
        })
    }
}
