//! Read-side retrieval over stored knowledge, consumed by answer-shaping
//! collaborators.  Never writes.

use std::sync::Arc;

use thor_config::RetrievalConfig;
use thor_retrieve::query::is_comparison_query;
use thor_retrieve::rerank::{RerankOptions, rerank};
use thor_store::{KnowledgeItem, KnowledgeStore, StoreError};

/// How many keyword-matched rows feed the reranker.  The store is never
/// ranked wholesale; only this short list is scored.
const CANDIDATE_CAP: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Override the result count; defaults to the configured top-K.
    pub limit: Option<usize>,
    /// Force per-source diversity sampling even for plain queries.
    pub force_diversity: bool,
    /// Callers with conversational context can flag comparison intent the
    /// query text alone doesn't show.
    pub comparison_hint: bool,
}

pub struct KnowledgeSearch {
    store: Arc<KnowledgeStore>,
    config: RetrievalConfig,
}

impl KnowledgeSearch {
    pub fn new(store: Arc<KnowledgeStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    pub fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<KnowledgeItem>, StoreError> {
        let comparison = options.comparison_hint || is_comparison_query(query);
        let limit = options.limit.unwrap_or(if comparison {
            self.config.comparison_top_k
        } else {
            self.config.top_k
        });

        let candidates = self.store.find_candidates(query, CANDIDATE_CAP)?;
        Ok(rerank(
            query,
            candidates,
            &RerankOptions {
                limit,
                diversify: comparison || options.force_diversity,
                per_source_cap: self.config.per_source_cap,
            },
        ))
    }
}
