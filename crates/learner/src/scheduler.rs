//! Mixed-source topic selection.
//!
//! Each call rolls a weighted die over the source buckets (dictionary,
//! user feedback, trending, discovered), promotes fresh names from the
//! chosen bucket into the store where applicable, and claims the best
//! pending topic.  A dry bucket falls through to a claim across all
//! sources, so workers are never starved while any topic is pending.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, info, warn};

use thor_config::SchedulerConfig;
use thor_store::{KnowledgeStore, NewTopic, Topic, TopicSource};

use crate::trending::TrendingProvider;

/// Fallback seed used when no dictionary file is available; start-up must
/// never fail on a missing bootstrap document.
const BUILTIN_SEED_TOPICS: &[&str] = &[
    "quantum computing",
    "machine learning",
    "rust programming",
    "python programming",
    "distributed systems",
    "graph theory",
    "linear algebra",
    "photosynthesis",
    "dna replication",
    "roman empire",
    "industrial revolution",
    "renaissance art",
    "classical music",
    "supply and demand",
    "behavioral economics",
    "stoicism",
    "epistemology",
    "plate tectonics",
    "neural networks",
    "cryptography",
];

/// On-disk bootstrap dictionary: a flat topic list plus optional explicit
/// category assignments.
#[derive(Debug, Default, Deserialize)]
struct SeedDictionary {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    categories: HashMap<String, Vec<String>>,
}

pub struct TopicScheduler {
    store: Arc<KnowledgeStore>,
    config: SchedulerConfig,
    trending: Option<Arc<dyn TrendingProvider>>,
}

impl TopicScheduler {
    pub fn new(store: Arc<KnowledgeStore>, config: SchedulerConfig) -> Self {
        Self {
            store,
            config,
            trending: None,
        }
    }

    pub fn with_trending(mut self, provider: Arc<dyn TrendingProvider>) -> Self {
        self.trending = Some(provider);
        self
    }

    /// Load the bootstrap dictionary into the store.  Idempotent; a missing
    /// or unreadable file falls back to the built-in list.
    pub fn seed_dictionary(&self, path: &Path) -> Result<(usize, usize)> {
        let dictionary = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<SeedDictionary>(&raw) {
                Ok(dictionary) => dictionary,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "unparseable dictionary, using built-in seed list");
                    SeedDictionary::default()
                }
            },
            Err(_) => {
                warn!(path = %path.display(), "dictionary not found, using built-in seed list");
                SeedDictionary::default()
            }
        };

        let topics: Vec<String> = if dictionary.topics.is_empty() {
            BUILTIN_SEED_TOPICS.iter().map(|t| t.to_string()).collect()
        } else {
            dictionary.topics
        };

        // Reverse lookup for explicit category assignments.
        let mut explicit: HashMap<String, String> = HashMap::new();
        for (category, members) in &dictionary.categories {
            for member in members {
                explicit.insert(member.to_lowercase(), category.clone());
            }
        }

        let batch: Vec<NewTopic> = topics
            .iter()
            .map(|topic| {
                let category = explicit
                    .get(&topic.to_lowercase())
                    .cloned()
                    .unwrap_or_else(|| guess_category(topic).to_string());
                NewTopic::new(topic.clone(), TopicSource::Dictionary).with_category(category)
            })
            .collect();

        let (added, existing) = self.store.add_topics_batch(&batch)?;
        info!(added, existing, "dictionary seeded");
        Ok((added, existing))
    }

    /// Pick the next topic under the mixed-source policy.  `Ok(None)` means
    /// nothing is pending anywhere; the caller waits out its interval.
    pub async fn next_topic(&self) -> Result<Option<Topic>> {
        let roll: f64 = rand::rng().random();
        let bucket = self.pick_bucket(roll);
        self.claim_from_bucket(bucket).await
    }

    /// Map one uniform roll in [0, 1) onto a source bucket.
    pub(crate) fn pick_bucket(&self, roll: f64) -> TopicSource {
        let weighted = [
            (TopicSource::Dictionary, self.config.dictionary_weight),
            (TopicSource::UserQuery, self.config.user_query_weight),
            (TopicSource::Trending, self.config.trending_weight),
            (TopicSource::Discovered, self.config.discovered_weight),
        ];

        let mut cumulative = 0.0;
        for (source, weight) in weighted {
            cumulative += weight;
            if roll <= cumulative {
                return source;
            }
        }
        TopicSource::Dictionary
    }

    pub(crate) async fn claim_from_bucket(&self, bucket: TopicSource) -> Result<Option<Topic>> {
        match bucket {
            TopicSource::UserQuery => self.promote_unanswered()?,
            TopicSource::Trending => self.promote_trending().await,
            _ => {}
        }

        if let Some(topic) = self.store.claim_next_topic(Some(bucket))? {
            return Ok(Some(topic));
        }
        // Bucket dry: fall through to a claim across all sources.
        Ok(self.store.claim_next_topic(None)?)
    }

    /// Promote unanswered user-query topics so the claim below can pick
    /// them up.
    fn promote_unanswered(&self) -> Result<()> {
        let unanswered = self.store.get_unanswered_topics(10)?;
        if unanswered.is_empty() {
            return Ok(());
        }
        let batch: Vec<NewTopic> = unanswered
            .iter()
            .map(|name| NewTopic::new(name.clone(), TopicSource::UserQuery).with_priority(8))
            .collect();
        let (added, _) = self.store.add_topics_batch(&batch)?;
        if added > 0 {
            debug!(added, "promoted unanswered user queries to topics");
        }
        Ok(())
    }

    /// Trending promotion is best-effort; provider failures only cost this
    /// roll its bucket.
    async fn promote_trending(&self) {
        let Some(provider) = &self.trending else {
            return;
        };
        match provider.trending(10).await {
            Ok(names) if !names.is_empty() => {
                let batch: Vec<NewTopic> = names
                    .iter()
                    .map(|name| NewTopic::new(name.clone(), TopicSource::Trending).with_priority(7))
                    .collect();
                match self.store.add_topics_batch(&batch) {
                    Ok((added, _)) if added > 0 => {
                        debug!(added, "promoted trending topics");
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "storing trending topics failed"),
                }
            }
            Ok(_) => {}
            Err(err) => debug!(error = %err, "trending provider unavailable"),
        }
    }
}

/// Keyword heuristic for tagging seed topics that carry no explicit
/// category.
pub(crate) fn guess_category(topic: &str) -> &'static str {
    let lower = topic.to_lowercase();
    let has = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if has(&["programming", "code", "software", "api", "database", "algorithm", "compiler"]) {
        "programming"
    } else if has(&["machine learning", "neural", "deep learning", "quantum", "physics", "chemistry"]) {
        "science"
    } else if has(&["history", "war", "empire", "ancient", "medieval", "revolution"]) {
        "history"
    } else if has(&["math", "calculus", "algebra", "geometry", "theorem", "graph theory"]) {
        "mathematics"
    } else if has(&["biology", "cell", "dna", "gene", "medicine", "photosynthesis"]) {
        "biology"
    } else if has(&["art", "music", "literature", "film", "dance", "painting"]) {
        "arts"
    } else if has(&["economics", "finance", "business", "market", "demand"]) {
        "economics"
    } else if has(&["philosophy", "psychology", "ethics", "mind", "stoicism", "epistemology"]) {
        "philosophy"
    } else {
        "general"
    }
}
