use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a topic came from.  Drives the scheduler's mixed-source policy and
/// the default priority a promoted topic receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicSource {
    Dictionary,
    UserQuery,
    Trending,
    Discovered,
    Manual,
}

impl TopicSource {
    pub const ALL: [TopicSource; 5] = [
        TopicSource::Dictionary,
        TopicSource::UserQuery,
        TopicSource::Trending,
        TopicSource::Discovered,
        TopicSource::Manual,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            TopicSource::Dictionary => "dictionary",
            TopicSource::UserQuery => "user_query",
            TopicSource::Trending => "trending",
            TopicSource::Discovered => "discovered",
            TopicSource::Manual => "manual",
        }
    }

    /// Priority assigned when a topic is promoted without an explicit value.
    pub fn default_priority(&self) -> u8 {
        match self {
            TopicSource::Dictionary => 5,
            TopicSource::UserQuery => 8,
            TopicSource::Trending => 7,
            TopicSource::Discovered => 4,
            TopicSource::Manual => 9,
        }
    }
}

impl fmt::Display for TopicSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Pending,
    InProgress,
    Crawled,
    NoResults,
    Error,
}

impl TopicStatus {
    pub fn slug(&self) -> &'static str {
        match self {
            TopicStatus::Pending => "pending",
            TopicStatus::InProgress => "in_progress",
            TopicStatus::Crawled => "crawled",
            TopicStatus::NoResults => "no_results",
            TopicStatus::Error => "error",
        }
    }
}

impl fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// A unit of research work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: u64,
    pub name: String,
    pub category: Option<String>,
    pub source: TopicSource,
    pub priority: u8,
    pub status: TopicStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Cached count of knowledge items referencing this topic.
    pub knowledge_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input record for [`KnowledgeStore::add_topics_batch`].
#[derive(Debug, Clone)]
pub struct NewTopic {
    pub name: String,
    pub category: Option<String>,
    pub source: TopicSource,
    /// Defaults to [`TopicSource::default_priority`] when absent.
    pub priority: Option<u8>,
}

impl NewTopic {
    pub fn new(name: impl Into<String>, source: TopicSource) -> Self {
        Self {
            name: name.into(),
            category: None,
            source,
            priority: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// A normalized, stored snippet attached to a topic.  Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: u64,
    pub topic_id: u64,
    pub title: String,
    pub content: String,
    /// Slug of the producing adapter (`encyclopedia`, `duckduckgo`, …).
    pub source_adapter: String,
    pub url: Option<String>,
    /// Adapter-declared baseline confidence in [0, 1].
    pub confidence: f32,
    pub fingerprint: String,
    /// Timestamp carried by the source document, when one was present.
    pub published_at: Option<DateTime<Utc>>,
    pub learned_at: DateTime<Utc>,
}

/// Input record for [`KnowledgeStore::add_knowledge_batch`].
#[derive(Debug, Clone)]
pub struct NewKnowledge {
    pub topic_id: u64,
    pub title: String,
    pub content: String,
    pub source_adapter: String,
    pub url: Option<String>,
    pub confidence: f32,
    pub fingerprint: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedTopicEdge {
    pub from_topic_id: u64,
    pub to_topic_name: String,
    pub created_at: DateTime<Utc>,
}

/// Feedback signal recorded for every user query the surrounding
/// application answers (or fails to answer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQueryRecord {
    pub id: u64,
    pub query_text: String,
    pub extracted_topics: Vec<String>,
    pub knowledge_was_found: bool,
    pub needs_research: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Process-lifetime throughput record.  At most one session is open at a
/// time; a session left open by a crash is closed as aborted on the next
/// start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSession {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub aborted: bool,
    pub topics_crawled: u64,
    pub knowledge_items_added: u64,
    pub errors_encountered: u64,
}

/// Store-wide totals plus 24-hour windowed counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub total_topics: u64,
    pub pending_topics: u64,
    pub in_progress_topics: u64,
    pub crawled_topics: u64,
    pub no_result_topics: u64,
    pub error_topics: u64,
    pub total_knowledge_items: u64,
    pub total_user_queries: u64,
    pub knowledge_added_24h: u64,
    pub topics_crawled_24h: u64,
}
