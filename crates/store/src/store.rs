//! Durable single-writer persistence over [`redb`].
//!
//! Values are JSON-encoded records; secondary index tables keep the unique
//! constraints ((name, source) for topics, (topic, fingerprint) for
//! knowledge) enforceable inside one write transaction.  redb gives the
//! concurrency contract for free: writers serialize on the write
//! transaction, readers run against MVCC snapshots.
//!
//! # Tables
//!
//! | Name                     | Key                        | Value            |
//! |--------------------------|----------------------------|------------------|
//! | `topics`                 | topic id (u64)             | JSON `Topic`     |
//! | `topic_names`            | `"{source}|{name_lower}"`  | topic id         |
//! | `knowledge`              | item id (u64)              | JSON item        |
//! | `knowledge_fingerprints` | `"{topic_id}|{fp}"`        | item id          |
//! | `knowledge_by_topic`     | (topic id, item id)        | ()               |
//! | `related_topics`         | (from id, name_lower)      | JSON edge        |
//! | `user_queries`           | query id (u64)             | JSON record      |
//! | `sessions`               | session id (u64)           | JSON session     |
//! | `counters`               | entity name                | next id          |

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};
use lru::LruCache;
use redb::{Database, ReadableTable, ReadableTableMetadata, Table, TableDefinition};
use tracing::{info, warn};

use thor_normalize::normalize_for_match;

use crate::error::StoreError;
use crate::schema::{
    DatabaseStats, KnowledgeItem, LearningSession, NewKnowledge, NewTopic, RelatedTopicEdge,
    Topic, TopicSource, TopicStatus, UserQueryRecord,
};

const TOPICS: TableDefinition<u64, &[u8]> = TableDefinition::new("topics");
const TOPIC_NAMES: TableDefinition<&str, u64> = TableDefinition::new("topic_names");
const KNOWLEDGE: TableDefinition<u64, &[u8]> = TableDefinition::new("knowledge");
const KNOWLEDGE_FINGERPRINTS: TableDefinition<&str, u64> =
    TableDefinition::new("knowledge_fingerprints");
const KNOWLEDGE_BY_TOPIC: TableDefinition<(u64, u64), ()> =
    TableDefinition::new("knowledge_by_topic");
const RELATED_TOPICS: TableDefinition<(u64, &str), &[u8]> = TableDefinition::new("related_topics");
const USER_QUERIES: TableDefinition<u64, &[u8]> = TableDefinition::new("user_queries");
const SESSIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("sessions");
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Entries held in the per-topic knowledge read cache.
const CACHE_CAPACITY: usize = 64;

/// Snapshot of the read-cache counters.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub capacity: usize,
    pub len: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct KnowledgeStore {
    db: Database,
    path: PathBuf,
    /// Hot cache: topic id → that topic's knowledge items.  Invalidated on
    /// writes to the topic.
    cache: Mutex<LruCache<u64, Vec<KnowledgeItem>>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl KnowledgeStore {
    /// Open or create the store at `path`, ensuring all tables exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(&path)?;

        {
            let txn = db.begin_write()?;
            txn.open_table(TOPICS)?;
            txn.open_table(TOPIC_NAMES)?;
            txn.open_table(KNOWLEDGE)?;
            txn.open_table(KNOWLEDGE_FINGERPRINTS)?;
            txn.open_table(KNOWLEDGE_BY_TOPIC)?;
            txn.open_table(RELATED_TOPICS)?;
            txn.open_table(USER_QUERIES)?;
            txn.open_table(SESSIONS)?;
            txn.open_table(COUNTERS)?;
            txn.commit()?;
        }

        info!(path = %path.display(), "knowledge store opened");
        Ok(Self {
            db,
            path,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero cache capacity"),
            )),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Topics ────────────────────────────────────────────────────────────────

    /// Upsert topics by (name, source).  Returns `(added, existing)`.
    /// Idempotent: re-running with the same inputs adds nothing.
    pub fn add_topics_batch(&self, items: &[NewTopic]) -> Result<(usize, usize), StoreError> {
        let mut added = 0usize;
        let mut existing = 0usize;

        let txn = self.db.begin_write()?;
        {
            let mut topics = txn.open_table(TOPICS)?;
            let mut names = txn.open_table(TOPIC_NAMES)?;
            let mut counters = txn.open_table(COUNTERS)?;

            for item in items {
                let name = item.name.trim();
                if name.is_empty() {
                    continue;
                }

                let key = name_key(item.source, name);
                if names.get(key.as_str())?.is_some() {
                    existing += 1;
                    continue;
                }

                let id = next_id(&mut counters, "topics")?;
                let now = Utc::now();
                let topic = Topic {
                    id,
                    name: name.to_string(),
                    category: item.category.clone(),
                    source: item.source,
                    priority: item.priority.unwrap_or_else(|| item.source.default_priority()),
                    status: TopicStatus::Pending,
                    attempts: 0,
                    last_error: None,
                    knowledge_count: 0,
                    created_at: now,
                    updated_at: now,
                };
                let bytes = serde_json::to_vec(&topic)?;
                topics.insert(id, bytes.as_slice())?;
                names.insert(key.as_str(), id)?;
                added += 1;
            }
        }
        txn.commit()?;

        Ok((added, existing))
    }

    /// Atomically claim the best pending topic: priority desc, then
    /// created_at asc, then id asc.  The claimed topic transitions to
    /// `in_progress` with `attempts` incremented before the transaction
    /// commits, so no two callers can ever claim the same topic.
    ///
    /// `source` restricts the claim to one bucket; `None` claims across all
    /// of them.
    pub fn claim_next_topic(
        &self,
        source: Option<TopicSource>,
    ) -> Result<Option<Topic>, StoreError> {
        let txn = self.db.begin_write()?;
        let claimed = {
            let mut topics = txn.open_table(TOPICS)?;

            let mut best: Option<Topic> = None;
            for row in topics.iter()? {
                let (_, value) = row?;
                let topic: Topic = serde_json::from_slice(value.value())?;
                if topic.status != TopicStatus::Pending {
                    continue;
                }
                if let Some(want) = source {
                    if topic.source != want {
                        continue;
                    }
                }
                let replace = match &best {
                    None => true,
                    Some(current) => {
                        (
                            topic.priority,
                            std::cmp::Reverse(topic.created_at),
                            std::cmp::Reverse(topic.id),
                        ) > (
                            current.priority,
                            std::cmp::Reverse(current.created_at),
                            std::cmp::Reverse(current.id),
                        )
                    }
                };
                if replace {
                    best = Some(topic);
                }
            }

            match best {
                None => None,
                Some(mut topic) => {
                    topic.status = TopicStatus::InProgress;
                    topic.attempts += 1;
                    topic.updated_at = Utc::now();
                    let bytes = serde_json::to_vec(&topic)?;
                    topics.insert(topic.id, bytes.as_slice())?;
                    Some(topic)
                }
            }
        };
        txn.commit()?;

        Ok(claimed)
    }

    /// Record the outcome of a crawl.  Only valid on a topic that is
    /// currently `in_progress`.
    pub fn update_topic_status(
        &self,
        topic_id: u64,
        status: TopicStatus,
        knowledge_count: Option<u64>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut topics = txn.open_table(TOPICS)?;
            let mut topic = match topics.get(topic_id)? {
                Some(value) => serde_json::from_slice::<Topic>(value.value())?,
                None => return Err(StoreError::TopicNotFound { id: topic_id }),
            };

            if topic.status != TopicStatus::InProgress {
                return Err(StoreError::InvalidTransition {
                    id: topic_id,
                    found: topic.status,
                });
            }

            topic.status = status;
            topic.updated_at = Utc::now();
            if let Some(count) = knowledge_count {
                topic.knowledge_count = count;
            }
            topic.last_error = error.map(|e| e.chars().take(100).collect());

            let bytes = serde_json::to_vec(&topic)?;
            topics.insert(topic_id, bytes.as_slice())?;
        }
        txn.commit()?;

        Ok(())
    }

    pub fn get_topic(&self, topic_id: u64) -> Result<Option<Topic>, StoreError> {
        let txn = self.db.begin_read()?;
        let topics = txn.open_table(TOPICS)?;
        match topics.get(topic_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All topics currently in `status`, ordered by id.
    pub fn topics_with_status(&self, status: TopicStatus) -> Result<Vec<Topic>, StoreError> {
        let txn = self.db.begin_read()?;
        let topics = txn.open_table(TOPICS)?;
        let mut out = Vec::new();
        for row in topics.iter()? {
            let (_, value) = row?;
            let topic: Topic = serde_json::from_slice(value.value())?;
            if topic.status == status {
                out.push(topic);
            }
        }
        Ok(out)
    }

    /// Startup sweep: any claim older than `stale_after` is treated as
    /// abandoned by a dead worker and flipped back to `pending`.
    pub fn recover_stale_claims(&self, stale_after: Duration) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - stale_after;
        let mut recovered = 0usize;

        let txn = self.db.begin_write()?;
        {
            let mut topics = txn.open_table(TOPICS)?;

            let mut stale: Vec<Topic> = Vec::new();
            for row in topics.iter()? {
                let (_, value) = row?;
                let topic: Topic = serde_json::from_slice(value.value())?;
                if topic.status == TopicStatus::InProgress && topic.updated_at <= cutoff {
                    stale.push(topic);
                }
            }

            for mut topic in stale {
                topic.status = TopicStatus::Pending;
                topic.updated_at = Utc::now();
                let bytes = serde_json::to_vec(&topic)?;
                topics.insert(topic.id, bytes.as_slice())?;
                recovered += 1;
            }
        }
        txn.commit()?;

        if recovered > 0 {
            warn!(recovered, "recovered abandoned topic claims");
        }
        Ok(recovered)
    }

    /// Re-queue `error` topics whose backoff window has elapsed
    /// (`base_backoff · 2^(attempts − 1)`).  Topics at or past
    /// `max_attempts` stay terminal but visible.
    pub fn requeue_errored_topics(
        &self,
        max_attempts: u32,
        base_backoff: Duration,
    ) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut requeued = 0usize;

        let txn = self.db.begin_write()?;
        {
            let mut topics = txn.open_table(TOPICS)?;

            let mut eligible: Vec<Topic> = Vec::new();
            for row in topics.iter()? {
                let (_, value) = row?;
                let topic: Topic = serde_json::from_slice(value.value())?;
                if topic.status != TopicStatus::Error || topic.attempts >= max_attempts {
                    continue;
                }
                let shift = topic.attempts.saturating_sub(1).min(16);
                let backoff = base_backoff * 2_i32.pow(shift);
                if topic.updated_at + backoff <= now {
                    eligible.push(topic);
                }
            }

            for mut topic in eligible {
                topic.status = TopicStatus::Pending;
                topic.updated_at = now;
                let bytes = serde_json::to_vec(&topic)?;
                topics.insert(topic.id, bytes.as_slice())?;
                requeued += 1;
            }
        }
        txn.commit()?;

        Ok(requeued)
    }

    // ── Knowledge ─────────────────────────────────────────────────────────────

    /// Insert a batch of knowledge items, deduplicating on
    /// (topic_id, fingerprint).  Returns `(successful, duplicates)`.
    /// The owning topics' cached `knowledge_count` is bumped in the same
    /// transaction.
    pub fn add_knowledge_batch(
        &self,
        items: &[NewKnowledge],
    ) -> Result<(usize, usize), StoreError> {
        let mut successful = 0usize;
        let mut duplicates = 0usize;
        let mut per_topic: HashMap<u64, u64> = HashMap::new();

        let txn = self.db.begin_write()?;
        {
            let mut knowledge = txn.open_table(KNOWLEDGE)?;
            let mut fingerprints = txn.open_table(KNOWLEDGE_FINGERPRINTS)?;
            let mut by_topic = txn.open_table(KNOWLEDGE_BY_TOPIC)?;
            let mut topics = txn.open_table(TOPICS)?;
            let mut counters = txn.open_table(COUNTERS)?;

            for item in items {
                if topics.get(item.topic_id)?.is_none() {
                    return Err(StoreError::TopicNotFound { id: item.topic_id });
                }

                let fp_key = format!("{}|{}", item.topic_id, item.fingerprint);
                if fingerprints.get(fp_key.as_str())?.is_some() {
                    duplicates += 1;
                    continue;
                }

                let id = next_id(&mut counters, "knowledge")?;
                let stored = KnowledgeItem {
                    id,
                    topic_id: item.topic_id,
                    title: item.title.trim().to_string(),
                    content: item.content.clone(),
                    source_adapter: item.source_adapter.clone(),
                    url: item.url.clone(),
                    confidence: item.confidence.clamp(0.0, 1.0),
                    fingerprint: item.fingerprint.clone(),
                    published_at: item.published_at,
                    learned_at: Utc::now(),
                };
                let bytes = serde_json::to_vec(&stored)?;
                knowledge.insert(id, bytes.as_slice())?;
                fingerprints.insert(fp_key.as_str(), id)?;
                by_topic.insert((item.topic_id, id), ())?;
                *per_topic.entry(item.topic_id).or_default() += 1;
                successful += 1;
            }

            for (topic_id, count) in &per_topic {
                let mut topic = match topics.get(*topic_id)? {
                    Some(value) => serde_json::from_slice::<Topic>(value.value())?,
                    None => return Err(StoreError::TopicNotFound { id: *topic_id }),
                };
                topic.knowledge_count += count;
                topic.updated_at = Utc::now();
                let bytes = serde_json::to_vec(&topic)?;
                topics.insert(*topic_id, bytes.as_slice())?;
            }
        }
        txn.commit()?;

        if !per_topic.is_empty() {
            let mut cache = self.cache.lock().expect("cache lock");
            for topic_id in per_topic.keys() {
                cache.pop(topic_id);
            }
        }

        Ok((successful, duplicates))
    }

    /// All knowledge items for one topic, through the LRU read cache.
    pub fn knowledge_for_topic(&self, topic_id: u64) -> Result<Vec<KnowledgeItem>, StoreError> {
        {
            let mut cache = self.cache.lock().expect("cache lock");
            if let Some(items) = cache.get(&topic_id) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(items.clone());
            }
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let txn = self.db.begin_read()?;
        let by_topic = txn.open_table(KNOWLEDGE_BY_TOPIC)?;
        let knowledge = txn.open_table(KNOWLEDGE)?;

        let mut items = Vec::new();
        for row in by_topic.range((topic_id, 0)..=(topic_id, u64::MAX))? {
            let (key, _) = row?;
            let (_, item_id) = key.value();
            if let Some(value) = knowledge.get(item_id)? {
                items.push(serde_json::from_slice::<KnowledgeItem>(value.value())?);
            }
        }

        let mut cache = self.cache.lock().expect("cache lock");
        cache.put(topic_id, items.clone());
        Ok(items)
    }

    /// Keyword-filtered short candidate list for the read-side search API.
    /// Intentionally not a ranking: callers rerank the returned list.
    pub fn find_candidates(
        &self,
        query: &str,
        cap: usize,
    ) -> Result<Vec<KnowledgeItem>, StoreError> {
        let terms: Vec<String> = query
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|t| t.len() >= 3)
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read()?;
        let knowledge = txn.open_table(KNOWLEDGE)?;

        let mut out = Vec::new();
        for row in knowledge.iter()? {
            let (_, value) = row?;
            let item: KnowledgeItem = serde_json::from_slice(value.value())?;
            let haystack = format!("{} {}", item.title, item.content).to_lowercase();
            if terms.iter().any(|t| haystack.contains(t.as_str())) {
                out.push(item);
                if out.len() >= cap {
                    break;
                }
            }
        }
        Ok(out)
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.lock().expect("cache lock");
        CacheStats {
            capacity: CACHE_CAPACITY,
            len: cache.len(),
            hits: self.cache_hits.load(Ordering::Relaxed),
            misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    // ── Related topics ────────────────────────────────────────────────────────

    /// Idempotent edge insert.  When no topic of that name exists under any
    /// source, a `pending` topic with source `discovered` is created so the
    /// scheduler can pick it up later.  Returns whether the edge was new.
    pub fn add_related_topic(
        &self,
        from_topic_id: u64,
        to_topic_name: &str,
    ) -> Result<bool, StoreError> {
        let name = to_topic_name.trim();
        if name.is_empty() {
            return Ok(false);
        }
        let name_lower = normalize_for_match(name);

        let txn = self.db.begin_write()?;
        let inserted = {
            let mut topics = txn.open_table(TOPICS)?;
            let mut names = txn.open_table(TOPIC_NAMES)?;
            let mut related = txn.open_table(RELATED_TOPICS)?;
            let mut counters = txn.open_table(COUNTERS)?;

            if topics.get(from_topic_id)?.is_none() {
                return Err(StoreError::TopicNotFound { id: from_topic_id });
            }

            if related.get((from_topic_id, name_lower.as_str()))?.is_some() {
                false
            } else {
                let edge = RelatedTopicEdge {
                    from_topic_id,
                    to_topic_name: name.to_string(),
                    created_at: Utc::now(),
                };
                let bytes = serde_json::to_vec(&edge)?;
                related.insert((from_topic_id, name_lower.as_str()), bytes.as_slice())?;

                let mut known = false;
                for source in TopicSource::ALL {
                    if names.get(name_key(source, name).as_str())?.is_some() {
                        known = true;
                        break;
                    }
                }
                if !known {
                    let id = next_id(&mut counters, "topics")?;
                    let now = Utc::now();
                    let topic = Topic {
                        id,
                        name: name.to_string(),
                        category: None,
                        source: TopicSource::Discovered,
                        priority: TopicSource::Discovered.default_priority(),
                        status: TopicStatus::Pending,
                        attempts: 0,
                        last_error: None,
                        knowledge_count: 0,
                        created_at: now,
                        updated_at: now,
                    };
                    let topic_bytes = serde_json::to_vec(&topic)?;
                    topics.insert(id, topic_bytes.as_slice())?;
                    names.insert(name_key(TopicSource::Discovered, name).as_str(), id)?;
                }
                true
            }
        };
        txn.commit()?;

        Ok(inserted)
    }

    pub fn related_topics_for(
        &self,
        from_topic_id: u64,
    ) -> Result<Vec<RelatedTopicEdge>, StoreError> {
        let txn = self.db.begin_read()?;
        let related = txn.open_table(RELATED_TOPICS)?;
        let mut out = Vec::new();
        for row in related.iter()? {
            let (key, value) = row?;
            if key.value().0 == from_topic_id {
                out.push(serde_json::from_slice::<RelatedTopicEdge>(value.value())?);
            }
        }
        Ok(out)
    }

    // ── User queries ──────────────────────────────────────────────────────────

    /// Append-only feedback record.
    pub fn record_user_query(
        &self,
        query_text: &str,
        extracted_topics: &[String],
        knowledge_was_found: bool,
        needs_research: bool,
    ) -> Result<u64, StoreError> {
        let txn = self.db.begin_write()?;
        let id = {
            let mut queries = txn.open_table(USER_QUERIES)?;
            let mut counters = txn.open_table(COUNTERS)?;

            let id = next_id(&mut counters, "queries")?;
            let record = UserQueryRecord {
                id,
                query_text: query_text.trim().to_string(),
                extracted_topics: extracted_topics.to_vec(),
                knowledge_was_found,
                needs_research,
                recorded_at: Utc::now(),
            };
            let bytes = serde_json::to_vec(&record)?;
            queries.insert(id, bytes.as_slice())?;
            id
        };
        txn.commit()?;

        Ok(id)
    }

    /// Topic names from recent unanswered user queries for which no crawled
    /// topic of that name exists yet.  Newest queries first, deduplicated.
    pub fn get_unanswered_topics(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        let txn = self.db.begin_read()?;
        let topics = txn.open_table(TOPICS)?;
        let queries = txn.open_table(USER_QUERIES)?;

        let mut crawled_names: HashSet<String> = HashSet::new();
        for row in topics.iter()? {
            let (_, value) = row?;
            let topic: Topic = serde_json::from_slice(value.value())?;
            if topic.status == TopicStatus::Crawled {
                crawled_names.insert(normalize_for_match(&topic.name));
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for row in queries.iter()?.rev() {
            if out.len() >= limit {
                break;
            }
            let (_, value) = row?;
            let record: UserQueryRecord = serde_json::from_slice(value.value())?;
            if record.knowledge_was_found {
                continue;
            }
            for name in &record.extracted_topics {
                let key = normalize_for_match(name);
                if key.is_empty() || crawled_names.contains(&key) || !seen.insert(key) {
                    continue;
                }
                out.push(name.clone());
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    // ── Learning sessions ─────────────────────────────────────────────────────

    /// Open a new session.  Any session left half-open by a crash is closed
    /// as aborted first, so at most one session is ever open.
    pub fn start_learning_session(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_write()?;
        let id = {
            let mut sessions = txn.open_table(SESSIONS)?;
            let mut counters = txn.open_table(COUNTERS)?;

            let mut half_open: Vec<LearningSession> = Vec::new();
            for row in sessions.iter()? {
                let (_, value) = row?;
                let session: LearningSession = serde_json::from_slice(value.value())?;
                if session.ended_at.is_none() {
                    half_open.push(session);
                }
            }
            for mut session in half_open {
                warn!(session = session.id, "closing half-open learning session as aborted");
                session.ended_at = Some(Utc::now());
                session.aborted = true;
                let bytes = serde_json::to_vec(&session)?;
                sessions.insert(session.id, bytes.as_slice())?;
            }

            let id = next_id(&mut counters, "sessions")?;
            let session = LearningSession {
                id,
                started_at: Utc::now(),
                ended_at: None,
                aborted: false,
                topics_crawled: 0,
                knowledge_items_added: 0,
                errors_encountered: 0,
            };
            let bytes = serde_json::to_vec(&session)?;
            sessions.insert(id, bytes.as_slice())?;
            id
        };
        txn.commit()?;

        info!(session = id, "learning session started");
        Ok(id)
    }

    /// Additive counter update; concurrent calls compose commutatively.
    pub fn update_learning_session(
        &self,
        session_id: u64,
        topics_crawled_delta: u64,
        knowledge_added_delta: u64,
        errors_delta: u64,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut sessions = txn.open_table(SESSIONS)?;
            let mut session = match sessions.get(session_id)? {
                Some(value) => serde_json::from_slice::<LearningSession>(value.value())?,
                None => return Err(StoreError::SessionNotFound { id: session_id }),
            };
            session.topics_crawled += topics_crawled_delta;
            session.knowledge_items_added += knowledge_added_delta;
            session.errors_encountered += errors_delta;
            let bytes = serde_json::to_vec(&session)?;
            sessions.insert(session_id, bytes.as_slice())?;
        }
        txn.commit()?;

        Ok(())
    }

    pub fn end_learning_session(&self, session_id: u64) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut sessions = txn.open_table(SESSIONS)?;
            let mut session = match sessions.get(session_id)? {
                Some(value) => serde_json::from_slice::<LearningSession>(value.value())?,
                None => return Err(StoreError::SessionNotFound { id: session_id }),
            };
            if session.ended_at.is_none() {
                session.ended_at = Some(Utc::now());
                let bytes = serde_json::to_vec(&session)?;
                sessions.insert(session_id, bytes.as_slice())?;
            }
        }
        txn.commit()?;

        info!(session = session_id, "learning session ended");
        Ok(())
    }

    pub fn get_session_stats(
        &self,
        session_id: u64,
    ) -> Result<Option<LearningSession>, StoreError> {
        let txn = self.db.begin_read()?;
        let sessions = txn.open_table(SESSIONS)?;
        match sessions.get(session_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    pub fn get_database_stats(&self) -> Result<DatabaseStats, StoreError> {
        let cutoff = Utc::now() - Duration::hours(24);
        let txn = self.db.begin_read()?;
        let topics = txn.open_table(TOPICS)?;
        let knowledge = txn.open_table(KNOWLEDGE)?;
        let queries = txn.open_table(USER_QUERIES)?;

        let mut stats = DatabaseStats {
            total_user_queries: queries.len()?,
            ..Default::default()
        };

        for row in topics.iter()? {
            let (_, value) = row?;
            let topic: Topic = serde_json::from_slice(value.value())?;
            stats.total_topics += 1;
            match topic.status {
                TopicStatus::Pending => stats.pending_topics += 1,
                TopicStatus::InProgress => stats.in_progress_topics += 1,
                TopicStatus::Crawled => {
                    stats.crawled_topics += 1;
                    if topic.updated_at >= cutoff {
                        stats.topics_crawled_24h += 1;
                    }
                }
                TopicStatus::NoResults => stats.no_result_topics += 1,
                TopicStatus::Error => stats.error_topics += 1,
            }
        }

        for row in knowledge.iter()? {
            let (_, value) = row?;
            let item: KnowledgeItem = serde_json::from_slice(value.value())?;
            stats.total_knowledge_items += 1;
            if item.learned_at >= cutoff {
                stats.knowledge_added_24h += 1;
            }
        }

        Ok(stats)
    }
}

fn name_key(source: TopicSource, name: &str) -> String {
    format!("{}|{}", source.slug(), normalize_for_match(name))
}

fn next_id(counters: &mut Table<'_, &str, u64>, entity: &str) -> Result<u64, StoreError> {
    let next = counters.get(entity)?.map(|v| v.value()).unwrap_or(1);
    counters.insert(entity, next + 1)?;
    Ok(next)
}
