use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use tempfile::TempDir;

use crate::{
    KnowledgeStore, NewKnowledge, NewTopic, StoreError, TopicSource, TopicStatus,
};

fn open_store() -> (TempDir, KnowledgeStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = KnowledgeStore::open(dir.path().join("knowledge.redb")).expect("open store");
    (dir, store)
}

fn knowledge(topic_id: u64, title: &str, content: &str, adapter: &str) -> NewKnowledge {
    NewKnowledge {
        topic_id,
        title: title.to_string(),
        content: content.to_string(),
        source_adapter: adapter.to_string(),
        url: None,
        confidence: 0.7,
        fingerprint: thor_normalize::fingerprint(title, content, adapter),
        published_at: None,
    }
}

#[test]
fn topic_upsert_is_idempotent() {
    let (_dir, store) = open_store();
    let batch = vec![
        NewTopic::new("Quantum Computing", TopicSource::Dictionary),
        NewTopic::new("Python Programming", TopicSource::Dictionary),
    ];

    let (added, existing) = store.add_topics_batch(&batch).unwrap();
    assert_eq!((added, existing), (2, 0));

    let (added, existing) = store.add_topics_batch(&batch).unwrap();
    assert_eq!((added, existing), (0, 2));

    // Case-insensitive collapse on (name, source).
    let (added, existing) = store
        .add_topics_batch(&[NewTopic::new("quantum computing", TopicSource::Dictionary)])
        .unwrap();
    assert_eq!((added, existing), (0, 1));

    // Same name under another source is a distinct topic.
    let (added, _) = store
        .add_topics_batch(&[NewTopic::new("quantum computing", TopicSource::UserQuery)])
        .unwrap();
    assert_eq!(added, 1);

    assert_eq!(store.get_database_stats().unwrap().total_topics, 3);
}

#[test]
fn claim_orders_by_priority_then_age_then_id() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[
            NewTopic::new("low", TopicSource::Dictionary).with_priority(1),
            NewTopic::new("high", TopicSource::Dictionary).with_priority(9),
            NewTopic::new("also high", TopicSource::Dictionary).with_priority(9),
        ])
        .unwrap();

    let first = store.claim_next_topic(None).unwrap().unwrap();
    assert_eq!(first.name, "high");
    assert_eq!(first.status, TopicStatus::InProgress);
    assert_eq!(first.attempts, 1);

    // Equal priority: earlier created_at (and smaller id) wins.
    let second = store.claim_next_topic(None).unwrap().unwrap();
    assert_eq!(second.name, "also high");

    let third = store.claim_next_topic(None).unwrap().unwrap();
    assert_eq!(third.name, "low");

    assert!(store.claim_next_topic(None).unwrap().is_none());
}

#[test]
fn concurrent_claims_never_hand_out_the_same_topic() {
    let (_dir, store) = open_store();
    let batch: Vec<NewTopic> = (0..16)
        .map(|i| NewTopic::new(format!("topic {i}"), TopicSource::Dictionary))
        .collect();
    store.add_topics_batch(&batch).unwrap();

    let store = Arc::new(store);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            let mut claimed = Vec::new();
            while let Some(topic) = store.claim_next_topic(None).unwrap() {
                claimed.push(topic.id);
            }
            claimed
        }));
    }

    let mut all: Vec<u64> = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }
    let unique: HashSet<u64> = all.iter().copied().collect();
    assert_eq!(all.len(), 16, "every topic claimed exactly once");
    assert_eq!(unique.len(), 16, "no topic handed out twice");
}

#[test]
fn status_update_requires_in_progress() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[NewTopic::new("rust", TopicSource::Dictionary)])
        .unwrap();

    let topic_id = 1;
    let err = store
        .update_topic_status(topic_id, TopicStatus::Crawled, None, None)
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    let claimed = store.claim_next_topic(None).unwrap().unwrap();
    store
        .update_topic_status(claimed.id, TopicStatus::Crawled, Some(3), None)
        .unwrap();

    let topic = store.get_topic(claimed.id).unwrap().unwrap();
    assert_eq!(topic.status, TopicStatus::Crawled);
    assert_eq!(topic.knowledge_count, 3);
}

#[test]
fn knowledge_dedupes_on_fingerprint() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[NewTopic::new("tcp", TopicSource::Dictionary)])
        .unwrap();

    let item = knowledge(1, "TCP Overview", "TCP is a reliable transport protocol.", "bing");
    // Identical normalized title + content head from the same adapter.
    let twin = knowledge(1, "tcp overview", "TCP is a   reliable transport protocol.", "bing");
    let other_engine = knowledge(1, "TCP Overview", "TCP is a reliable transport protocol.", "google");

    let (successful, duplicates) = store
        .add_knowledge_batch(&[item, twin, other_engine])
        .unwrap();
    assert_eq!(successful, 2, "twin collapses, other adapter survives");
    assert_eq!(duplicates, 1);

    let stored = store.knowledge_for_topic(1).unwrap();
    assert_eq!(stored.len(), 2);

    let topic = store.get_topic(1).unwrap().unwrap();
    assert_eq!(topic.knowledge_count, 2);
}

#[test]
fn knowledge_insert_rejects_unknown_topic() {
    let (_dir, store) = open_store();
    let err = store
        .add_knowledge_batch(&[knowledge(42, "t", "c", "bing")])
        .unwrap_err();
    assert!(matches!(err, StoreError::TopicNotFound { id: 42 }));
}

#[test]
fn stale_claims_flip_back_to_pending() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[
            NewTopic::new("one", TopicSource::Dictionary),
            NewTopic::new("two", TopicSource::Dictionary),
        ])
        .unwrap();
    store.claim_next_topic(None).unwrap().unwrap();
    store.claim_next_topic(None).unwrap().unwrap();

    // Zero timeout: everything in_progress counts as abandoned.
    let recovered = store.recover_stale_claims(Duration::zero()).unwrap();
    assert_eq!(recovered, 2);
    assert_eq!(store.topics_with_status(TopicStatus::Pending).unwrap().len(), 2);

    // Fresh claims survive a sweep with a real timeout.
    store.claim_next_topic(None).unwrap().unwrap();
    let recovered = store.recover_stale_claims(Duration::minutes(15)).unwrap();
    assert_eq!(recovered, 0);
}

#[test]
fn errored_topics_requeue_until_attempt_cap() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[NewTopic::new("flaky", TopicSource::Dictionary)])
        .unwrap();

    for attempt in 1..=3 {
        let claimed = store.claim_next_topic(None).unwrap().unwrap();
        assert_eq!(claimed.attempts, attempt);
        store
            .update_topic_status(claimed.id, TopicStatus::Error, None, Some("engine down"))
            .unwrap();
        store.requeue_errored_topics(3, Duration::zero()).unwrap();
    }

    // Attempt cap reached: the topic stays terminal but visible.
    let requeued = store.requeue_errored_topics(3, Duration::zero()).unwrap();
    assert_eq!(requeued, 0);
    let topic = store.get_topic(1).unwrap().unwrap();
    assert_eq!(topic.status, TopicStatus::Error);
    assert_eq!(topic.last_error.as_deref(), Some("engine down"));
}

#[test]
fn sessions_abort_half_open_and_count_monotonically() {
    let (_dir, store) = open_store();

    let first = store.start_learning_session().unwrap();
    store.update_learning_session(first, 1, 4, 0).unwrap();
    store.update_learning_session(first, 1, 2, 1).unwrap();

    let stats = store.get_session_stats(first).unwrap().unwrap();
    assert_eq!(stats.topics_crawled, 2);
    assert_eq!(stats.knowledge_items_added, 6);
    assert_eq!(stats.errors_encountered, 1);
    assert!(stats.ended_at.is_none());

    // Simulated crash: a new session closes the half-open one as aborted.
    let second = store.start_learning_session().unwrap();
    assert_ne!(first, second);
    let old = store.get_session_stats(first).unwrap().unwrap();
    assert!(old.ended_at.is_some());
    assert!(old.aborted);
    let fresh = store.get_session_stats(second).unwrap().unwrap();
    assert_eq!(fresh.errors_encountered, 0);

    store.end_learning_session(second).unwrap();
    let closed = store.get_session_stats(second).unwrap().unwrap();
    assert!(closed.ended_at.is_some());
    assert!(!closed.aborted);
}

#[test]
fn unanswered_queries_surface_until_crawled() {
    let (_dir, store) = open_store();

    store
        .record_user_query(
            "how to center a div",
            &["center a div".to_string()],
            false,
            true,
        )
        .unwrap();
    store
        .record_user_query("what is rust", &["rust".to_string()], true, false)
        .unwrap();

    let unanswered = store.get_unanswered_topics(10).unwrap();
    assert_eq!(unanswered, vec!["center a div".to_string()]);

    // Once a topic of that name is crawled it stops surfacing.
    store
        .add_topics_batch(&[NewTopic::new("center a div", TopicSource::UserQuery)])
        .unwrap();
    let claimed = store.claim_next_topic(None).unwrap().unwrap();
    store
        .update_topic_status(claimed.id, TopicStatus::Crawled, Some(1), None)
        .unwrap();

    assert!(store.get_unanswered_topics(10).unwrap().is_empty());
}

#[test]
fn related_topic_edges_are_idempotent_and_promote() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[NewTopic::new("http", TopicSource::Dictionary)])
        .unwrap();

    assert!(store.add_related_topic(1, "transport layer security").unwrap());
    assert!(!store.add_related_topic(1, "Transport Layer Security").unwrap());

    let edges = store.related_topics_for(1).unwrap();
    assert_eq!(edges.len(), 1);

    let discovered = store
        .claim_next_topic(Some(TopicSource::Discovered))
        .unwrap()
        .unwrap();
    assert_eq!(discovered.name, "transport layer security");
    assert_eq!(discovered.priority, TopicSource::Discovered.default_priority());
}

#[test]
fn find_candidates_filters_by_keyword() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[NewTopic::new("protocols", TopicSource::Dictionary)])
        .unwrap();
    store
        .add_knowledge_batch(&[
            knowledge(1, "TCP", "TCP is a connection-oriented transport protocol.", "bing"),
            knowledge(1, "Gardening", "Tomatoes grow best in full sun with rich soil.", "bing"),
        ])
        .unwrap();

    let hits = store.find_candidates("tcp transport", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "TCP");

    assert!(store.find_candidates("", 10).unwrap().is_empty());
}

#[test]
fn knowledge_read_cache_counts_hits() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[NewTopic::new("cacheable", TopicSource::Dictionary)])
        .unwrap();
    store
        .add_knowledge_batch(&[knowledge(1, "a", "some cached body text for the topic.", "bing")])
        .unwrap();

    store.knowledge_for_topic(1).unwrap();
    store.knowledge_for_topic(1).unwrap();

    let stats = store.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);

    // A write to the topic invalidates its cache entry.
    store
        .add_knowledge_batch(&[knowledge(1, "b", "another body long enough to store fine.", "bing")])
        .unwrap();
    let items = store.knowledge_for_topic(1).unwrap();
    assert_eq!(items.len(), 2);
}

#[test]
fn database_stats_cover_totals_and_window() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[
            NewTopic::new("a", TopicSource::Dictionary),
            NewTopic::new("b", TopicSource::Dictionary),
        ])
        .unwrap();
    let claimed = store.claim_next_topic(None).unwrap().unwrap();
    store
        .add_knowledge_batch(&[knowledge(claimed.id, "t", "fresh body for stats window.", "bing")])
        .unwrap();
    store
        .update_topic_status(claimed.id, TopicStatus::Crawled, None, None)
        .unwrap();

    let stats = store.get_database_stats().unwrap();
    assert_eq!(stats.total_topics, 2);
    assert_eq!(stats.crawled_topics, 1);
    assert_eq!(stats.pending_topics, 1);
    assert_eq!(stats.total_knowledge_items, 1);
    assert_eq!(stats.knowledge_added_24h, 1);
    assert_eq!(stats.topics_crawled_24h, 1);
}
