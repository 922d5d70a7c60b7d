use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use thor_config::{LearnerConfig, RetrievalConfig, SchedulerConfig};
use thor_retrieve::Candidate;
use thor_retrieve::adapters::AdapterKind;
use thor_store::{KnowledgeStore, NewTopic, TopicSource, TopicStatus};

use crate::scheduler::{TopicScheduler, guess_category};
use crate::{KnowledgeSearch, Learner, SearchOptions, TopicResearcher};

fn open_store() -> (TempDir, Arc<KnowledgeStore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = KnowledgeStore::open(dir.path().join("knowledge.redb")).expect("open store");
    (dir, Arc::new(store))
}

fn quick_config(workers: usize) -> LearnerConfig {
    LearnerConfig {
        workers,
        search_interval_secs: 1,
        shutdown_grace_secs: 5,
        stale_claim_secs: 900,
        ..Default::default()
    }
}

fn candidate(title: &str, content: &str, adapter: AdapterKind) -> Candidate {
    Candidate {
        title: title.to_string(),
        content: content.to_string(),
        adapter,
        url: None,
        confidence: adapter.base_confidence(),
        published_at: None,
        fingerprint: thor_normalize::fingerprint(title, content, adapter.slug()),
        adapter_rank: 0,
    }
}

/// Returns exactly one knowledge item per researched topic.
struct SingleItemResearcher;

#[async_trait]
impl TopicResearcher for SingleItemResearcher {
    async fn research(&self, topic: &str) -> Result<Vec<Candidate>> {
        Ok(vec![candidate(
            &format!("{topic} overview"),
            &format!("A concise factual summary of {topic} with enough body to be stored."),
            AdapterKind::Encyclopedia,
        )])
    }
}

struct EmptyResearcher;

#[async_trait]
impl TopicResearcher for EmptyResearcher {
    async fn research(&self, _topic: &str) -> Result<Vec<Candidate>> {
        Ok(Vec::new())
    }
}

struct FailingResearcher;

#[async_trait]
impl TopicResearcher for FailingResearcher {
    async fn research(&self, _topic: &str) -> Result<Vec<Candidate>> {
        anyhow::bail!("engine down")
    }
}

async fn wait_until(deadline_secs: u64, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(deadline_secs);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached before deadline"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

#[test]
fn bucket_weights_converge_to_configuration() {
    let (_dir, store) = open_store();
    let config = SchedulerConfig::default();
    let scheduler = TopicScheduler::new(store, config.clone());

    let mut rng = StdRng::seed_from_u64(7);
    let mut counts: HashMap<TopicSource, usize> = HashMap::new();
    let draws = 10_000;
    for _ in 0..draws {
        let roll: f64 = rng.random();
        *counts.entry(scheduler.pick_bucket(roll)).or_default() += 1;
    }

    let fraction = |source: TopicSource| {
        *counts.get(&source).unwrap_or(&0) as f64 / draws as f64
    };
    assert!((fraction(TopicSource::Dictionary) - config.dictionary_weight).abs() < 0.03);
    assert!((fraction(TopicSource::UserQuery) - config.user_query_weight).abs() < 0.03);
    assert!((fraction(TopicSource::Trending) - config.trending_weight).abs() < 0.03);
    assert!((fraction(TopicSource::Discovered) - config.discovered_weight).abs() < 0.03);
}

#[tokio::test]
async fn user_feedback_promotes_topics_into_the_user_bucket() {
    let (_dir, store) = open_store();
    store
        .record_user_query(
            "how to center a div",
            &["center a div".to_string()],
            false,
            true,
        )
        .unwrap();

    let scheduler = TopicScheduler::new(Arc::clone(&store), SchedulerConfig::default());
    let claimed = scheduler
        .claim_from_bucket(TopicSource::UserQuery)
        .await
        .unwrap()
        .expect("user-query topic should be promoted and claimed");

    assert_eq!(claimed.name, "center a div");
    assert_eq!(claimed.source, TopicSource::UserQuery);
    assert_eq!(claimed.priority, 8);
    assert_eq!(claimed.status, TopicStatus::InProgress);
}

#[tokio::test]
async fn dry_bucket_falls_through_to_any_source() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[NewTopic::new("graph theory", TopicSource::Dictionary)])
        .unwrap();

    let scheduler = TopicScheduler::new(Arc::clone(&store), SchedulerConfig::default());
    let claimed = scheduler
        .claim_from_bucket(TopicSource::Trending)
        .await
        .unwrap()
        .expect("fallback claim should find the dictionary topic");
    assert_eq!(claimed.source, TopicSource::Dictionary);
}

#[test]
fn dictionary_seeding_is_idempotent_and_categorized() {
    let (dir, store) = open_store();
    let scheduler = TopicScheduler::new(Arc::clone(&store), SchedulerConfig::default());

    let path = dir.path().join("dictionary.json");
    std::fs::write(
        &path,
        r#"{"topics": ["rust programming code", "baroque music"], "categories": {"arts": ["baroque music"]}}"#,
    )
    .unwrap();

    let (added, existing) = scheduler.seed_dictionary(&path).unwrap();
    assert_eq!((added, existing), (2, 0));
    let (added, existing) = scheduler.seed_dictionary(&path).unwrap();
    assert_eq!((added, existing), (0, 2));

    let pending = store.topics_with_status(TopicStatus::Pending).unwrap();
    let by_name: HashMap<&str, &str> = pending
        .iter()
        .map(|t| (t.name.as_str(), t.category.as_deref().unwrap_or("")))
        .collect();
    assert_eq!(by_name["rust programming code"], "programming");
    assert_eq!(by_name["baroque music"], "arts");
}

#[test]
fn missing_dictionary_falls_back_to_builtin_seed() {
    let (dir, store) = open_store();
    let scheduler = TopicScheduler::new(Arc::clone(&store), SchedulerConfig::default());

    let (added, _) = scheduler
        .seed_dictionary(&dir.path().join("does-not-exist.json"))
        .unwrap();
    assert!(added > 0, "built-in seed list should load");
}

#[test]
fn category_heuristics_cover_the_vocabulary() {
    assert_eq!(guess_category("sorting algorithm design"), "programming");
    assert_eq!(guess_category("the roman empire"), "history");
    assert_eq!(guess_category("linear algebra basics"), "mathematics");
    assert_eq!(guess_category("dna replication"), "biology");
    assert_eq!(guess_category("supply and demand"), "economics");
    assert_eq!(guess_category("completely unclassifiable thing"), "general");
}

// ── Learner lifecycle ─────────────────────────────────────────────────────────

#[tokio::test]
async fn seeded_learner_crawls_every_topic_once() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[
            NewTopic::new("quantum computing", TopicSource::Dictionary),
            NewTopic::new("python programming", TopicSource::Dictionary),
        ])
        .unwrap();

    let scheduler = Arc::new(TopicScheduler::new(
        Arc::clone(&store),
        SchedulerConfig::default(),
    ));
    let learner = Learner::new(
        Arc::clone(&store),
        scheduler,
        Arc::new(SingleItemResearcher),
        quick_config(1),
    );

    learner.start().await.unwrap();
    wait_until(10, || {
        store.get_database_stats().unwrap().crawled_topics == 2
    })
    .await;
    learner.stop().await.unwrap();

    let stats = store.get_database_stats().unwrap();
    assert_eq!(stats.crawled_topics, 2);
    assert_eq!(stats.total_knowledge_items, 2);

    let session = store.get_session_stats(1).unwrap().unwrap();
    assert_eq!(session.topics_crawled, 2);
    assert_eq!(session.knowledge_items_added, 2);
    assert_eq!(session.errors_encountered, 0);
    assert!(session.ended_at.is_some());
    assert!(!session.aborted);
}

#[tokio::test]
async fn empty_results_mark_topics_no_results() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[NewTopic::new("obscure topic", TopicSource::Dictionary)])
        .unwrap();

    let scheduler = Arc::new(TopicScheduler::new(
        Arc::clone(&store),
        SchedulerConfig::default(),
    ));
    let learner = Learner::new(
        Arc::clone(&store),
        scheduler,
        Arc::new(EmptyResearcher),
        quick_config(1),
    );

    learner.start().await.unwrap();
    wait_until(10, || {
        store.get_database_stats().unwrap().no_result_topics == 1
    })
    .await;
    learner.stop().await.unwrap();

    let session = store.get_session_stats(1).unwrap().unwrap();
    assert_eq!(session.topics_crawled, 0);
    assert_eq!(session.errors_encountered, 0);
}

#[tokio::test]
async fn research_failures_mark_topics_and_count_errors() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[NewTopic::new("flaky topic", TopicSource::Dictionary)])
        .unwrap();

    let scheduler = Arc::new(TopicScheduler::new(
        Arc::clone(&store),
        SchedulerConfig::default(),
    ));
    let learner = Learner::new(
        Arc::clone(&store),
        scheduler,
        Arc::new(FailingResearcher),
        quick_config(1),
    );

    learner.start().await.unwrap();
    wait_until(10, || {
        store.get_database_stats().unwrap().error_topics == 1
    })
    .await;
    learner.stop().await.unwrap();

    let topic = store.get_topic(1).unwrap().unwrap();
    assert_eq!(topic.status, TopicStatus::Error);
    assert!(topic.last_error.as_deref().unwrap_or("").contains("engine down"));

    let session = store.get_session_stats(1).unwrap().unwrap();
    assert!(session.errors_encountered >= 1);
}

#[tokio::test]
async fn stop_halts_all_writes() {
    let (_dir, store) = open_store();
    let batch: Vec<NewTopic> = (0..50)
        .map(|i| NewTopic::new(format!("topic {i}"), TopicSource::Dictionary))
        .collect();
    store.add_topics_batch(&batch).unwrap();

    let scheduler = Arc::new(TopicScheduler::new(
        Arc::clone(&store),
        SchedulerConfig::default(),
    ));
    let learner = Learner::new(
        Arc::clone(&store),
        scheduler,
        Arc::new(SingleItemResearcher),
        quick_config(2),
    );

    learner.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    learner.stop().await.unwrap();

    let before = store.get_database_stats().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let after = store.get_database_stats().unwrap();

    assert_eq!(before.total_knowledge_items, after.total_knowledge_items);
    assert_eq!(before.crawled_topics, after.crawled_topics);
    assert_eq!(before.in_progress_topics, 0, "in-flight work drained on stop");
}

#[tokio::test]
async fn startup_sweep_recovers_abandoned_claims() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[
            NewTopic::new("one", TopicSource::Dictionary),
            NewTopic::new("two", TopicSource::Dictionary),
        ])
        .unwrap();
    // Simulate a killed process: claims with no worker behind them.
    store.claim_next_topic(None).unwrap().unwrap();
    store.claim_next_topic(None).unwrap().unwrap();

    let scheduler = Arc::new(TopicScheduler::new(
        Arc::clone(&store),
        SchedulerConfig::default(),
    ));
    let config = LearnerConfig {
        workers: 0,
        stale_claim_secs: 0,
        ..quick_config(0)
    };
    let learner = Learner::new(
        Arc::clone(&store),
        scheduler,
        Arc::new(SingleItemResearcher),
        config,
    );

    learner.start().await.unwrap();
    assert_eq!(store.topics_with_status(TopicStatus::Pending).unwrap().len(), 2);

    let session = store.get_session_stats(1).unwrap().unwrap();
    assert_eq!(session.errors_encountered, 0);
    learner.stop().await.unwrap();
}

#[tokio::test]
async fn start_is_exclusive_and_stop_is_idempotent() {
    let (_dir, store) = open_store();
    let scheduler = Arc::new(TopicScheduler::new(
        Arc::clone(&store),
        SchedulerConfig::default(),
    ));
    let learner = Learner::new(
        Arc::clone(&store),
        scheduler,
        Arc::new(EmptyResearcher),
        quick_config(1),
    );

    learner.start().await.unwrap();
    assert!(learner.start().await.is_err(), "double start must fail");

    learner.pause();
    assert!(learner.is_paused());
    learner.resume();
    assert!(!learner.is_paused());

    learner.stop().await.unwrap();
    learner.stop().await.unwrap();
    assert!(!learner.is_running().await);
}

// ── Read-side search ──────────────────────────────────────────────────────────

#[tokio::test]
async fn knowledge_search_is_pure_read_and_ranked() {
    let (_dir, store) = open_store();
    store
        .add_topics_batch(&[NewTopic::new("transport protocols", TopicSource::Dictionary)])
        .unwrap();
    store
        .add_knowledge_batch(&[
            candidate(
                "TCP",
                "TCP is a reliable connection-oriented transport protocol.",
                AdapterKind::Bing,
            )
            .into_new_knowledge(1),
            candidate(
                "Baking",
                "Bread rises when yeast ferments sugars in the dough.",
                AdapterKind::Google,
            )
            .into_new_knowledge(1),
        ])
        .unwrap();

    let search = KnowledgeSearch::new(Arc::clone(&store), RetrievalConfig::default());
    let before = store.get_database_stats().unwrap();

    let results = search
        .search("tcp transport protocol", &SearchOptions::default())
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].title, "TCP");

    let after = store.get_database_stats().unwrap();
    assert_eq!(before.total_knowledge_items, after.total_knowledge_items);
    assert_eq!(before.total_topics, after.total_topics);
}
