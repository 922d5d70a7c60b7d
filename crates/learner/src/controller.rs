//! Lifecycle controller: owns the worker pool, the learning-session
//! record, pause/resume flags, and the periodic status task.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use thor_config::LearnerConfig;
use thor_store::{DatabaseStats, KnowledgeStore};

use crate::researcher::TopicResearcher;
use crate::scheduler::TopicScheduler;
use crate::worker::{SharedState, WorkerContext, run_worker};

/// Cadence of the throughput log line, the status file refresh, and the
/// errored-topic requeue sweep.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Option<u64>,
    pub running: bool,
    pub paused: bool,
    pub consecutive_errors: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearnerStats {
    pub database: DatabaseStats,
    pub session: SessionSnapshot,
}

#[derive(Default)]
struct RunState {
    session_id: Option<u64>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
    status_task: Option<JoinHandle<()>>,
}

pub struct Learner {
    store: Arc<KnowledgeStore>,
    scheduler: Arc<TopicScheduler>,
    researcher: Arc<dyn TopicResearcher>,
    config: LearnerConfig,
    shared: Arc<SharedState>,
    status_file: Option<PathBuf>,
    state: Mutex<RunState>,
}

impl Learner {
    pub fn new(
        store: Arc<KnowledgeStore>,
        scheduler: Arc<TopicScheduler>,
        researcher: Arc<dyn TopicResearcher>,
        config: LearnerConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            researcher,
            config,
            shared: Arc::new(SharedState::new()),
            status_file: None,
            state: Mutex::new(RunState::default()),
        }
    }

    /// Periodically mirror [`Learner::stats`] into a JSON file so an
    /// operator process can read status without opening the store.
    pub fn with_status_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_file = Some(path.into());
        self
    }

    /// Sweep abandoned claims, open a learning session, and launch the
    /// worker pool.  Errors if already running.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.shutdown.is_some() {
            bail!("learner is already running");
        }

        let recovered = self
            .store
            .recover_stale_claims(chrono::Duration::seconds(self.config.stale_claim_secs as i64))?;
        let session_id = self.store.start_learning_session()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shared.paused.store(false, Ordering::Relaxed);
        self.shared.consecutive_errors.store(0, Ordering::Relaxed);

        let mut workers = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let ctx = WorkerContext {
                id,
                store: Arc::clone(&self.store),
                scheduler: Arc::clone(&self.scheduler),
                researcher: Arc::clone(&self.researcher),
                session_id,
                shared: Arc::clone(&self.shared),
                config: self.config.clone(),
            };
            workers.push(tokio::spawn(run_worker(ctx, shutdown_rx.clone())));
        }

        state.status_task = Some(self.spawn_status_task(session_id, shutdown_rx));
        state.session_id = Some(session_id);
        state.workers = workers;
        state.shutdown = Some(shutdown_tx);

        info!(
            session = session_id,
            workers = self.config.workers,
            recovered_claims = recovered,
            "learner started"
        );
        Ok(())
    }

    /// Workers finish their in-flight topic and then idle; no task is
    /// canceled.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Relaxed);
        info!("learner paused");
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Relaxed);
        info!("learner resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.shutdown.is_some()
    }

    /// Signal all workers, wait out the shutdown grace period, abort
    /// stragglers, and close the session.  Idempotent.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(shutdown_tx) = state.shutdown.take() else {
            return Ok(());
        };
        let _ = shutdown_tx.send(true);

        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_grace_secs);
        for mut handle in state.workers.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                warn!("worker exceeded shutdown grace, aborting");
                handle.abort();
            }
        }

        if let Some(task) = state.status_task.take() {
            task.abort();
        }

        if let Some(session_id) = state.session_id.take() {
            self.store.end_learning_session(session_id)?;
            if let Some(session) = self.store.get_session_stats(session_id)? {
                info!(
                    session = session_id,
                    topics_crawled = session.topics_crawled,
                    knowledge_items_added = session.knowledge_items_added,
                    errors = session.errors_encountered,
                    "learner stopped"
                );
            }
        }
        Ok(())
    }

    pub async fn stats(&self) -> Result<LearnerStats> {
        let state = self.state.lock().await;
        Ok(LearnerStats {
            database: self.store.get_database_stats()?,
            session: SessionSnapshot {
                id: state.session_id,
                running: state.shutdown.is_some(),
                paused: self.is_paused(),
                consecutive_errors: self.shared.consecutive_errors.load(Ordering::Relaxed),
            },
        })
    }

    /// Feedback entry point for the surrounding application.
    pub fn record_user_query(
        &self,
        query: &str,
        extracted_topics: &[String],
        knowledge_was_found: bool,
        needs_research: bool,
    ) -> Result<()> {
        self.store
            .record_user_query(query, extracted_topics, knowledge_was_found, needs_research)?;
        Ok(())
    }

    fn spawn_status_task(
        &self,
        session_id: u64,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let shared = Arc::clone(&self.shared);
        let status_file = self.status_file.clone();
        let max_attempts = self.config.max_topic_attempts;
        let retry_base = chrono::Duration::seconds(self.config.topic_retry_base_secs as i64);

        tokio::spawn(async move {
            loop {
                if let Err(err) = store.requeue_errored_topics(max_attempts, retry_base) {
                    warn!(error = %err, "errored-topic requeue sweep failed");
                }

                match store.get_database_stats() {
                    Ok(stats) => {
                        info!(
                            knowledge = stats.total_knowledge_items,
                            topics = stats.total_topics,
                            added_24h = stats.knowledge_added_24h,
                            crawled_24h = stats.topics_crawled_24h,
                            "throughput"
                        );
                        if let Some(path) = &status_file {
                            let snapshot = LearnerStats {
                                database: stats,
                                session: SessionSnapshot {
                                    id: Some(session_id),
                                    running: true,
                                    paused: shared.paused.load(Ordering::Relaxed),
                                    consecutive_errors: shared
                                        .consecutive_errors
                                        .load(Ordering::Relaxed),
                                },
                            };
                            if let Err(err) = write_status_file(path, &snapshot) {
                                warn!(error = %err, path = %path.display(), "status file write failed");
                            }
                        }
                    }
                    Err(err) => warn!(error = %err, "stats collection failed"),
                }

                let stopped = tokio::select! {
                    _ = tokio::time::sleep(STATUS_INTERVAL) => false,
                    result = shutdown.changed() => result.is_err() || *shutdown.borrow(),
                };
                if stopped {
                    break;
                }
            }
        })
    }
}

fn write_status_file(path: &std::path::Path, stats: &LearnerStats) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = serde_json::to_string_pretty(stats)?;
    std::fs::write(path, rendered)?;
    Ok(())
}
