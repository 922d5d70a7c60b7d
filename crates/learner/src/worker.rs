//! The crawl loop run by each member of the worker pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use thor_config::LearnerConfig;
use thor_store::{KnowledgeStore, NewKnowledge, StoreError, Topic, TopicStatus};

use crate::related::extract_related_topics;
use crate::researcher::TopicResearcher;
use crate::scheduler::TopicScheduler;

/// Related-topic extraction is capped per crawled topic.
const RELATED_TOPICS_CAP: usize = 5;

/// Bounded attempts for contended store writes.
const STORE_WRITE_ATTEMPTS: u32 = 3;

/// Flags shared between the controller and every worker.
pub(crate) struct SharedState {
    pub paused: AtomicBool,
    /// Consecutive loop-level failures (scheduler/store breakage), not
    /// per-topic crawl errors.
    pub consecutive_errors: AtomicU32,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            consecutive_errors: AtomicU32::new(0),
        }
    }
}

pub(crate) struct WorkerContext {
    pub id: usize,
    pub store: Arc<KnowledgeStore>,
    pub scheduler: Arc<TopicScheduler>,
    pub researcher: Arc<dyn TopicResearcher>,
    pub session_id: u64,
    pub shared: Arc<SharedState>,
    pub config: LearnerConfig,
}

pub(crate) async fn run_worker(ctx: WorkerContext, mut shutdown: watch::Receiver<bool>) {
    debug!(worker = ctx.id, "worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        if ctx.shared.paused.load(Ordering::Relaxed) {
            if interruptible_sleep(&mut shutdown, Duration::from_millis(250)).await {
                break;
            }
            continue;
        }

        match ctx.scheduler.next_topic().await {
            Ok(Some(topic)) => {
                ctx.shared.consecutive_errors.store(0, Ordering::Relaxed);
                crawl_topic(&ctx, &topic).await;
            }
            Ok(None) => {
                let idle = Duration::from_secs(ctx.config.search_interval_secs);
                if interruptible_sleep(&mut shutdown, idle).await {
                    break;
                }
            }
            Err(err) => {
                let errors = ctx.shared.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(worker = ctx.id, error = %err, errors, "scheduling failed");
                let delay = backoff_delay(errors, ctx.config.max_consecutive_errors);
                if interruptible_sleep(&mut shutdown, delay).await {
                    break;
                }
            }
        }
    }

    debug!(worker = ctx.id, "worker exited");
}

/// Research one claimed topic and record the outcome.  Per-topic failures
/// end in an `error` status and a session error tick; they never take the
/// worker down.
async fn crawl_topic(ctx: &WorkerContext, topic: &Topic) {
    debug!(worker = ctx.id, topic = %topic.name, source = %topic.source, "researching");

    let candidates = match ctx.researcher.research(&topic.name).await {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(worker = ctx.id, topic = %topic.name, error = %err, "research failed");
            record_topic_error(ctx, topic, &err.to_string()).await;
            return;
        }
    };

    if candidates.is_empty() {
        debug!(worker = ctx.id, topic = %topic.name, "no results");
        if let Err(err) = with_store_retries(|| {
            ctx.store
                .update_topic_status(topic.id, TopicStatus::NoResults, None, None)
        })
        .await
        {
            warn!(topic = %topic.name, error = %err, "recording no_results failed");
        }
        return;
    }

    // Gather related names before the candidates are consumed by storage.
    let combined: String = candidates
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let related = extract_related_topics(&combined, RELATED_TOPICS_CAP);

    let items: Vec<NewKnowledge> = candidates
        .into_iter()
        .map(|c| c.into_new_knowledge(topic.id))
        .collect();

    let stored = with_store_retries(|| ctx.store.add_knowledge_batch(&items)).await;
    let (successful, duplicates) = match stored {
        Ok(counts) => counts,
        Err(err) => {
            warn!(worker = ctx.id, topic = %topic.name, error = %err, "storing knowledge failed");
            record_topic_error(ctx, topic, &err.to_string()).await;
            return;
        }
    };

    let finished = with_store_retries(|| {
        ctx.store
            .update_topic_status(topic.id, TopicStatus::Crawled, None, None)
    })
    .await;
    if let Err(err) = finished {
        warn!(topic = %topic.name, error = %err, "marking topic crawled failed");
        return;
    }

    if let Err(err) = with_store_retries(|| {
        ctx.store
            .update_learning_session(ctx.session_id, 1, successful as u64, 0)
    })
    .await
    {
        warn!(error = %err, "session counter update failed");
    }

    for name in &related {
        if let Err(err) = ctx.store.add_related_topic(topic.id, name) {
            debug!(topic = %topic.name, related = %name, error = %err, "related-topic insert failed");
        }
    }

    info!(
        worker = ctx.id,
        topic = %topic.name,
        source = %topic.source,
        stored = successful,
        duplicates,
        related = related.len(),
        "topic crawled"
    );
}

async fn record_topic_error(ctx: &WorkerContext, topic: &Topic, message: &str) {
    let result = with_store_retries(|| {
        ctx.store
            .update_topic_status(topic.id, TopicStatus::Error, None, Some(message))
    })
    .await;
    if let Err(err) = result {
        warn!(topic = %topic.name, error = %err, "recording topic error failed");
    }
    if let Err(err) =
        with_store_retries(|| ctx.store.update_learning_session(ctx.session_id, 0, 0, 1)).await
    {
        warn!(error = %err, "session error counter update failed");
    }
}

/// Retry contended store writes a bounded number of times.
async fn with_store_retries<T>(
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retriable() && attempt + 1 < STORE_WRITE_ATTEMPTS => {
                attempt += 1;
                debug!(attempt, error = %err, "retrying store write");
                tokio::time::sleep(Duration::from_millis(50 << attempt)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Loop-level error backoff: short pause below the threshold, capped
/// exponential climb past it.
pub(crate) fn backoff_delay(consecutive_errors: u32, threshold: u32) -> Duration {
    if consecutive_errors < threshold {
        return Duration::from_secs(5);
    }
    let exponent = (consecutive_errors - threshold).min(16);
    let secs = (60u64 << exponent).min(300);
    Duration::from_secs(secs)
}

/// Sleep for `duration`, returning true early if shutdown fires.
pub(crate) async fn interruptible_sleep(
    shutdown: &mut watch::Receiver<bool>,
    duration: Duration,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        result = shutdown.changed() => result.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_flat_below_threshold_and_capped_above() {
        assert_eq!(backoff_delay(1, 5), Duration::from_secs(5));
        assert_eq!(backoff_delay(4, 5), Duration::from_secs(5));
        assert_eq!(backoff_delay(5, 5), Duration::from_secs(60));
        assert_eq!(backoff_delay(6, 5), Duration::from_secs(120));
        assert_eq!(backoff_delay(7, 5), Duration::from_secs(240));
        assert_eq!(backoff_delay(8, 5), Duration::from_secs(300));
        assert_eq!(backoff_delay(50, 5), Duration::from_secs(300));
    }
}
