//! Per-source politeness gate.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::adapters::AdapterKind;

/// Enforces a minimum interval between consecutive requests to the same
/// source across all workers.
///
/// [`RateLimiter::acquire`] blocks until the interval since the last
/// successful acquire on the same key has elapsed.  Cancellation is
/// dropping the future; no slot is consumed in that case.
pub struct RateLimiter {
    min_interval: Duration,
    overrides: HashMap<AdapterKind, Duration>,
    last: Mutex<HashMap<AdapterKind, Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            overrides: HashMap::new(),
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Override the interval for one source (e.g. a stricter upstream).
    pub fn with_interval(mut self, kind: AdapterKind, interval: Duration) -> Self {
        self.overrides.insert(kind, interval);
        self
    }

    fn interval_for(&self, kind: AdapterKind) -> Duration {
        self.overrides.get(&kind).copied().unwrap_or(self.min_interval)
    }

    pub async fn acquire(&self, kind: AdapterKind) {
        let interval = self.interval_for(kind);
        loop {
            let wait = {
                let mut last = self.last.lock().await;
                match last.get(&kind) {
                    Some(previous) => {
                        let elapsed = previous.elapsed();
                        if elapsed >= interval {
                            last.insert(kind, Instant::now());
                            return;
                        }
                        interval - elapsed
                    }
                    None => {
                        last.insert(kind, Instant::now());
                        return;
                    }
                }
            };
            // Lock released while sleeping; re-check on wake since another
            // worker may have taken the slot.
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaces_out_same_source_acquires() {
        let limiter = RateLimiter::new(Duration::from_millis(500));

        let start = Instant::now();
        limiter.acquire(AdapterKind::Bing).await;
        limiter.acquire(AdapterKind::Bing).await;
        limiter.acquire(AdapterKind::Bing).await;

        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn different_sources_do_not_contend() {
        let limiter = RateLimiter::new(Duration::from_millis(500));

        let start = Instant::now();
        limiter.acquire(AdapterKind::Bing).await;
        limiter.acquire(AdapterKind::Google).await;
        limiter.acquire(AdapterKind::DuckDuckGo).await;

        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn per_source_override_applies() {
        let limiter = RateLimiter::new(Duration::from_millis(100))
            .with_interval(AdapterKind::Encyclopedia, Duration::from_millis(900));

        let start = Instant::now();
        limiter.acquire(AdapterKind::Encyclopedia).await;
        limiter.acquire(AdapterKind::Encyclopedia).await;

        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}
