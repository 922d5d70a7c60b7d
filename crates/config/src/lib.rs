use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Seconds a worker sleeps when the scheduler has nothing for it.
    pub search_interval_secs: u64,
    pub workers: usize,
    pub db_path: String,
    pub dictionary_path: String,
    /// How long `stop` waits for in-flight crawls before giving up.
    pub shutdown_grace_secs: u64,
    /// Claims older than this are considered abandoned by the startup sweep.
    pub stale_claim_secs: u64,
    /// Consecutive loop-level errors before exponential backoff kicks in.
    pub max_consecutive_errors: u32,
    /// Crawl attempts per topic before an `error` topic stays terminal.
    pub max_topic_attempts: u32,
    /// Base of the per-topic retry backoff (doubles per attempt).
    pub topic_retry_base_secs: u64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            search_interval_secs: 5,
            workers: 4,
            db_path: "data/knowledge.redb".to_string(),
            dictionary_path: "config/dictionary.json".to_string(),
            shutdown_grace_secs: 30,
            stale_claim_secs: 900,
            max_consecutive_errors: 5,
            max_topic_attempts: 3,
            topic_retry_base_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub adapter_timeout_secs: u64,
    /// Minimum gap between two requests to the same source.
    pub min_request_interval_ms: u64,
    pub top_k: usize,
    pub comparison_top_k: usize,
    /// Per-adapter cap used by diversity sampling on comparison queries.
    pub per_source_cap: usize,
    pub min_content_chars: usize,
    pub user_agent: String,
    /// Brave Search key.  Takes precedence over the `BRAVE_SEARCH_API_KEY`
    /// env var when both are set.
    pub brave_api_key: Option<String>,
    /// SerpAPI key.  Takes precedence over the `SERPAPI_API_KEY` env var.
    pub serpapi_api_key: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_secs: 10,
            min_request_interval_ms: 500,
            top_k: 6,
            comparison_top_k: 8,
            per_source_cap: 2,
            min_content_chars: 40,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                         AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            brave_api_key: None,
            serpapi_api_key: None,
        }
    }
}

impl RetrievalConfig {
    /// Resolve the Brave key: explicit config field > env var > none.
    pub fn brave_key(&self) -> Option<String> {
        resolve_key(self.brave_api_key.as_deref(), "BRAVE_SEARCH_API_KEY")
    }

    /// Resolve the SerpAPI key: explicit config field > env var > none.
    pub fn serpapi_key(&self) -> Option<String> {
        resolve_key(self.serpapi_api_key.as_deref(), "SERPAPI_API_KEY")
    }
}

fn resolve_key(explicit: Option<&str>, var: &str) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .or_else(|| {
            env::var(var)
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub dictionary_weight: f64,
    pub user_query_weight: f64,
    pub trending_weight: f64,
    pub discovered_weight: f64,
    pub trending_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dictionary_weight: 0.50,
            user_query_weight: 0.30,
            trending_weight: 0.15,
            discovered_weight: 0.05,
            trending_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub runtime_dir: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            runtime_dir: ".thor/runtime".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub learner: LearnerConfig,
    pub retrieval: RetrievalConfig,
    pub scheduler: SchedulerConfig,
    pub daemon: DaemonConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}
