use crate::embedding::DEFAULT_DIMENSION;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Documents per flush; a queue this long triggers a flush immediately
    pub batch_size: usize,
    /// Fixed delay between periodic flushes
    pub flush_interval_ms: u64,
    /// Maximum queued, uncommitted documents
    pub queue_capacity: usize,
    /// Embedding dimensionality
    pub dimension: usize,
    /// k used when a search does not name one
    pub default_k: usize,
    /// Larger k values are clamped to this
    pub max_k: usize,
    /// Searches allowed to execute at the same time
    pub search_workers: usize,
    /// Per-search time budget
    pub search_timeout_ms: u64,
    /// Segment count above which a flush merges everything into one segment
    pub max_segments: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            flush_interval_ms: 500,
            queue_capacity: 10_000,
            dimension: DEFAULT_DIMENSION,
            default_k: 10,
            max_k: 100,
            search_workers: std::thread::available_parallelism().map(|n| n.get() * 2).unwrap_or(4),
            search_timeout_ms: 5_000,
            max_segments: 16,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `SNAPSEARCH_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Unparseable values are logged and ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn set<T: std::str::FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse() {
                    Ok(v) => *slot = v,
                    Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable setting"),
                }
            }
        }
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        set(lookup, "SNAPSEARCH_BATCH_SIZE", &mut self.batch_size);
        set(lookup, "SNAPSEARCH_FLUSH_INTERVAL_MS", &mut self.flush_interval_ms);
        set(lookup, "SNAPSEARCH_QUEUE_CAPACITY", &mut self.queue_capacity);
        set(lookup, "SNAPSEARCH_DIMENSION", &mut self.dimension);
        set(lookup, "SNAPSEARCH_DEFAULT_K", &mut self.default_k);
        set(lookup, "SNAPSEARCH_MAX_K", &mut self.max_k);
        set(lookup, "SNAPSEARCH_SEARCH_WORKERS", &mut self.search_workers);
        set(lookup, "SNAPSEARCH_SEARCH_TIMEOUT_MS", &mut self.search_timeout_ms);
        set(lookup, "SNAPSEARCH_MAX_SEGMENTS", &mut self.max_segments);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size", self.batch_size as u64),
            ("flush_interval_ms", self.flush_interval_ms),
            ("queue_capacity", self.queue_capacity as u64),
            ("dimension", self.dimension as u64),
            ("max_k", self.max_k as u64),
            ("search_workers", self.search_workers as u64),
            ("max_segments", self.max_segments as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(EngineError::invalid(format!("{name} must be greater than zero")));
        }
        if self.batch_size > self.queue_capacity {
            return Err(EngineError::invalid(format!(
                "batch_size ({}) must not exceed queue_capacity ({})",
                self.batch_size, self.queue_capacity
            )));
        }
        if self.default_k == 0 || self.default_k > self.max_k {
            return Err(EngineError::invalid(format!(
                "default_k must be between 1 and max_k ({})",
                self.max_k
            )));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    /// Turn a caller-supplied k into the one a search runs with: missing means
    /// `default_k`, zero or negative is an error, anything above `max_k` is clamped.
    pub fn resolve_k(&self, k: Option<i64>) -> Result<usize> {
        match k {
            None => Ok(self.default_k),
            Some(k) if k < 1 => Err(EngineError::invalid(format!("k must be at least 1, got {k}"))),
            Some(k) => Ok((k as u64).min(self.max_k as u64) as usize),
        }
    }
}
