use crate::config::EngineConfig;
use crate::embedding::{Embedder, HashEmbedder};
use crate::error::{EngineError, Result};
use crate::ingest::{Committer, FlushOutcome, FlushTask, IngestCounters, IngestQueue, IngestStats};
use crate::query::{Deadline, QueryEngine, SearchMethod, SearchResults};
use crate::snapshot::{Snapshot, SnapshotCell};
use crate::store::{Document, NewDocument};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// An indexing-and-search engine instance.
///
/// Owns the current-snapshot pointer, the ingestion queue and the background
/// committer. Share it behind an `Arc`; every method takes `&self`. Writes
/// become searchable after the next flush, bounded by the flush interval or a
/// full batch, whichever comes first.
pub struct Engine {
    config: EngineConfig,
    queue: Arc<IngestQueue>,
    snapshots: Arc<SnapshotCell>,
    committer: Arc<Committer>,
    counters: Arc<IngestCounters>,
    query: QueryEngine,
    task: Mutex<Option<FlushTask>>,
    /// Held shared by producers across check-and-push, exclusively by shutdown.
    closed: RwLock<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub generation: u64,
    pub documents: usize,
    pub segments: usize,
    pub queue_depth: usize,
    pub ingest: IngestStats,
}

impl Engine {
    /// Start an engine with the built-in [`HashEmbedder`].
    pub fn new(config: EngineConfig) -> Result<Self> {
        let embedder = Arc::new(HashEmbedder::new(config.dimension));
        Self::with_embedder(config, embedder)
    }

    pub fn with_embedder(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() != config.dimension {
            return Err(EngineError::invalid(format!(
                "embedder produces {}-dimensional vectors, config expects {}",
                embedder.dimension(),
                config.dimension
            )));
        }
        let queue = Arc::new(IngestQueue::new(config.queue_capacity, config.batch_size));
        let snapshots = Arc::new(SnapshotCell::new());
        let counters = Arc::new(IngestCounters::default());
        let committer = Arc::new(Committer::new(
            Arc::clone(&queue),
            Arc::clone(&snapshots),
            Arc::clone(&embedder),
            Arc::clone(&counters),
            config.batch_size,
            config.max_segments,
        ));
        let task = FlushTask::spawn(Arc::clone(&committer), config.flush_interval())?;
        info!(
            batch_size = config.batch_size,
            flush_interval_ms = config.flush_interval_ms,
            queue_capacity = config.queue_capacity,
            dimension = config.dimension,
            "engine started"
        );
        Ok(Self {
            query: QueryEngine::new(embedder),
            config,
            queue,
            snapshots,
            committer,
            counters,
            task: Mutex::new(Some(task)),
            closed: RwLock::new(false),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Queue a document for indexing. Returns as soon as it is queued; the
    /// document is not searchable until a later flush commits it.
    pub fn add_document(
        &self,
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<bool> {
        let id = id.into();
        if id.is_empty() {
            return Err(EngineError::invalid("document id must not be empty"));
        }
        let closed = self.closed.read();
        if *closed {
            return Err(EngineError::internal("engine is shut down"));
        }
        match self.queue.push(NewDocument { id, title: title.into(), body: body.into() }) {
            Ok(()) => {
                self.counters.record_accepted();
                debug!(queued = self.queue.len(), "document accepted");
                Ok(true)
            }
            Err(err) => {
                self.counters.record_rejected();
                warn!(error = %err, "document rejected");
                Err(err)
            }
        }
    }

    /// Search the current snapshot. `k` above `max_k` is clamped.
    pub fn search(&self, query: &str, method: SearchMethod, k: usize) -> Result<SearchResults> {
        self.run_search(query, method, k, None)
    }

    /// Like [`Engine::search`], but gives up with `DeadlineExceeded` once
    /// `timeout` has elapsed.
    pub fn search_within(
        &self,
        query: &str,
        method: SearchMethod,
        k: usize,
        timeout: Duration,
    ) -> Result<SearchResults> {
        self.run_search(query, method, k, Some(Deadline::after(timeout)))
    }

    fn run_search(
        &self,
        query: &str,
        method: SearchMethod,
        k: usize,
        deadline: Option<Deadline>,
    ) -> Result<SearchResults> {
        if k == 0 {
            return Err(EngineError::invalid("k must be at least 1"));
        }
        let k = k.min(self.config.max_k);
        // Dropping the Arc at the end of this call releases the snapshot.
        let snapshot = self.snapshots.acquire();
        self.query.search(&snapshot, query, method, k, deadline.as_ref())
    }

    /// Committed version of `id`.
    pub fn get_document(&self, id: &str) -> Result<Arc<Document>> {
        self.snapshots
            .acquire()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("document {id:?}")))
    }

    /// The current snapshot, for callers that need several reads to agree.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.acquire()
    }

    /// Commit one batch now on the calling thread, serialized with the
    /// background committer.
    pub fn flush(&self) -> Result<FlushOutcome> {
        self.committer.flush()
    }

    pub fn stats(&self) -> EngineStats {
        let snapshot = self.snapshots.acquire();
        EngineStats {
            generation: snapshot.generation(),
            documents: snapshot.doc_count(),
            segments: snapshot.segment_count(),
            queue_depth: self.queue.len(),
            ingest: self.counters.snapshot(),
        }
    }

    /// Stop accepting documents, wait for the committer to finish any flush in
    /// progress and commit what is still queued. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut closed = self.closed.write();
            if *closed {
                return;
            }
            *closed = true;
        }
        if let Some(mut task) = self.task.lock().take() {
            task.stop();
        }
        info!(generation = self.snapshots.acquire().generation(), "engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
