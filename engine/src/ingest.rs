//! Ingestion pipeline: bounded queue, single committer, background flusher.
//!
//! Producers push into [`IngestQueue`] from any thread. The [`Committer`]
//! drains at most one batch per flush under a mutex, so only one flush ever
//! runs at a time, builds a segment for exactly that batch and publishes the
//! extended snapshot. A batch that fails to build is dropped and logged; its
//! documents are not retried (at-most-once delivery).

use crate::embedding::Embedder;
use crate::error::{EngineError, Result};
use crate::segment::Segment;
use crate::snapshot::{Snapshot, SnapshotCell};
use crate::store::NewDocument;
use crossbeam_channel::{after, bounded, select, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct IngestQueue {
    tx: Sender<NewDocument>,
    rx: Receiver<NewDocument>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    batch_size: usize,
}

impl IngestQueue {
    pub fn new(capacity: usize, batch_size: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        let (wake_tx, wake_rx) = bounded(1);
        Self { tx, rx, wake_tx, wake_rx, batch_size }
    }

    /// Enqueue without blocking. Fails with `ResourceExhausted` when full.
    pub fn push(&self, doc: NewDocument) -> Result<()> {
        match self.tx.try_send(doc) {
            Ok(()) => {
                if self.tx.len() >= self.batch_size {
                    // A pending wakeup is as good as a new one.
                    let _ = self.wake_tx.try_send(());
                }
                Ok(())
            }
            Err(TrySendError::Full(doc)) => Err(EngineError::ResourceExhausted(format!(
                "ingest queue is full ({} documents), rejected {}",
                self.tx.capacity().unwrap_or_default(),
                doc.id
            ))),
            Err(TrySendError::Disconnected(_)) => Err(EngineError::internal("ingest queue is closed")),
        }
    }

    /// Take up to `max` documents, oldest first.
    pub fn drain(&self, max: usize) -> Vec<NewDocument> {
        self.rx.try_iter().take(max).collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Signalled when the queue reaches a full batch.
    pub(crate) fn wakeups(&self) -> &Receiver<()> {
        &self.wake_rx
    }
}

#[derive(Debug, Default)]
pub struct IngestCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    committed: AtomicU64,
    flushes: AtomicU64,
    merges: AtomicU64,
    dropped_batches: AtomicU64,
    dropped_documents: AtomicU64,
    last_failure: Mutex<Option<String>>,
}

impl IngestCounters {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestStats {
        IngestStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
            dropped_batches: self.dropped_batches.load(Ordering::Relaxed),
            dropped_documents: self.dropped_documents.load(Ordering::Relaxed),
            last_failure: self.last_failure.lock().clone(),
        }
    }
}

/// Point-in-time copy of the ingestion counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub accepted: u64,
    pub rejected: u64,
    pub committed: u64,
    pub flushes: u64,
    pub merges: u64,
    pub dropped_batches: u64,
    pub dropped_documents: u64,
    pub last_failure: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FlushOutcome {
    /// Nothing was queued.
    Idle,
    Published { generation: u64, documents: usize },
}

pub struct Committer {
    queue: Arc<IngestQueue>,
    snapshots: Arc<SnapshotCell>,
    embedder: Arc<dyn Embedder>,
    counters: Arc<IngestCounters>,
    batch_size: usize,
    max_segments: usize,
    writer: Mutex<()>,
}

impl Committer {
    pub fn new(
        queue: Arc<IngestQueue>,
        snapshots: Arc<SnapshotCell>,
        embedder: Arc<dyn Embedder>,
        counters: Arc<IngestCounters>,
        batch_size: usize,
        max_segments: usize,
    ) -> Self {
        Self { queue, snapshots, embedder, counters, batch_size, max_segments, writer: Mutex::new(()) }
    }

    /// Commit one batch. Callers arriving while a flush runs wait for it to
    /// finish and then flush whatever is left.
    pub fn flush(&self) -> Result<FlushOutcome> {
        let _writer = self.writer.lock();
        let batch = self.queue.drain(self.batch_size);
        if batch.is_empty() {
            return Ok(FlushOutcome::Idle);
        }
        let documents = batch.len();
        let sample: Vec<String> = batch.iter().take(3).map(|d| d.id.clone()).collect();
        let current = self.snapshots.acquire();
        let generation = current.generation() + 1;
        debug!(generation, documents, "flushing batch");

        let built = panic::catch_unwind(AssertUnwindSafe(|| self.build(&current, generation, batch)))
            .unwrap_or_else(|payload| {
                Err(EngineError::internal(format!("index build panicked: {}", panic_message(payload.as_ref()))))
            });
        let published = built.and_then(|next| {
            let live = next.doc_count();
            self.snapshots.publish(Arc::new(next)).map(|()| live)
        });

        match published {
            Ok(live) => {
                self.counters.committed.fetch_add(documents as u64, Ordering::Relaxed);
                self.counters.flushes.fetch_add(1, Ordering::Relaxed);
                info!(generation, documents, live, "published snapshot");
                Ok(FlushOutcome::Published { generation, documents })
            }
            Err(err) => {
                self.counters.dropped_batches.fetch_add(1, Ordering::Relaxed);
                self.counters.dropped_documents.fetch_add(documents as u64, Ordering::Relaxed);
                *self.counters.last_failure.lock() = Some(err.to_string());
                error!(generation, documents, ids = ?sample, error = %err, "dropped batch");
                Err(err)
            }
        }
    }

    fn build(&self, current: &Snapshot, generation: u64, batch: Vec<NewDocument>) -> Result<Snapshot> {
        let segment = Segment::build(generation, batch, self.embedder.as_ref())?;
        let next = current.extend(segment);
        if next.segment_count() <= self.max_segments {
            return Ok(next);
        }
        let merged = next.merged(self.embedder.dimension());
        self.counters.merges.fetch_add(1, Ordering::Relaxed);
        info!(generation, segments = next.segment_count(), docs = merged.doc_count(), "merged segments");
        Ok(merged)
    }

    /// Flush until less than a full batch is queued; always flushes at least once.
    fn flush_ready(&self) {
        loop {
            // Failures are already logged and counted by `flush`.
            let outcome = self.flush();
            if matches!(outcome, Ok(FlushOutcome::Idle)) || self.queue.len() < self.batch_size {
                break;
            }
        }
    }

    /// Flush until the queue is empty.
    fn drain_all(&self) {
        while !matches!(self.flush(), Ok(FlushOutcome::Idle)) {}
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Background thread that flushes on a fixed delay or when a batch fills up.
/// Stopping it waits for any in-flight flush and then drains the queue.
pub struct FlushTask {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl FlushTask {
    pub fn spawn(committer: Arc<Committer>, interval: Duration) -> Result<Self> {
        let (stop, stop_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("ingest-committer".into())
            .spawn(move || run(committer, interval, stop_rx))
            .map_err(|e| EngineError::internal(format!("failed to start committer thread: {e}")))?;
        Ok(Self { stop, handle: Some(handle) })
    }

    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else { return };
        let _ = self.stop.try_send(());
        if handle.join().is_err() {
            error!("ingest committer thread panicked");
        }
    }
}

impl Drop for FlushTask {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(committer: Arc<Committer>, interval: Duration, stop: Receiver<()>) {
    let wake = committer.queue.wakeups().clone();
    debug!(?interval, "ingest committer started");
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(wake) -> _ => {},
            recv(after(interval)) -> _ => {},
        }
        committer.flush_ready();
    }
    let pending = committer.queue.len();
    if pending > 0 {
        warn!(pending, "draining ingest queue before shutdown");
    }
    committer.drain_all();
    debug!("ingest committer stopped");
}
