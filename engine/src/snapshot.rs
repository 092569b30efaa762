//! Versioned, immutable views of the committed index.
//!
//! A [`Snapshot`] is an ordered list of shared segments, oldest first, each
//! paired with the set of its ordinals that later segments have superseded.
//! Publishing replaces the `Arc` held by [`SnapshotCell`]; readers keep the
//! snapshot they acquired until they drop it, and the last drop frees it.

use crate::error::{EngineError, Result};
use crate::segment::Segment;
use crate::store::{DocOrd, Document};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SegmentView {
    segment: Arc<Segment>,
    deleted: Arc<HashSet<DocOrd>>,
}

impl SegmentView {
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn is_live(&self, ord: DocOrd) -> bool {
        !self.deleted.contains(&ord)
    }

    pub fn live_count(&self) -> usize {
        self.segment.len() - self.deleted.len()
    }
}

#[derive(Debug, Default)]
pub struct Snapshot {
    generation: u64,
    segments: Vec<SegmentView>,
    doc_count: usize,
}

impl Snapshot {
    /// Generation 0: nothing committed yet.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of live documents.
    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[SegmentView] {
        &self.segments
    }

    /// The authoritative version of `id`, if it has been committed.
    pub fn get(&self, id: &str) -> Option<&Arc<Document>> {
        self.locate(id).map(|(i, ord)| self.segments[i].segment.store().doc(ord))
    }

    fn locate(&self, id: &str) -> Option<(usize, DocOrd)> {
        self.segments.iter().enumerate().rev().find_map(|(i, view)| {
            view.segment
                .store()
                .ord(id)
                .filter(|ord| view.is_live(*ord))
                .map(|ord| (i, ord))
        })
    }

    /// The next snapshot: everything in `self` plus `segment`, with older
    /// copies of re-added ids marked deleted. `self` is left untouched.
    pub(crate) fn extend(&self, segment: Segment) -> Snapshot {
        let mut shadowed: HashMap<usize, Vec<DocOrd>> = HashMap::new();
        for (_, doc) in segment.store().iter() {
            if let Some((i, ord)) = self.locate(&doc.id) {
                shadowed.entry(i).or_default().push(ord);
            }
        }
        let removed: usize = shadowed.values().map(Vec::len).sum();

        let mut segments = self.segments.clone();
        for (i, ords) in shadowed {
            let mut deleted = (*segments[i].deleted).clone();
            deleted.extend(ords);
            segments[i].deleted = Arc::new(deleted);
        }
        segments.retain(|view| view.live_count() > 0);

        let doc_count = self.doc_count + segment.len() - removed;
        let generation = segment.generation();
        segments.push(SegmentView { segment: Arc::new(segment), deleted: Arc::default() });
        Snapshot { generation, segments, doc_count }
    }

    /// Same contents and generation, collapsed into a single segment.
    pub(crate) fn merged(&self, dimension: usize) -> Snapshot {
        let parts: Vec<(&Segment, &HashSet<DocOrd>)> = self
            .segments
            .iter()
            .map(|view| (view.segment.as_ref(), view.deleted.as_ref()))
            .collect();
        let segment = Segment::merge(self.generation, dimension, &parts);
        Snapshot {
            generation: self.generation,
            doc_count: segment.len(),
            segments: vec![SegmentView { segment: Arc::new(segment), deleted: Arc::default() }],
        }
    }
}

/// Holder of the current snapshot pointer, shared by the committer and readers.
#[derive(Debug)]
pub struct SnapshotCell {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self { current: RwLock::new(Arc::new(Snapshot::empty())) }
    }

    /// The current snapshot. The lock is held only long enough to clone the `Arc`.
    pub fn acquire(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Atomically make `next` current. Generations must strictly increase.
    pub fn publish(&self, next: Arc<Snapshot>) -> Result<()> {
        let mut current = self.current.write();
        if next.generation() <= current.generation() {
            return Err(EngineError::internal(format!(
                "refusing to publish generation {} over {}",
                next.generation(),
                current.generation()
            )));
        }
        *current = next;
        Ok(())
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}
