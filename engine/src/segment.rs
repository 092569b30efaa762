//! Immutable index segments.
//!
//! A flush turns one batch of documents into one segment: its own document
//! store, inverted index and vector rows, all addressed by the same ordinals.
//! Segments are shared between snapshots through `Arc` and never modified.

use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::InvertedIndex;
use crate::store::{DocOrd, Document, DocumentStore, NewDocument};
use crate::tokenizer::document_tokens;
use crate::vector::VectorIndex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug)]
pub struct Segment {
    /// Generation of the snapshot that first published this segment.
    generation: u64,
    store: DocumentStore,
    lexical: InvertedIndex,
    vectors: VectorIndex,
}

impl Segment {
    /// Embed, tokenize and index one batch.
    ///
    /// When the batch holds the same id more than once, the occurrence queued
    /// last wins. Any embedding failure fails the whole batch.
    pub fn build(generation: u64, batch: Vec<NewDocument>, embedder: &dyn Embedder) -> Result<Self> {
        let dimension = embedder.dimension();
        let mut docs = Vec::with_capacity(batch.len());
        for doc in dedup_last_wins(batch) {
            let embedding = embedder.embed(&format!("{} {}", doc.title, doc.body))?;
            docs.push(Document { id: doc.id, title: doc.title, body: doc.body, embedding });
        }
        docs.sort_by(|a, b| a.id.cmp(&b.id));

        let mut vectors = VectorIndex::new(dimension);
        for doc in &docs {
            vectors.push(&doc.embedding)?;
        }
        let lexical = InvertedIndex::build(
            docs.iter()
                .enumerate()
                .map(|(ord, d)| (ord as DocOrd, document_tokens(&d.title, &d.body))),
        );
        let store = DocumentStore::from_sorted(docs.into_iter().map(Arc::new).collect());
        Ok(Self { generation, store, lexical, vectors })
    }

    /// Merge the live documents of `parts` into one segment, reusing their
    /// postings and vectors. Each part comes with the ordinals it has deleted.
    pub fn merge(generation: u64, dimension: usize, parts: &[(&Segment, &HashSet<DocOrd>)]) -> Self {
        let mut live: Vec<(usize, DocOrd, &Arc<Document>)> = Vec::new();
        for (part, (segment, deleted)) in parts.iter().enumerate() {
            for (ord, doc) in segment.store.iter() {
                if !deleted.contains(&ord) {
                    live.push((part, ord, doc));
                }
            }
        }
        live.sort_by(|a, b| a.2.id.cmp(&b.2.id));

        let mut remaps: Vec<Vec<Option<DocOrd>>> =
            parts.iter().map(|(s, _)| vec![None; s.store.len()]).collect();
        for (new, (part, old, _)) in live.iter().enumerate() {
            remaps[*part][*old as usize] = Some(new as DocOrd);
        }

        let lexical_parts: Vec<(&InvertedIndex, &[Option<DocOrd>])> = parts
            .iter()
            .zip(&remaps)
            .map(|((s, _), r)| (&s.lexical, r.as_slice()))
            .collect();
        let vector_parts: Vec<(&VectorIndex, &[Option<DocOrd>])> = parts
            .iter()
            .zip(&remaps)
            .map(|((s, _), r)| (&s.vectors, r.as_slice()))
            .collect();

        let total = live.len();
        let store = DocumentStore::from_sorted(live.into_iter().map(|(_, _, d)| Arc::clone(d)).collect());
        Self {
            generation,
            store,
            lexical: InvertedIndex::merge(&lexical_parts),
            vectors: VectorIndex::merge(dimension, &vector_parts, total),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn lexical(&self) -> &InvertedIndex {
        &self.lexical
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

fn dedup_last_wins(batch: Vec<NewDocument>) -> Vec<NewDocument> {
    let mut seen = HashSet::new();
    let mut out: Vec<NewDocument> = batch.into_iter().rev().filter(|d| seen.insert(d.id.clone())).collect();
    out.reverse();
    out
}
