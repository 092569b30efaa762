use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Position of a document inside one segment. Ordinals follow ascending id order.
pub type DocOrd = u32;

/// A document as submitted through `AddDocument`, before it is embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub id: String,
    pub title: String,
    pub body: String,
}

/// A committed document. Immutable; a later commit of the same id supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub body: String,
    pub embedding: Vec<f32>,
}

/// Documents of a single segment, addressable by ordinal or id.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: Vec<Arc<Document>>,
    by_id: HashMap<String, DocOrd>,
}

impl DocumentStore {
    /// `docs` must already be sorted by id and free of duplicates.
    pub(crate) fn from_sorted(docs: Vec<Arc<Document>>) -> Self {
        debug_assert!(docs.windows(2).all(|w| w[0].id < w[1].id));
        let by_id = docs
            .iter()
            .enumerate()
            .map(|(ord, d)| (d.id.clone(), ord as DocOrd))
            .collect();
        Self { docs, by_id }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Document>> {
        self.ord(id).map(|ord| &self.docs[ord as usize])
    }

    pub fn ord(&self, id: &str) -> Option<DocOrd> {
        self.by_id.get(id).copied()
    }

    pub fn doc(&self, ord: DocOrd) -> &Arc<Document> {
        &self.docs[ord as usize]
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocOrd, &Arc<Document>)> {
        self.docs.iter().enumerate().map(|(ord, d)| (ord as DocOrd, d))
    }
}
