use crate::store::DocOrd;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Posting {
    pub doc: DocOrd,
    pub term_frequency: u32,
}

/// Term → postings for one segment. Every list is sorted by ordinal, which is
/// also ascending document id order, and only holds postings with tf ≥ 1.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, Vec<Posting>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(ordinal, tokens)` pairs supplied in ascending ordinal order.
    pub(crate) fn build<I>(docs: I) -> Self
    where
        I: IntoIterator<Item = (DocOrd, Vec<String>)>,
    {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        for (doc, tokens) in docs {
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }
            for (term, term_frequency) in tf {
                postings.entry(term).or_default().push(Posting { doc, term_frequency });
            }
        }
        Self { postings }
    }

    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    /// Score every live document containing at least one of `terms`.
    ///
    /// `terms` must be distinct. The score of a document is the sum of the
    /// frequencies of the query terms it contains.
    pub fn score<F>(&self, terms: &[String], mut live: F) -> Vec<(DocOrd, u32)>
    where
        F: FnMut(DocOrd) -> bool,
    {
        let mut scores: BTreeMap<DocOrd, u32> = BTreeMap::new();
        for term in terms {
            for p in self.postings(term) {
                if live(p.doc) {
                    *scores.entry(p.doc).or_insert(0) += p.term_frequency;
                }
            }
        }
        scores.into_iter().collect()
    }

    /// Merge segment indexes without re-tokenizing. `remaps[i][old]` gives the
    /// ordinal of part `i`'s document `old` in the merged segment, or `None` if
    /// that document is dropped.
    pub(crate) fn merge(parts: &[(&InvertedIndex, &[Option<DocOrd>])]) -> Self {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        for (index, remap) in parts {
            for (term, list) in &index.postings {
                for p in list {
                    if let Some(doc) = remap[p.doc as usize] {
                        postings
                            .entry(term.clone())
                            .or_default()
                            .push(Posting { doc, term_frequency: p.term_frequency });
                    }
                }
            }
        }
        for list in postings.values_mut() {
            list.sort_unstable_by_key(|p| p.doc);
        }
        Self { postings }
    }
}
