//! Query execution against a single snapshot.

use crate::embedding::Embedder;
use crate::error::{EngineError, Result};
use crate::snapshot::Snapshot;
use crate::store::Document;
use crate::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Characters of the body returned as a hit's snippet.
pub const SNIPPET_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Text,
    Vector,
}

impl FromStr for SearchMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "vector" => Ok(Self::Vector),
            other => Err(EngineError::invalid(format!("unknown search method {other:?}"))),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Vector => "vector",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    /// Generation of the snapshot the query ran against.
    pub generation: u64,
    /// Matching documents before truncation to `k`.
    pub total_hits: usize,
    pub hits: Vec<SearchHit>,
}

/// Point in time after which a running search gives up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self { at: Instant::now() + budget, budget }
    }

    pub fn check(&self) -> Result<()> {
        if Instant::now() >= self.at {
            Err(EngineError::DeadlineExceeded(self.budget))
        } else {
            Ok(())
        }
    }
}

struct Scored {
    doc: Arc<Document>,
    score: f32,
}

pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
}

impl QueryEngine {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Run `query` against `snapshot` and return at most `k` ranked hits.
    ///
    /// Ranking is by descending score, ties broken by ascending id. Queries
    /// that match nothing return an empty list.
    pub fn search(
        &self,
        snapshot: &Snapshot,
        query: &str,
        method: SearchMethod,
        k: usize,
        deadline: Option<&Deadline>,
    ) -> Result<SearchResults> {
        if k == 0 {
            return Err(EngineError::invalid("k must be at least 1"));
        }
        if let Some(d) = deadline {
            d.check()?;
        }
        let candidates = match method {
            SearchMethod::Text => self.search_text(snapshot, query, deadline)?,
            SearchMethod::Vector => self.search_vector(snapshot, query, deadline)?,
        };
        if let Some(d) = deadline {
            d.check()?;
        }
        let total_hits = candidates.len();
        let hits = rank(candidates, k)
            .into_iter()
            .map(|s| SearchHit {
                id: s.doc.id.clone(),
                title: s.doc.title.clone(),
                snippet: snippet(&s.doc.body),
                score: s.score,
            })
            .collect();
        Ok(SearchResults { generation: snapshot.generation(), total_hits, hits })
    }

    fn search_text(&self, snapshot: &Snapshot, query: &str, deadline: Option<&Deadline>) -> Result<Vec<Scored>> {
        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query).into_iter().filter(|t| seen.insert(t.clone())).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for view in snapshot.segments() {
            if let Some(d) = deadline {
                d.check()?;
            }
            let store = view.segment().store();
            for (ord, tf) in view.segment().lexical().score(&terms, |ord| view.is_live(ord)) {
                out.push(Scored { doc: Arc::clone(store.doc(ord)), score: tf as f32 });
            }
        }
        Ok(out)
    }

    fn search_vector(&self, snapshot: &Snapshot, query: &str, deadline: Option<&Deadline>) -> Result<Vec<Scored>> {
        let qv = self.embedder.embed(query)?;
        if qv.iter().all(|x| *x == 0.0) {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for view in snapshot.segments() {
            let store = view.segment().store();
            for (ord, score) in view.segment().vectors().scan(&qv, |ord| view.is_live(ord), deadline)? {
                out.push(Scored { doc: Arc::clone(store.doc(ord)), score });
            }
        }
        Ok(out)
    }
}

fn rank(mut candidates: Vec<Scored>, k: usize) -> Vec<Scored> {
    candidates.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.doc.id.cmp(&b.doc.id),
        ord => ord,
    });
    candidates.truncate(k);
    candidates
}

/// First [`SNIPPET_CHARS`] characters of `body`.
pub fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_CHARS).collect()
}
