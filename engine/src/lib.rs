//! In-memory document search with lexical and vector queries.
//!
//! Documents are queued by [`Engine::add_document`], committed in batches by a
//! single background committer, and published as immutable [`Snapshot`]s.
//! Searches run against whichever snapshot is current when they start and never
//! wait for the committer.

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod query;
pub mod segment;
pub mod snapshot;
pub mod store;
pub mod tokenizer;
pub mod vector;

pub use config::EngineConfig;
pub use embedding::{embed, Embedder, HashEmbedder, DEFAULT_DIMENSION};
pub use engine::{Engine, EngineStats};
pub use error::{EngineError, Result};
pub use index::{InvertedIndex, Posting};
pub use ingest::{FlushOutcome, IngestStats};
pub use query::{SearchHit, SearchMethod, SearchResults};
pub use snapshot::Snapshot;
pub use store::{DocOrd, Document, NewDocument};
pub use vector::VectorIndex;
