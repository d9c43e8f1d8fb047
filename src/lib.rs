//! Semantic search over text records: embed a record's text, store the
//! vector by id, and rank stored records against a query by cosine
//! similarity with an exact scan.

pub mod api;
pub mod cancel;
pub mod config;
pub mod embedder;
pub mod error;
pub mod models;
pub mod rank;
pub mod scan;
pub mod search;
pub mod similarity;
pub mod store;
pub mod validate;

pub use error::EngineError;
pub use models::{ EmbeddingVector, IngestOutcome, Persistence, ScoredResult, SearchLimit };
pub use search::SemanticSearch;
