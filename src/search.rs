use std::sync::Arc;

use tracing::{ debug, info, warn };

use crate::cancel::CancelSignal;
use crate::config::EngineConfig;
use crate::embedder::EmbeddingGenerator;
use crate::error::{ EmbeddingError, EngineError };
use crate::models::{ EmbeddingVector, IngestOutcome, Persistence, ScoredResult, SearchLimit };
use crate::rank::select;
use crate::scan::CorpusScanner;
use crate::store::RecordStore;

/// Ties the embedding generator and the record store together for the two
/// request paths: ingest and search. Holds no per-request state.
pub struct SemanticSearch {
    config: EngineConfig,
    embedder: Arc<dyn EmbeddingGenerator>,
    store: Arc<dyn RecordStore>,
    scanner: CorpusScanner,
}

impl SemanticSearch {
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingGenerator>,
        store: Arc<dyn RecordStore>
    ) -> Self {
        let scanner = CorpusScanner::new(config.dimension, config.scan_budget);
        Self {
            config,
            embedder,
            store,
            scanner,
        }
    }

    pub async fn ingest(&self, id: Option<&str>, text: &str) -> Result<IngestOutcome, EngineError> {
        self.ingest_with_cancel(id, text, &CancelSignal::never()).await
    }

    /// Embeds `text` and stores it under `id` (or a store-assigned id).
    ///
    /// A failed store write does not fail the call: the embedding is still
    /// returned and the outcome carries [`Persistence::Failed`].
    ///
    /// Cancellation is honoured up to the store write. A write that has
    /// started runs to completion.
    pub async fn ingest_with_cancel(
        &self,
        id: Option<&str>,
        text: &str,
        cancel: &CancelSignal
    ) -> Result<IngestOutcome, EngineError> {
        let text = non_empty(text, "text")?;
        let id = id.map(str::trim).filter(|id| !id.is_empty());

        let embedding = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            vector = self.embed(text) => vector?,
        };
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let persistence = match self.store.upsert(id, &embedding).await {
            Ok(id) => {
                info!(id = %id, length = embedding.len(), "Stored embedding");
                Persistence::Stored { id }
            }
            Err(e) => {
                warn!(id = ?id, error = %e, "Embedding computed but the store write failed");
                Persistence::Failed { reason: e.to_string() }
            }
        };

        Ok(IngestOutcome { embedding, persistence })
    }

    pub async fn search(
        &self,
        query: &str,
        limit: SearchLimit
    ) -> Result<Vec<ScoredResult>, EngineError> {
        self.search_with_cancel(query, limit, &CancelSignal::never()).await
    }

    /// Ranks every stored record against `query`.
    ///
    /// Cancellation before the corpus has been fetched means the scan never
    /// starts; cancellation during the scan discards it. Either way the
    /// caller gets [`EngineError::Cancelled`], never a partial ranking.
    pub async fn search_with_cancel(
        &self,
        query: &str,
        limit: SearchLimit,
        cancel: &CancelSignal
    ) -> Result<Vec<ScoredResult>, EngineError> {
        let query = non_empty(query, "query")?;

        let query_vector = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            vector = self.embed(query) => vector?,
        };

        let corpus = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            rows = self.store.fetch_all() => rows.map_err(EngineError::StoreUnavailable)?,
        };
        let total = corpus.len();

        // The scan is CPU-bound; keep it off the async workers.
        let scanner = self.scanner;
        let scan_cancel = cancel.clone();
        let scan = tokio::task::spawn_blocking(move || {
            scanner.scan(&query_vector, corpus, &scan_cancel)
        });
        let (scored, stats) = match scan.await {
            Ok(outcome) => outcome?,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => return Err(EngineError::Cancelled),
        };
        let ranked = select(scored, limit);

        info!(
            corpus = total,
            rejected = stats.rejected,
            wrong_dimension = stats.wrong_dimension,
            incomparable = stats.incomparable,
            returned = ranked.len(),
            "Search complete"
        );
        Ok(ranked)
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EngineError> {
        let vector = self.embedder
            .embed(text).await
            .map_err(|e| EngineError::UpstreamUnavailable(e.to_string()))?;

        if vector.len() != self.config.dimension {
            let mismatch = EmbeddingError::Dimension {
                expected: self.config.dimension,
                actual: vector.len(),
            };
            return Err(EngineError::UpstreamUnavailable(mismatch.to_string()));
        }

        debug!(model = self.embedder.model(), length = vector.len(), "Generated embedding");
        Ok(vector)
    }
}

fn non_empty<'a>(text: &'a str, field: &str) -> Result<&'a str, EngineError> {
    if text.trim().is_empty() {
        Err(EngineError::InvalidInput(format!("'{}' must be a non-empty string", field)))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::config::{ EmbeddingBackend, StoreConfig };
    use crate::error::StoreError;
    use crate::models::StoredRecord;
    use crate::store::SurrealStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use tempfile::TempDir;

    /// Deterministic stand-in for the model: a fixed phrase book.
    pub(crate) struct PhraseEmbedder {
        phrases: HashMap<&'static str, Vec<f32>>,
    }

    impl PhraseEmbedder {
        pub(crate) fn new(phrases: &[(&'static str, [f32; 2])]) -> Self {
            Self {
                phrases: phrases
                    .iter()
                    .map(|(text, vector)| (*text, vector.to_vec()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl EmbeddingGenerator for PhraseEmbedder {
        async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
            self.phrases
                .get(text)
                .cloned()
                .map(EmbeddingVector::new)
                .ok_or_else(|| EmbeddingError::Request(format!("no phrase for {:?}", text)))
        }

        fn model(&self) -> &str {
            "phrase-book"
        }
    }

    /// Generator whose calls never complete.
    struct StalledEmbedder {
        started: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingGenerator for StalledEmbedder {
        async fn embed(&self, _text: &str) -> Result<EmbeddingVector, EmbeddingError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }

        fn model(&self) -> &str {
            "stalled"
        }
    }

    struct BrokenStore {
        fetch_started: AtomicUsize,
        hang_on_fetch: bool,
    }

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn upsert(
            &self,
            _id: Option<&str>,
            _embedding: &EmbeddingVector
        ) -> Result<String, StoreError> {
            Err(StoreError::MissingRecord("write refused".to_string()))
        }

        async fn fetch_all(&self) -> Result<Vec<StoredRecord>, StoreError> {
            self.fetch_started.fetch_add(1, Ordering::SeqCst);
            if self.hang_on_fetch {
                std::future::pending::<()>().await;
            }
            Err(StoreError::MissingRecord("corpus".to_string()))
        }
    }

    pub(crate) fn test_config(path: std::path::PathBuf) -> EngineConfig {
        EngineConfig {
            model: "phrase-book".to_string(),
            dimension: 2,
            backend: EmbeddingBackend::Local,
            store: StoreConfig {
                path,
                namespace: "test".to_string(),
                database: "test".to_string(),
                table: "complaints".to_string(),
            },
            scan_budget: 1000,
        }
    }

    pub(crate) fn phrases() -> PhraseEmbedder {
        PhraseEmbedder::new(
            &[
                ("north", [1.0, 0.0]),
                ("east", [0.0, 1.0]),
                ("north east", [0.7, 0.7]),
                ("too wide", [1.0, 0.0]),
            ]
        )
    }

    pub(crate) async fn setup_test_system() -> (SemanticSearch, Arc<SurrealStore>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(temp_dir.path().join("test_db"));
        let store = Arc::new(SurrealStore::connect(&config.store).await.expect("Failed to open store"));
        let system = SemanticSearch::new(config, Arc::new(phrases()), store.clone());
        (system, store, temp_dir)
    }

    fn ids(results: &[ScoredResult]) -> Vec<&str> {
        results
            .iter()
            .map(|r| r.id.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_ranks_corpus_against_query() {
        let (system, store, _temp_dir) = setup_test_system().await;
        store.put_raw("1", Some("north"), json!([1.0, 0.0])).await.unwrap();
        store.put_raw("2", Some("east"), json!([0.0, 1.0])).await.unwrap();
        store.put_raw("3", Some("north east"), json!([0.7, 0.7])).await.unwrap();

        let results = system.search("north", SearchLimit::new(2)).await.unwrap();

        assert_eq!(ids(&results), vec!["1", "3"]);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        assert!((results[1].similarity - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert_eq!(results[1].content.as_deref(), Some("north east"));
    }

    #[tokio::test]
    async fn test_bad_rows_are_skipped_not_fatal() {
        let (system, store, _temp_dir) = setup_test_system().await;
        store.put_raw("valid", None, json!([1.0, 0.0])).await.unwrap();
        store.put_raw("missing", None, serde_json::Value::Null).await.unwrap();
        store.put_raw("old-model", None, json!([1.0, 0.0, 0.0])).await.unwrap();
        store.put_raw("garbled", None, json!("[1.0, ???]")).await.unwrap();

        let results = system.search("north", SearchLimit::default()).await.unwrap();
        assert_eq!(ids(&results), vec!["valid"]);
    }

    #[tokio::test]
    async fn test_default_limit_and_no_padding() {
        let (system, store, _temp_dir) = setup_test_system().await;
        for i in 0..7 {
            store.put_raw(&format!("r{}", i), None, json!([1.0, i as f64])).await.unwrap();
        }
        let results = system.search("north", SearchLimit::default()).await.unwrap();
        assert_eq!(results.len(), 5);

        let (small, store, _temp_dir) = setup_test_system().await;
        store.put_raw("only", None, json!([0.0, 1.0])).await.unwrap();
        let results = small.search("east", SearchLimit::new(10)).await.unwrap();
        assert_eq!(ids(&results), vec!["only"]);
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_empty_list() {
        let (system, _store, _temp_dir) = setup_test_system().await;
        assert!(system.search("north", SearchLimit::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_without_id_gets_store_assigned_id() {
        let (system, _store, _temp_dir) = setup_test_system().await;

        let outcome = system.ingest(None, "north").await.unwrap();
        assert_eq!(outcome.embedding.as_slice(), &[1.0, 0.0]);
        let id = outcome.id().expect("store should assign an id").to_string();

        let results = system.search("north", SearchLimit::default()).await.unwrap();
        assert_eq!(ids(&results), vec![id.as_str()]);
    }

    #[tokio::test]
    async fn test_reingest_overwrites_previous_embedding() {
        let (system, _store, _temp_dir) = setup_test_system().await;

        system.ingest(Some("a"), "north").await.unwrap();
        let before = system.search("north", SearchLimit::default()).await.unwrap();
        assert!((before[0].similarity - 1.0).abs() < 1e-6);

        system.ingest(Some("a"), "east").await.unwrap();
        let after = system.search("north", SearchLimit::default()).await.unwrap();
        assert_eq!(after.len(), 1);
        assert!(after[0].similarity.abs() < 1e-6, "old vector still scored: {:?}", after);
    }

    #[tokio::test]
    async fn test_identical_reingest_is_idempotent() {
        let (system, _store, _temp_dir) = setup_test_system().await;
        system.ingest(Some("a"), "north east").await.unwrap();
        system.ingest(Some("b"), "east").await.unwrap();

        let first = system.ingest(Some("a"), "north east").await.unwrap();
        let before = system.search("north", SearchLimit::default()).await.unwrap();
        let second = system.ingest(Some("a"), "north east").await.unwrap();
        let after = system.search("north", SearchLimit::default()).await.unwrap();

        assert_eq!(first.embedding, second.embedding);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected_before_embedding() {
        let (system, _store, _temp_dir) = setup_test_system().await;
        assert!(matches!(system.search("   ", SearchLimit::default()).await, Err(EngineError::InvalidInput(_))));
        assert!(matches!(system.ingest(Some("x"), "").await, Err(EngineError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_generator_failure_is_upstream_unavailable() {
        let (system, _store, _temp_dir) = setup_test_system().await;
        let outcome = system.search("unknown phrase", SearchLimit::default()).await;
        assert!(matches!(outcome, Err(EngineError::UpstreamUnavailable(_))));

        let outcome = system.ingest(Some("x"), "unknown phrase").await;
        assert!(matches!(outcome, Err(EngineError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_wrong_width_from_generator_is_never_stored() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path().join("test_db"));
        config.dimension = 3;
        let store = Arc::new(SurrealStore::connect(&config.store).await.unwrap());
        let system = SemanticSearch::new(config, Arc::new(phrases()), store.clone());

        let outcome = system.ingest(Some("w"), "too wide").await;
        assert!(matches!(outcome, Err(EngineError::UpstreamUnavailable(_))));
        assert!(store.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_write_failure_still_returns_embedding() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(BrokenStore { fetch_started: AtomicUsize::new(0), hang_on_fetch: false });
        let system = SemanticSearch::new(
            test_config(temp_dir.path().join("unused")),
            Arc::new(phrases()),
            store
        );

        let outcome = system.ingest(Some("a"), "east").await.unwrap();
        assert_eq!(outcome.embedding.as_slice(), &[0.0, 1.0]);
        assert!(!outcome.is_persisted());
        assert!(matches!(outcome.persistence, Persistence::Failed { .. }));
    }

    #[tokio::test]
    async fn test_store_read_failure_is_not_an_empty_result() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(BrokenStore { fetch_started: AtomicUsize::new(0), hang_on_fetch: false });
        let system = SemanticSearch::new(
            test_config(temp_dir.path().join("unused")),
            Arc::new(phrases()),
            store
        );

        let outcome = system.search("north", SearchLimit::default()).await;
        assert!(matches!(outcome, Err(EngineError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cancel_during_fetch_stops_search() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(BrokenStore { fetch_started: AtomicUsize::new(0), hang_on_fetch: true });
        let system = SemanticSearch::new(
            test_config(temp_dir.path().join("unused")),
            Arc::new(phrases()),
            store.clone()
        );
        let (handle, signal) = cancel_pair();

        let search = system.search_with_cancel("north", SearchLimit::default(), &signal);
        let cancel = async {
            while store.fetch_started.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
            handle.cancel();
        };
        let (outcome, _) = tokio::join!(search, cancel);

        assert!(matches!(outcome, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_before_start_skips_embedding() {
        let (system, _store, _temp_dir) = setup_test_system().await;
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let outcome = system.search_with_cancel("north", SearchLimit::default(), &signal).await;
        assert!(matches!(outcome, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_during_embedding_stops_ingest() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path().join("test_db"));
        let store = Arc::new(SurrealStore::connect(&config.store).await.unwrap());
        let embedder = Arc::new(StalledEmbedder { started: AtomicUsize::new(0) });
        let system = SemanticSearch::new(config, embedder.clone(), store.clone());
        let (handle, signal) = cancel_pair();

        let ingest = system.ingest_with_cancel(Some("a"), "north", &signal);
        let cancel = async {
            while embedder.started.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
            handle.cancel();
        };
        let (outcome, _) = tokio::join!(ingest, cancel);

        assert!(matches!(outcome, Err(EngineError::Cancelled)));
        assert!(store.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_ingest_writes_nothing() {
        let (system, store, _temp_dir) = setup_test_system().await;
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let outcome = system.ingest_with_cancel(Some("a"), "north", &signal).await;
        assert!(matches!(outcome, Err(EngineError::Cancelled)));
        assert!(store.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_large_corpus_scans_on_blocking_pool() {
        let (system, store, _temp_dir) = setup_test_system().await;
        for i in 0..300 {
            store.put_raw(&format!("r{:03}", i), None, json!([1.0, (i % 7) as f64])).await.unwrap();
        }

        let results = system.search("north", SearchLimit::new(3)).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| (r.similarity - 1.0).abs() < 1e-6));
        assert_eq!(ids(&results), vec!["r000", "r007", "r014"]);
    }
}
