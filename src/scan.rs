//! Exact linear scan over the stored corpus.
//!
//! Every query compares against every stored vector: O(N·D) with no index.
//! That is only viable while the corpus fits the configured scan budget;
//! past it the scan still runs in full and a warning is logged.

use tracing::{ debug, warn };

use crate::cancel::CancelSignal;
use crate::error::EngineError;
use crate::models::{ EmbeddingVector, ScoredResult, StoredRecord };
use crate::similarity::cosine_similarity;
use crate::validate::validate;

// Candidates scored between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub scanned: usize,
    pub rejected: usize,
    pub wrong_dimension: usize,
    pub incomparable: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct CorpusScanner {
    expected_dim: usize,
    scan_budget: usize,
}

impl CorpusScanner {
    pub fn new(expected_dim: usize, scan_budget: usize) -> Self {
        Self { expected_dim, scan_budget }
    }

    /// Scores every usable candidate against `query`, in corpus order.
    ///
    /// Bad rows are dropped and counted, never surfaced. The only error is
    /// cancellation, which discards everything scored so far.
    pub fn scan<I>(
        &self,
        query: &EmbeddingVector,
        candidates: I,
        cancel: &CancelSignal
    ) -> Result<(Vec<ScoredResult>, ScanStats), EngineError>
        where I: IntoIterator<Item = StoredRecord>, I::IntoIter: ExactSizeIterator
    {
        let candidates = candidates.into_iter();
        if candidates.len() > self.scan_budget {
            warn!(
                corpus = candidates.len(),
                budget = self.scan_budget,
                "Corpus exceeds the linear scan budget; search latency will grow with it"
            );
        }

        let mut stats = ScanStats::default();
        let mut results = Vec::with_capacity(candidates.len());

        for (position, record) in candidates.enumerate() {
            if position % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                debug!(position, "Scan cancelled");
                return Err(EngineError::Cancelled);
            }
            stats.scanned += 1;

            let vector = match validate(record.embedding.as_ref()) {
                Ok(vector) => vector,
                Err(reason) => {
                    debug!(id = %record.id, ?reason, "Skipping unusable embedding");
                    stats.rejected += 1;
                    continue;
                }
            };

            if vector.len() != self.expected_dim {
                debug!(
                    id = %record.id,
                    found = vector.len(),
                    expected = self.expected_dim,
                    "Skipping embedding with wrong dimension"
                );
                stats.wrong_dimension += 1;
                continue;
            }

            match cosine_similarity(query.as_slice(), vector.as_slice()) {
                Ok(similarity) =>
                    results.push(ScoredResult {
                        id: record.id,
                        content: record.content,
                        similarity,
                    }),
                Err(reason) => {
                    debug!(id = %record.id, ?reason, "Skipping incomparable embedding");
                    stats.incomparable += 1;
                }
            }
        }

        if cancel.is_cancelled() {
            debug!(scanned = stats.scanned, "Scan cancelled after the last candidate");
            return Err(EngineError::Cancelled);
        }

        Ok((results, stats))
    }
}
