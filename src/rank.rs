use std::cmp::Ordering;

use crate::models::{ ScoredResult, SearchLimit };

/// Orders by similarity, highest first, and keeps the top `limit`.
///
/// Equal scores keep their scan order (`sort_by` is stable), so the same
/// corpus, query and limit always produce the same list.
pub fn select(mut results: Vec<ScoredResult>, limit: SearchLimit) -> Vec<ScoredResult> {
    results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
    results.truncate(limit.get());
    results
}
