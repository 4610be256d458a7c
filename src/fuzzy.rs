//! Fuzzy retriever: partial-ratio matching over the two name lists
//!
//! Scores each record's offer name and product name against the query with
//! a partial-ratio similarity (best alignment of the shorter string inside
//! the longer, scaled to 0-100) and keeps the better of the two. This is
//! the typo-recovery path: "choclate" still lands on "Chocolate Treats".
//!
//! Partial-ratio is used instead of token-set or weighted variants: it is
//! 2-3x faster and short product/offer names don't need the extra machinery.

use rapidfuzz::fuzz;

use crate::record::RecordStore;

/// Default admission threshold for direct fuzzy retrieval.
pub const DEFAULT_THRESHOLD: f32 = 60.0;

/// Score at which a fuzzy hit counts as a strong match (typo-density path,
/// gibberish gate, offer-name boost).
pub const STRONG_MATCH: f32 = 80.0;

/// Partial-ratio similarity between two strings in [0, 100].
///
/// Empty inputs score 0 so records without a product name never match.
pub(crate) fn partial_ratio(a: &str, b: &str) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    fuzz::partial_ratio(a.chars(), b.chars()) as f32
}

/// Fuzzy search against offer and product names. Handles typos.
///
/// Returns `(record index, score in [threshold, 100])` pairs sorted by
/// score descending (ties by record order), at most `top_k` of them.
/// Expects the query already in any case; it is lowercased once here.
pub fn fuzzy_search(
    query: &str,
    store: &RecordStore,
    threshold: f32,
    top_k: usize,
) -> Vec<(usize, f32)> {
    let query_lower = query.to_lowercase();
    if query_lower.is_empty() {
        return Vec::new();
    }

    let mut results: Vec<(usize, f32)> = Vec::new();
    for (idx, rec) in store.records().iter().enumerate() {
        let offer_score = partial_ratio(&query_lower, &rec.offer_name_lower);
        let product_score = partial_ratio(&query_lower, &rec.product_name_lower);
        let best = offer_score.max(product_score);
        if best >= threshold {
            results.push((idx, best));
        }
    }

    results.sort_by(|a, b| b.1.total_cmp(&a.1));
    results.truncate(top_k);
    results
}
