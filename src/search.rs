//! Unified deal search: concurrent fan-out, score fusion, and ranking
//!
//! Runs the keyword, fuzzy, and semantic retrievers in parallel over the
//! same record set, fuses their per-record scores into one composite, then
//! groups records into per-offer deals and applies the post-ranking
//! adjustments (match-density penalty, offer-name boost, gibberish gate,
//! adaptive cutoff). See `keyword.rs` / `fuzzy.rs` / `semantic.rs` for the
//! individual retrievers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::embedder::{EmbeddingMatrix, Encoder, EncoderError};
use crate::fuzzy::{self, fuzzy_search, STRONG_MATCH};
use crate::keyword::keyword_search;
use crate::record::{Record, RecordStore};
use crate::semantic::semantic_search;

/// Default number of deals returned by a search.
pub const DEFAULT_TOP_K: usize = 20;

// Composite weights: keyword dominates, fuzzy and semantic corroborate.
const KEYWORD_WEIGHT: f32 = 0.50;
const FUZZY_WEIGHT: f32 = 0.25;
const SEMANTIC_WEIGHT: f32 = 0.25;
// +0.1 per extra retrieval mode, capped at +0.2.
const MULTI_SOURCE_STEP: f32 = 0.1;
const MULTI_SOURCE_CAP: f32 = 0.2;
// A hit no keyword or fuzzy mode confirmed is halved.
const SEMANTIC_ONLY_DISCOUNT: f32 = 0.5;
// Density fallback for offers with products but none matched.
const DENSITY_FALLBACK: f32 = 0.1;
const OFFER_NAME_BOOST: f32 = 1.2;
// Cutoff: strong top scores keep a longer tail, weak ones trim hard.
const HIGH_CONFIDENCE: f32 = 0.5;
const HIGH_CONFIDENCE_RATIO: f32 = 0.4;
const LOW_CONFIDENCE_RATIO: f32 = 0.7;

/// Errors from the query path.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("Dimension mismatch: matrix is {matrix}-dim, query embedding is {query}-dim")]
    DimensionMismatch { matrix: usize, query: usize },
    #[error("Embedding matrix has {rows} rows but the record set has {records} records")]
    MatrixShape { rows: usize, records: usize },
    #[error("Worker pool error: {0}")]
    Pool(String),
}

/// Which retriever surfaced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Keyword,
    Fuzzy,
    Semantic,
    /// Wildcard listings from the tool wrapper, not a retriever.
    Filter,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Keyword => "keyword",
            Source::Fuzzy => "fuzzy",
            Source::Semantic => "semantic",
            Source::Filter => "filter",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deal surfaced by search, with the matching products that caused it to
/// appear.
#[derive(Debug, Clone, Serialize)]
pub struct Deal {
    pub offer_id: String,
    pub offer_name: String,
    pub offer_price: String,
    pub offer_description: String,
    pub offer_category: String,
    pub offer_program: String,
    pub score: f32,
    pub sources: Vec<Source>,
    pub matching_products: Vec<Record>,
}

impl Deal {
    pub(crate) fn from_record(rec: &Record, score: f32, sources: Vec<Source>) -> Self {
        Self {
            offer_id: rec.offer_id.clone(),
            offer_name: rec.offer_name.clone(),
            offer_price: rec.offer_price.clone(),
            offer_description: rec.offer_description.clone(),
            offer_category: rec.offer_category.clone(),
            offer_program: rec.offer_program.clone(),
            score,
            sources,
            matching_products: Vec::new(),
        }
    }
}

/// The search engine: immutable record set + embedding matrix + encoder,
/// plus the worker pool the retrievers fan out on.
///
/// Built once at startup; any number of queries may run concurrently on top
/// of the shared pool.
pub struct Engine {
    store: RecordStore,
    matrix: EmbeddingMatrix,
    encoder: Arc<dyn Encoder>,
    pool: rayon::ThreadPool,
}

impl Engine {
    /// One worker per retriever.
    const POOL_WORKERS: usize = 3;

    pub fn new(
        store: RecordStore,
        matrix: EmbeddingMatrix,
        encoder: Arc<dyn Encoder>,
    ) -> Result<Self, SearchError> {
        if matrix.rows() != store.len() {
            return Err(SearchError::MatrixShape {
                rows: matrix.rows(),
                records: store.len(),
            });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(Self::POOL_WORKERS)
            .thread_name(|i| format!("dealscout-search-{i}"))
            .build()
            .map_err(|e| SearchError::Pool(e.to_string()))?;
        Ok(Self {
            store,
            matrix,
            encoder,
            pool,
        })
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Run all three retrieval modes concurrently, then group matched
    /// records into unique deals.
    ///
    /// Returns at most `top_k` deals sorted by composite score descending,
    /// trimmed by the adaptive cutoff. An empty (or whitespace) query and a
    /// query that matches nothing both return an empty list, not an error.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<Deal>, SearchError> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        // Over-fetch so grouping and the density pass see every relevant
        // record, not just the head of each mode's ranking.
        let fetch_k = (top_k * 10).max(500);

        let (kw_results, (fz_results, sm_results)) = self.pool.install(|| {
            rayon::join(
                || keyword_search(query, &self.store, fetch_k),
                || {
                    rayon::join(
                        || fuzzy_search(query, &self.store, fuzzy::DEFAULT_THRESHOLD, fetch_k),
                        || {
                            semantic_search(
                                query,
                                &self.store,
                                &self.matrix,
                                self.encoder.as_ref(),
                                fetch_k,
                            )
                        },
                    )
                },
            )
        });
        let sm_results = sm_results?;

        tracing::debug!(
            query = %query,
            keyword = kw_results.len(),
            fuzzy = fz_results.len(),
            semantic = sm_results.len(),
            "Retriever fan-out complete"
        );

        Ok(fuse_and_group(
            query,
            &self.store,
            &kw_results,
            &fz_results,
            &sm_results,
            top_k,
        ))
    }
}

/// Per-record scores from the three modes. `None` = not retrieved by that
/// mode (distinct from a 0.0 score, which semantic can legitimately produce).
#[derive(Default, Clone, Copy)]
struct ModeScores {
    keyword: Option<f32>,
    fuzzy: Option<f32>,
    semantic: Option<f32>,
}

impl ModeScores {
    fn present(&self) -> usize {
        self.keyword.is_some() as usize
            + self.fuzzy.is_some() as usize
            + self.semantic.is_some() as usize
    }

    fn sources(&self) -> Vec<Source> {
        let mut out = Vec::with_capacity(3);
        if self.keyword.is_some() {
            out.push(Source::Keyword);
        }
        if self.fuzzy.is_some() {
            out.push(Source::Fuzzy);
        }
        if self.semantic.is_some() {
            out.push(Source::Semantic);
        }
        out
    }
}

/// Fuse per-mode record scores, group records into deals, and apply the
/// post-ranking adjustments. Deterministic for fixed inputs: ties break by
/// record order, then by first-seen deal order.
pub(crate) fn fuse_and_group(
    query: &str,
    store: &RecordStore,
    kw_results: &[(usize, f32)],
    fz_results: &[(usize, f32)],
    sm_results: &[(usize, f32)],
    top_k: usize,
) -> Vec<Deal> {
    let records = store.records();
    let index = store.index();
    let query_lower = query.to_lowercase();

    // Per-offer matched-product tallies for the density penalty.
    let mut kw_product_counts: HashMap<&str, usize> = HashMap::new();
    for (idx, _) in kw_results {
        let rec = &records[*idx];
        if !rec.product_name.is_empty() {
            *kw_product_counts.entry(rec.offer_id.as_str()).or_insert(0) += 1;
        }
    }
    let mut fz_product_counts: HashMap<&str, usize> = HashMap::new();
    for (idx, score) in fz_results {
        let rec = &records[*idx];
        if !rec.product_name.is_empty() && *score >= STRONG_MATCH {
            *fz_product_counts.entry(rec.offer_id.as_str()).or_insert(0) += 1;
        }
    }

    // Gibberish gate: no keyword hit, no strong fuzzy hit, and no query
    // token anywhere in the corpus means the query is noise. Without this,
    // semantic retrieval would manufacture results for any typed junk.
    let has_strong_fuzzy = fz_results.iter().any(|(_, s)| *s >= STRONG_MATCH);
    let has_corpus_word = query_lower
        .split_whitespace()
        .any(|w| index.contains_word(w));
    if kw_results.is_empty() && !has_strong_fuzzy && !has_corpus_word {
        tracing::debug!(query = %query, "Gibberish gate rejected query");
        return Vec::new();
    }

    // Collect per-mode scores per record, preserving first-seen order
    // (keyword hits first, then fuzzy, then semantic).
    fn upsert<'m>(
        order: &mut Vec<usize>,
        modes: &'m mut HashMap<usize, ModeScores>,
        idx: usize,
    ) -> &'m mut ModeScores {
        modes.entry(idx).or_insert_with(|| {
            order.push(idx);
            ModeScores::default()
        })
    }

    let mut order: Vec<usize> = Vec::new();
    let mut modes: HashMap<usize, ModeScores> = HashMap::new();
    for (idx, score) in kw_results {
        let m = upsert(&mut order, &mut modes, *idx);
        m.keyword = Some(m.keyword.map_or(*score, |s| s.max(*score)));
    }
    for (idx, score) in fz_results {
        let m = upsert(&mut order, &mut modes, *idx);
        let normalized = *score / 100.0;
        m.fuzzy = Some(m.fuzzy.map_or(normalized, |s| s.max(normalized)));
    }
    for (idx, score) in sm_results {
        let m = upsert(&mut order, &mut modes, *idx);
        m.semantic = Some(m.semantic.map_or(*score, |s| s.max(*score)));
    }

    // Group scored records by offer.
    let mut deal_order: Vec<&str> = Vec::new();
    let mut deals: HashMap<&str, Deal> = HashMap::new();
    for idx in &order {
        let m = modes[idx];
        let kw = m.keyword.unwrap_or(0.0);
        let mut fz = m.fuzzy.unwrap_or(0.0);
        let sm = m.semantic.unwrap_or(0.0);

        // Cap fuzzy to the keyword score when both matched: fuzzy exists to
        // recover typos (keyword = 0), not to inflate exact matches.
        if kw > 0.0 && fz > 0.0 {
            fz = fz.min(kw);
        }

        let mut composite = KEYWORD_WEIGHT * kw + FUZZY_WEIGHT * fz + SEMANTIC_WEIGHT * sm;
        composite +=
            ((m.present().saturating_sub(1)) as f32 * MULTI_SOURCE_STEP).min(MULTI_SOURCE_CAP);
        if m.keyword.is_none() && m.fuzzy.is_none() {
            composite *= SEMANTIC_ONLY_DISCOUNT;
        }

        let rec = &records[*idx];
        let sources = m.sources();
        match deals.get_mut(rec.offer_id.as_str()) {
            Some(deal) => {
                deal.score = deal.score.max(composite);
                for s in sources {
                    if !deal.sources.contains(&s) {
                        deal.sources.push(s);
                    }
                }
            }
            None => {
                deal_order.push(rec.offer_id.as_str());
                deals.insert(
                    rec.offer_id.as_str(),
                    Deal::from_record(rec, composite, sources),
                );
            }
        }
        if !rec.product_name.is_empty() {
            if let Some(deal) = deals.get_mut(rec.offer_id.as_str()) {
                deal.matching_products.push(rec.clone());
            }
        }
    }

    // Match-density penalty: a deal that surfaced only a sliver of its
    // products for this query is a weaker answer than one where most
    // products matched. Keyword counts are the primary density signal;
    // fuzzy counts take over for typo queries where keyword found nothing;
    // with neither, density is meaningless and skipped.
    let density_counts = if !kw_product_counts.is_empty() {
        Some(&kw_product_counts)
    } else if !fz_product_counts.is_empty() {
        Some(&fz_product_counts)
    } else {
        None
    };
    if let Some(counts) = density_counts {
        for oid in &deal_order {
            let Some(deal) = deals.get_mut(oid) else {
                continue;
            };
            let total = index.product_count(oid);
            if total == 0 {
                continue;
            }
            let matched = counts.get(oid).copied().unwrap_or(0);
            let density = if matched > 0 {
                matched as f32 / total as f32
            } else {
                DENSITY_FALLBACK
            };
            deal.score *= 0.3 + 0.7 * density;
        }
    }

    // Offer-name relevance boost: deals whose name matches the query beat
    // deals surfaced only through product-level matches. The fuzzy branch
    // keeps the boost typo-tolerant ("choclate" still boosts "Chocolate
    // Treats").
    let query_words: Vec<&str> = query_lower.split_whitespace().collect();
    for deal in deals.values_mut() {
        let name_lower = deal.offer_name.to_lowercase();
        if query_words.iter().any(|w| name_lower.contains(w))
            || fuzzy::partial_ratio(&query_lower, &name_lower) >= STRONG_MATCH
        {
            deal.score *= OFFER_NAME_BOOST;
        }
    }

    let mut results: Vec<Deal> = deal_order
        .into_iter()
        .filter_map(|oid| deals.remove(oid))
        .collect();
    results.retain(|d| d.score > 0.0);
    // Stable sort: equal scores keep first-seen deal order.
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(top_k);

    // Adaptive cutoff: high-confidence result sets keep a meaningful tail,
    // low-confidence ones (typos, weak matches) trim noise aggressively.
    if let Some(top_score) = results.first().map(|d| d.score) {
        let ratio = if top_score >= HIGH_CONFIDENCE {
            HIGH_CONFIDENCE_RATIO
        } else {
            LOW_CONFIDENCE_RATIO
        };
        let cutoff = top_score * ratio;
        results.retain(|d| d.score >= cutoff);
    }

    results
}
