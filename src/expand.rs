//! Query expansion for natural-language searches
//!
//! A [`QueryExpander`] turns a thematic query ("BBQ essentials") into a
//! comma-separated list of concrete product terms. The adapter searches the
//! core once per term, merges by offer keeping the best score, boosts offers
//! hit by several terms, and trims the merged tail with its own cutoff.
//! Expansion is best-effort throughout: any failure falls back to a single
//! direct search.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use serde::Deserialize;

use crate::search::{Deal, Engine, SearchError};

/// Per-extra-term score boost, capped at 3 extra terms (1.3x total).
const TERM_HIT_STEP: f32 = 0.1;
const TERM_HIT_CAP: usize = 3;
/// Cutoff ratio applied to the merged multi-term ranking.
const MERGED_CUTOFF_RATIO: f32 = 0.45;

/// Maps a natural-language query to concrete product terms.
///
/// Returns `None` when the query needs no expansion (already specific, too
/// short, or the expansion backend is unavailable).
pub trait QueryExpander: Send + Sync {
    fn expand(&self, query: &str) -> Option<String>;
}

/// Outcome of an expansion-aware search.
pub struct ExpandedSearch {
    /// The comma-separated expansion actually used, if any.
    pub expanded: Option<String>,
    pub deals: Vec<Deal>,
}

/// Search with optional query expansion.
///
/// With no expander, or when expansion declines the query, this is exactly
/// one core search. With an expansion, each term is searched with the same
/// `top_k` and the results are merged per offer.
pub fn search_expanded(
    engine: &Engine,
    expander: Option<&dyn QueryExpander>,
    query: &str,
    top_k: usize,
) -> Result<ExpandedSearch, SearchError> {
    if let Some(exp) = expander {
        if let Some(expanded) = exp.expand(query) {
            let terms: Vec<&str> = expanded
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            if !terms.is_empty() {
                tracing::debug!(query = %query, terms = terms.len(), "Expanded query");
                let deals = merge_term_searches(engine, &terms, top_k)?;
                return Ok(ExpandedSearch {
                    expanded: Some(expanded),
                    deals,
                });
            }
        }
    }
    Ok(ExpandedSearch {
        expanded: None,
        deals: engine.search(query, top_k)?,
    })
}

/// Search each term, merge by offer keeping the best-scoring variant, and
/// boost offers matched by multiple terms (more relevant to the theme).
fn merge_term_searches(
    engine: &Engine,
    terms: &[&str],
    top_k: usize,
) -> Result<Vec<Deal>, SearchError> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: Vec<Deal> = Vec::new();
    let mut term_hits: Vec<usize> = Vec::new();

    for term in terms {
        for deal in engine.search(term, top_k)? {
            match order.iter().position(|oid| *oid == deal.offer_id) {
                Some(pos) => {
                    term_hits[pos] += 1;
                    if deal.score > merged[pos].score {
                        merged[pos] = deal;
                    }
                }
                None => {
                    order.push(deal.offer_id.clone());
                    term_hits.push(1);
                    merged.push(deal);
                }
            }
        }
    }

    for (deal, hits) in merged.iter_mut().zip(&term_hits) {
        if *hits >= 2 {
            deal.score *= 1.0 + TERM_HIT_STEP * (hits - 1).min(TERM_HIT_CAP) as f32;
        }
    }

    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged.truncate(top_k);
    if let Some(top_score) = merged.first().map(|d| d.score) {
        let cutoff = top_score * MERGED_CUTOFF_RATIO;
        merged.retain(|d| d.score >= cutoff);
    }
    Ok(merged)
}

// ===== LLM-backed expander =====

const SYSTEM_PROMPT: &str = "You are a grocery store search query expander for a deals/coupons database. \
Given a natural language search query, output ONLY a comma-separated list of specific \
product names or brands. Keep to 8-12 terms max. Output ONLY the list, nothing else.\n\n\
IMPORTANT: Only suggest products that fall within these store categories:\n\
- Beverages (juice, soda, water, coffee, tea, sports drinks)\n\
- Bread & Bakery (bread, rolls, tortillas, baked goods)\n\
- Breakfast & Cereal (cereal, oatmeal, pancake mix, syrup)\n\
- Canned Goods & Soups (canned vegetables, soup, broth, beans)\n\
- Condiments, Spices & Bake (sauces, ketchup, mustard, spices, baking)\n\
- Cookies, Snacks & Candy (chips, crackers, cookies, nuts, candy)\n\
- Dairy, Eggs & Cheese (milk, yogurt, cheese, eggs, butter)\n\
- Deli (deli meats, prepared meals, sandwiches)\n\
- Frozen Foods (frozen pizza, ice cream, frozen meals, waffles)\n\
- Fruits & Vegetables (fresh produce, salads)\n\
- Grains, Pasta & Sides (pasta, rice, mac & cheese)\n\
- International Cuisine (Asian sauces, Mexican foods, ethnic items)\n\
- Meat & Seafood (chicken, beef, pork, salmon, shrimp)\n\
- Paper, Cleaning & Home (paper towels, detergent, cleaning spray, trash bags)\n\
- Personal Care & Health (medicine, vitamins, shampoo, lotion, oral care)\n\
- Pet Care (dog food, cat food, treats, litter)\n\
- Baby Care (diapers, wipes, baby food, formula)\n\
- Wine, Beer & Spirits (beer, wine, vodka, whiskey, rum)\n\n\
Do NOT suggest items outside these categories (no balloons, decorations, electronics, \
clothing, toys, etc.).\n\n\
If the query is already a specific product name (e.g. 'milk', 'Coca Cola', \
'chicken breast'), respond with just PASS.";

const EXPANSION_CACHE_SIZE: usize = 128;

/// Expander backed by an OpenAI-compatible chat-completions endpoint.
///
/// Single-word queries short-circuit without a request; a `PASS` reply and
/// every failure mode collapse to `None` so search degrades gracefully.
/// Replies are cached per lowercased query.
pub struct LlmExpander {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
    cache: Mutex<LruCache<String, Option<String>>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl LlmExpander {
    pub const DEFAULT_ENDPOINT: &'static str =
        "https://api.groq.com/openai/v1/chat/completions";
    pub const DEFAULT_MODEL: &'static str = "llama-3.1-8b-instant";

    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap_or_default();
        let cache_size = NonZeroUsize::new(EXPANSION_CACHE_SIZE)
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Build from `GROQ_API_KEY`, or `None` when no key is configured.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GROQ_API_KEY").ok()?;
        if api_key.is_empty() {
            return None;
        }
        Some(Self::new(
            Self::DEFAULT_ENDPOINT,
            Self::DEFAULT_MODEL,
            api_key,
        ))
    }

    fn request_expansion(&self, query: &str) -> Option<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 200,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": query},
            ],
        });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();
        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(status = %r.status(), "Query expansion request rejected");
                return None;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Query expansion request failed");
                return None;
            }
        };
        let parsed: ChatResponse = match response.json() {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "Malformed expansion response");
                return None;
            }
        };
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)?
            .trim()
            .to_string();
        if text.is_empty() || text.eq_ignore_ascii_case("PASS") {
            return None;
        }
        Some(text)
    }
}

impl QueryExpander for LlmExpander {
    fn expand(&self, query: &str) -> Option<String> {
        // Single-word queries are already concrete product terms.
        if query.split_whitespace().count() <= 1 {
            return None;
        }
        let key = query.trim().to_lowercase();

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }
        let result = self.request_expansion(&key);
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, result.clone());
        }
        result
    }
}
