//! Tool surface for the conversational layer
//!
//! The chat assistant calls deal search as a tool, possibly several times
//! per turn. This wrapper merges those calls into one deduplicated list,
//! supports a `*` wildcard for "everything, I only care about expiry", and
//! filters by an expiry window computed from each offer's end date.

use std::collections::HashSet;

use chrono::Utc;
use serde::Deserialize;

use crate::record::RecordStore;
use crate::search::{Deal, Engine, SearchError, Source};

/// Wildcard query matching every deal (useful with an expiry filter).
pub const WILDCARD_QUERY: &str = "*";
/// Cap on wildcard listings.
const WILDCARD_LIMIT: usize = 200;

const MS_PER_DAY: i64 = 1000 * 60 * 60 * 24;

/// Expiry window for filtering deals by their end date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryWindow {
    Today,
    Week,
    Month,
}

impl ExpiryWindow {
    pub fn max_days(self) -> i64 {
        match self {
            ExpiryWindow::Today => 0,
            ExpiryWindow::Week => 7,
            ExpiryWindow::Month => 30,
        }
    }
}

/// One `search_deals` tool invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolRequest {
    pub query: String,
    #[serde(default = "default_tool_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub expiry: Option<ExpiryWindow>,
}

fn default_tool_top_k() -> usize {
    8
}

impl ToolRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: default_tool_top_k(),
            expiry: None,
        }
    }
}

/// Whole days until an end date, clamped at zero (already-expired deals
/// count as expiring today).
pub fn days_until_expiry(end_ms: i64, now_ms: i64) -> i64 {
    ((end_ms - now_ms) / MS_PER_DAY).max(0)
}

/// Deduplicate merged tool results by offer, keeping the highest-scoring
/// variant of each, then restore score order.
pub fn dedupe_by_offer(deals: Vec<Deal>) -> Vec<Deal> {
    let mut unique: Vec<Deal> = Vec::with_capacity(deals.len());
    for deal in deals {
        match unique.iter_mut().find(|d| d.offer_id == deal.offer_id) {
            Some(existing) => {
                if deal.score > existing.score {
                    *existing = deal;
                }
            }
            None => unique.push(deal),
        }
    }
    unique.sort_by(|a, b| b.score.total_cmp(&a.score));
    unique
}

/// Keep deals whose end date falls within the window. Deals without a
/// usable end date are dropped.
pub fn filter_by_expiry(
    deals: Vec<Deal>,
    window: ExpiryWindow,
    end_date_ms: impl Fn(&str) -> Option<i64>,
    now_ms: i64,
) -> Vec<Deal> {
    let max_days = window.max_days();
    deals
        .into_iter()
        .filter(|deal| match end_date_ms(&deal.offer_id) {
            Some(end_ms) => days_until_expiry(end_ms, now_ms) <= max_days,
            None => false,
        })
        .collect()
}

/// One offer-level listing per distinct offer, in record order.
fn list_all_deals(store: &RecordStore) -> Vec<Deal> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut deals = Vec::new();
    for rec in store.records() {
        if seen.insert(rec.offer_id.as_str()) {
            deals.push(Deal::from_record(rec, 1.0, vec![Source::Filter]));
            if deals.len() >= WILDCARD_LIMIT {
                break;
            }
        }
    }
    deals
}

/// Execute one tool invocation against the engine.
pub fn run_deal_tool(engine: &Engine, request: &ToolRequest) -> Result<Vec<Deal>, SearchError> {
    let deals = if request.query == WILDCARD_QUERY {
        list_all_deals(engine.store())
    } else {
        engine.search(&request.query, request.top_k)?
    };
    let deals = dedupe_by_offer(deals);
    match request.expiry {
        Some(window) => {
            let now_ms = Utc::now().timestamp_millis();
            Ok(filter_by_expiry(
                deals,
                window,
                |oid| engine.store().end_date_ms(oid),
                now_ms,
            ))
        }
        None => Ok(deals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::record;

    fn deal(offer_id: &str, score: f32) -> Deal {
        let rec = record(offer_id, &format!("{offer_id} name"));
        Deal::from_record(&rec, score, vec![Source::Keyword])
    }

    #[test]
    fn test_days_until_expiry() {
        let now = 1_000 * MS_PER_DAY;
        assert_eq!(days_until_expiry(now, now), 0);
        assert_eq!(days_until_expiry(now + 7 * MS_PER_DAY, now), 7);
        // Partial days truncate down.
        assert_eq!(days_until_expiry(now + MS_PER_DAY - 1, now), 0);
        // Already expired clamps to zero.
        assert_eq!(days_until_expiry(now - 3 * MS_PER_DAY, now), 0);
    }

    #[test]
    fn test_dedupe_keeps_best_variant() {
        let deals = vec![deal("A", 0.4), deal("B", 0.9), deal("A", 0.7)];
        let unique = dedupe_by_offer(deals);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].offer_id, "B");
        assert_eq!(unique[1].offer_id, "A");
        assert!((unique[1].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_filter_by_expiry_windows() {
        let now = 0;
        let end_dates = |oid: &str| -> Option<i64> {
            match oid {
                "A" => Some(MS_PER_DAY / 2),       // expires today
                "B" => Some(5 * MS_PER_DAY),       // this week
                "C" => Some(20 * MS_PER_DAY),      // this month
                "D" => Some(45 * MS_PER_DAY),      // beyond
                _ => None,                          // no end date
            }
        };
        let all = || vec![deal("A", 0.9), deal("B", 0.8), deal("C", 0.7), deal("D", 0.6), deal("E", 0.5)];

        let today = filter_by_expiry(all(), ExpiryWindow::Today, end_dates, now);
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].offer_id, "A");

        let week = filter_by_expiry(all(), ExpiryWindow::Week, end_dates, now);
        let ids: Vec<&str> = week.iter().map(|d| d.offer_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);

        let month = filter_by_expiry(all(), ExpiryWindow::Month, end_dates, now);
        assert_eq!(month.len(), 3);
    }

    #[test]
    fn test_filter_drops_missing_end_dates() {
        let deals = vec![deal("X", 0.9)];
        let filtered = filter_by_expiry(deals, ExpiryWindow::Month, |_| None, 0);
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_wildcard_listing_unique_offers() {
        let store = crate::record::fixtures::sample_store();
        let deals = list_all_deals(&store);
        let ids: Vec<&str> = deals.iter().map(|d| d.offer_id.as_str()).collect();
        let mut unique = ids.clone();
        unique.dedup();
        assert_eq!(ids, unique);
        assert_eq!(deals.len(), 10);
        for d in &deals {
            assert_eq!(d.sources, vec![Source::Filter]);
            assert!((d.score - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_tool_request_defaults() {
        let req: ToolRequest =
            serde_json::from_str(r#"{"query": "milk"}"#).unwrap();
        assert_eq!(req.top_k, 8);
        assert!(req.expiry.is_none());

        let req: ToolRequest =
            serde_json::from_str(r#"{"query": "*", "expiry": "week"}"#).unwrap();
        assert_eq!(req.expiry, Some(ExpiryWindow::Week));
    }
}
