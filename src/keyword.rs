//! Keyword retriever: field-weighted conjunctive scan
//!
//! Every query word must appear somewhere in a record's search text for the
//! record to be admitted at all; the score then depends on WHERE each word
//! matched (offer name > product name > description > other fields), with a
//! bonus for whole-word matches over substring matches.

use regex::Regex;

use crate::record::RecordStore;

const OFFER_NAME_WEIGHT: f32 = 3.0;
const PRODUCT_NAME_WEIGHT: f32 = 2.0;
const DESCRIPTION_WEIGHT: f32 = 1.0;
const OTHER_FIELD_WEIGHT: f32 = 0.5;
const WHOLE_WORD_BONUS: f32 = 1.5;

/// One lowercased query word with its precompiled whole-word matcher.
///
/// Compiled once per query, reused across every candidate record.
struct WordMatcher {
    word: String,
    whole_word: Option<Regex>,
}

impl WordMatcher {
    fn new(word: &str) -> Self {
        let pattern = format!(r"\b{}\b", regex::escape(word));
        let whole_word = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(word = %word, error = %e, "Whole-word matcher failed to compile");
                None
            }
        };
        Self {
            word: word.to_string(),
            whole_word,
        }
    }

    fn bonus_in(&self, field: &str) -> f32 {
        match &self.whole_word {
            Some(re) if re.is_match(field) => WHOLE_WORD_BONUS,
            _ => 1.0,
        }
    }
}

/// Case-insensitive keyword search over the record set.
///
/// Returns `(record index, score in (0, 1])` pairs sorted by score
/// descending (ties by record order), at most `top_k` of them. Empty
/// queries return nothing.
pub fn keyword_search(query: &str, store: &RecordStore, top_k: usize) -> Vec<(usize, f32)> {
    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let max_possible = words.len() as f32 * OFFER_NAME_WEIGHT * WHOLE_WORD_BONUS;
    let matchers: Vec<WordMatcher> = words.iter().map(|w| WordMatcher::new(w)).collect();

    let mut results: Vec<(usize, f32)> = Vec::new();
    for (idx, rec) in store.records().iter().enumerate() {
        if !matchers
            .iter()
            .all(|m| rec.search_text_lower.contains(&m.word))
        {
            continue;
        }

        let mut total = 0.0f32;
        for m in &matchers {
            let mut best = 0.0f32;

            let weighted = [
                (rec.offer_name_lower.as_str(), OFFER_NAME_WEIGHT),
                (rec.product_name_lower.as_str(), PRODUCT_NAME_WEIGHT),
                (rec.offer_description_lower.as_str(), DESCRIPTION_WEIGHT),
            ];
            for (field, weight) in weighted {
                if field.contains(&m.word) {
                    best = best.max(weight * m.bonus_in(field));
                }
            }

            let other = [
                rec.offer_category_lower.as_str(),
                rec.product_department_lower.as_str(),
                rec.product_shelf_lower.as_str(),
            ];
            for field in other {
                if field.contains(&m.word) {
                    best = best.max(OTHER_FIELD_WEIGHT * m.bonus_in(field));
                }
            }

            total += best;
        }

        results.push((idx, total / max_possible));
    }

    results.sort_by(|a, b| b.1.total_cmp(&a.1));
    results.truncate(top_k);
    results
}
