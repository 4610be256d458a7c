//! Common test fixtures and helpers
//!
//! Usage in test files:
//! ```ignore
//! mod common;
//! use common::{sample_engine, MockEncoder};
//! ```

// Each test binary compiles this module separately; not every binary uses
// every helper.
#![allow(dead_code)]

use std::sync::Arc;

use dealscout::embedder::{Embedding, EmbeddingMatrix, Encoder, EncoderError};
use dealscout::record::{Record, RecordStore};
use dealscout::search::Engine;

/// Deterministic bag-of-tokens encoder for tests.
///
/// Each whitespace token is hashed onto one dimension, so texts sharing
/// tokens get a positive cosine similarity and unrelated texts stay near
/// zero. No network, no model weights, fully reproducible.
pub struct MockEncoder {
    dim: usize,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self { dim: 64 }
    }

    fn embed(&self, text: &str) -> Embedding {
        let mut v = vec![0.0f32; self.dim];
        for token in text.to_lowercase().split_whitespace() {
            let hash = blake3::hash(token.as_bytes());
            let idx =
                (hash.as_bytes()[0] as usize | (hash.as_bytes()[1] as usize) << 8) % self.dim;
            v[idx] += 1.0;
        }
        Embedding::new(v).normalized()
    }
}

impl Encoder for MockEncoder {
    fn encode_corpus(&self, texts: &[&str]) -> Result<EmbeddingMatrix, EncoderError> {
        EmbeddingMatrix::from_rows(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn encode_query(&self, text: &str) -> Result<Embedding, EncoderError> {
        Ok(self.embed(text))
    }
}

fn make_record(offer_id: &str, offer_name: &str) -> Record {
    Record {
        offer_id: offer_id.to_string(),
        offer_name: offer_name.to_string(),
        offer_price: "$1.00 OFF".to_string(),
        offer_category: "General".to_string(),
        offer_program: "MF".to_string(),
        ..Record::default()
    }
}

#[allow(clippy::too_many_arguments)]
fn with_product(
    offer_id: &str,
    offer_name: &str,
    product_name: &str,
    upc: &str,
    price: f64,
    department: &str,
    shelf: &str,
    aisle: &str,
) -> Record {
    let mut rec = make_record(offer_id, offer_name);
    rec.product_name = product_name.to_string();
    rec.product_upc = upc.to_string();
    rec.product_price = price;
    rec.product_department = department.to_string();
    rec.product_shelf = shelf.to_string();
    rec.product_aisle = aisle.to_string();
    rec
}

/// A small record set covering the search scenarios: offer-name matches,
/// product-only matches, offer-only deals, shared categories, substring
/// traps ("Oatmilk"), and uneven product densities.
pub fn sample_records() -> Vec<Record> {
    let mut records = vec![
        with_product("D1", "Milk Sale", "Whole Milk 1 Gallon", "001", 3.99, "Dairy", "Milk", "Aisle 1"),
        with_product("D1", "Milk Sale", "2% Reduced Fat Milk", "002", 4.29, "Dairy", "Milk", "Aisle 1"),
        with_product("D2", "Dairy Savings", "Organic Whole Milk Half Gallon", "003", 5.49, "Dairy", "Milk", "Aisle 1"),
        with_product("D2", "Dairy Savings", "Cheddar Cheese Block", "004", 6.99, "Dairy", "Cheese", "Aisle 2"),
        with_product("D3", "Chocolate Treats", "Dark Chocolate Bar", "005", 2.99, "Cookies, Snacks & Candy", "Chocolate", ""),
        with_product("D3", "Chocolate Treats", "Chocolate Milk Drink 16oz", "006", 1.99, "Dairy", "Flavored Milk", ""),
        with_product("D5", "Cereal Deals", "Corn Flakes 18oz", "007", 4.49, "Breakfast & Cereal", "Cereal", ""),
        with_product("D6", "Lotion Special", "Hand Lotion 8oz", "008", 7.99, "Personal Care", "Lotion", "Aisle 7"),
        with_product("D7", "Wine Special", "Chardonnay 750ml", "009", 12.99, "Wine, Beer & Spirits", "White Wine", ""),
        with_product("D8", "Beer Deal", "Craft IPA 6-Pack", "010", 9.99, "Wine, Beer & Spirits", "Craft Beer", ""),
        with_product("D9", "Oatmilk Offer", "Planet Oat Oatmilk 64oz", "011", 4.49, "Dairy", "Milk Alternatives", ""),
        with_product("D10", "Candy Bonanza", "Milk Chocolate Truffles", "012", 5.99, "Cookies, Snacks & Candy", "Chocolate", ""),
        with_product("D10", "Candy Bonanza", "Gummy Bears", "013", 3.49, "Cookies, Snacks & Candy", "Candy", ""),
        with_product("D10", "Candy Bonanza", "Sour Patch Kids", "014", 3.99, "Cookies, Snacks & Candy", "Candy", ""),
        with_product("D10", "Candy Bonanza", "Jelly Beans", "015", 2.99, "Cookies, Snacks & Candy", "Candy", ""),
        with_product("D11", "XYZAL Allergy Relief", "XYZAL 24HR Allergy Tablets", "016", 21.99, "Personal Care & Health", "Allergy", ""),
    ];

    for rec in records.iter_mut().filter(|r| r.offer_id == "D2") {
        rec.offer_description = "Save on dairy essentials".to_string();
    }
    for rec in records.iter_mut().filter(|r| r.offer_id == "D7") {
        rec.offer_description = "Save on select wines".to_string();
        rec.offer_category = "Wine, Beer & Spirits".to_string();
    }
    for rec in records.iter_mut().filter(|r| r.offer_id == "D8") {
        rec.offer_category = "Wine, Beer & Spirits".to_string();
    }

    // Offer-only deal: no qualifying products.
    let mut bread = make_record("D4", "Fresh Bread");
    bread.offer_description = "Save on bakery bread".to_string();
    bread.offer_category = "Bakery".to_string();
    records.push(bread);

    records
}

/// Engine over the sample corpus with the mock encoder.
pub fn sample_engine() -> Engine {
    engine_from(sample_records())
}

/// Engine over arbitrary records with the mock encoder.
pub fn engine_from(records: Vec<Record>) -> Engine {
    engine_from_store(RecordStore::from_records(records))
}

/// Engine over a prebuilt store with the mock encoder.
pub fn engine_from_store(store: RecordStore) -> Engine {
    let encoder = MockEncoder::new();
    let matrix = encoder
        .encode_corpus(&store.search_texts())
        .expect("mock encoding never fails");
    Engine::new(store, matrix, Arc::new(MockEncoder::new())).expect("engine construction")
}
