//! Record store: JSON ingestion and the flattened search corpus
//!
//! One record per (offer, product) pair, plus one record per offer that has
//! no qualifying products. Text fields are lowercased once at construction so
//! the retrievers never re-lower per query.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::corpus::CorpusIndex;

/// Errors from loading and flattening the source documents.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed source document: {0}")]
    Json(#[from] serde_json::Error),
}

/// A searchable row: one (offer, product) pair, or an offer-only row when the
/// offer has no qualifying products.
///
/// The `*_lower` fields are pre-lowered projections of the scanned text
/// fields, populated by [`RecordStore`] construction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Record {
    pub offer_id: String,
    pub offer_name: String,
    pub offer_price: String,
    pub offer_description: String,
    pub offer_category: String,
    pub offer_program: String,
    pub product_name: String,
    pub product_upc: String,
    pub product_price: f64,
    pub product_image_url: String,
    pub product_department: String,
    pub product_shelf: String,
    pub product_aisle: String,
    pub product_size: String,
    pub product_rating: String,
    pub search_text: String,

    #[serde(skip)]
    pub(crate) search_text_lower: String,
    #[serde(skip)]
    pub(crate) offer_name_lower: String,
    #[serde(skip)]
    pub(crate) product_name_lower: String,
    #[serde(skip)]
    pub(crate) offer_description_lower: String,
    #[serde(skip)]
    pub(crate) offer_category_lower: String,
    #[serde(skip)]
    pub(crate) product_department_lower: String,
    #[serde(skip)]
    pub(crate) product_shelf_lower: String,
}

impl Record {
    /// Space-joined concatenation of the scanned text fields, skipping
    /// empty parts.
    fn build_search_text(&self) -> String {
        let parts = [
            self.offer_name.as_str(),
            self.product_name.as_str(),
            self.offer_description.as_str(),
            self.product_department.as_str(),
            self.product_shelf.as_str(),
            self.offer_category.as_str(),
        ];
        parts
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn prepare(&mut self) {
        self.search_text = self.build_search_text();
        self.search_text_lower = self.search_text.to_lowercase();
        self.offer_name_lower = self.offer_name.to_lowercase();
        self.product_name_lower = self.product_name.to_lowercase();
        self.offer_description_lower = self.offer_description.to_lowercase();
        self.offer_category_lower = self.offer_category.to_lowercase();
        self.product_department_lower = self.product_department.to_lowercase();
        self.product_shelf_lower = self.product_shelf.to_lowercase();
    }
}

// ===== Source document shapes =====

#[derive(Deserialize)]
struct DealsDoc {
    #[serde(default)]
    deals: Vec<DealEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DealEntry {
    offer_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    offer_price: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    offer_pgm: String,
    #[serde(default)]
    end_date: String,
}

#[derive(Deserialize)]
struct ProductsDoc {
    #[serde(default)]
    offers: Vec<OfferProducts>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferProducts {
    offer_id: String,
    #[serde(default)]
    products: Vec<ProductEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    upc: String,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    department_name: String,
    #[serde(default)]
    shelf_name: String,
    #[serde(default)]
    aisle_location: String,
    #[serde(default)]
    disp_item_size_qty: String,
    #[serde(default)]
    disp_unit_of_measure: String,
    #[serde(default)]
    avg_rating: String,
}

/// The immutable record set plus lazily-built derived indices.
///
/// Built once at startup; safe to share across threads for the life of the
/// process. The [`CorpusIndex`] is constructed on first use behind a
/// `OnceCell`, so concurrent first queries race safely.
pub struct RecordStore {
    records: Vec<Record>,
    end_dates: HashMap<String, String>,
    index: OnceCell<CorpusIndex>,
}

impl RecordStore {
    /// Load and flatten the deals + qualifying-products documents from disk.
    pub fn load(deals_path: &Path, products_path: &Path) -> Result<Self, IndexError> {
        let deals_json = std::fs::read_to_string(deals_path)?;
        let products_json = std::fs::read_to_string(products_path)?;
        Self::from_json_strs(&deals_json, &products_json)
    }

    /// Flatten the two source documents into the record set.
    ///
    /// Offers with products produce one record per product; offers without
    /// products produce a single offer-only record.
    pub fn from_json_strs(deals_json: &str, products_json: &str) -> Result<Self, IndexError> {
        let deals: DealsDoc = serde_json::from_str(deals_json)?;
        let products: ProductsDoc = serde_json::from_str(products_json)?;

        let mut product_lookup: HashMap<&str, &[ProductEntry]> = HashMap::new();
        for offer in &products.offers {
            product_lookup.insert(offer.offer_id.as_str(), &offer.products);
        }

        let mut records = Vec::new();
        let mut end_dates = HashMap::new();
        for deal in &deals.deals {
            if !deal.end_date.is_empty() {
                end_dates.insert(deal.offer_id.clone(), deal.end_date.clone());
            }
            let base = Record {
                offer_id: deal.offer_id.clone(),
                offer_name: deal.name.clone(),
                offer_price: deal.offer_price.clone(),
                offer_description: deal.description.clone(),
                offer_category: deal.category.clone(),
                offer_program: deal.offer_pgm.clone(),
                ..Record::default()
            };

            let prods = product_lookup
                .get(deal.offer_id.as_str())
                .copied()
                .unwrap_or(&[]);
            if prods.is_empty() {
                records.push(base);
            } else {
                for prod in prods {
                    let size_parts = [
                        prod.disp_item_size_qty.as_str(),
                        prod.disp_unit_of_measure.as_str(),
                    ];
                    let size = size_parts
                        .iter()
                        .filter(|p| !p.is_empty())
                        .copied()
                        .collect::<Vec<_>>()
                        .join(" ");
                    records.push(Record {
                        product_name: prod.name.clone(),
                        product_upc: prod.upc.clone(),
                        product_price: prod.price,
                        product_image_url: prod.image_url.clone(),
                        product_department: prod.department_name.clone(),
                        product_shelf: prod.shelf_name.clone(),
                        product_aisle: prod.aisle_location.clone(),
                        product_size: size,
                        product_rating: prod.avg_rating.clone(),
                        ..base.clone()
                    });
                }
            }
        }

        tracing::debug!(
            records = records.len(),
            offers = deals.deals.len(),
            "Flattened source documents"
        );
        let mut store = Self::from_records(records);
        store.end_dates = end_dates;
        Ok(store)
    }

    /// Build a store from already-flattened records. `search_text` and the
    /// lowered projections are (re)computed here.
    pub fn from_records(mut records: Vec<Record>) -> Self {
        for rec in &mut records {
            rec.prepare();
        }
        Self {
            records,
            end_dates: HashMap::new(),
            index: OnceCell::new(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Derived indices, built on first access.
    pub fn index(&self) -> &CorpusIndex {
        self.index.get_or_init(|| CorpusIndex::build(&self.records))
    }

    /// All search texts in record order (input to corpus encoding).
    pub fn search_texts(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.search_text.as_str()).collect()
    }

    /// End date for an offer as epoch milliseconds, when present and numeric.
    pub fn end_date_ms(&self, offer_id: &str) -> Option<i64> {
        self.end_dates.get(offer_id)?.parse().ok()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const DEALS_JSON: &str = r#"{
        "deals": [
            {"offerId": "O1", "name": "Yogurt Multipack", "offerPrice": "$1.50 OFF",
             "description": "Save on yogurt", "category": "Dairy, Eggs & Cheese",
             "offerPgm": "MF", "endDate": "1767225600000"},
            {"offerId": "O2", "name": "Paper Towels", "offerPrice": "$2.00 OFF",
             "category": "Paper, Cleaning & Home", "offerPgm": "SC"}
        ]
    }"#;

    const PRODUCTS_JSON: &str = r#"{
        "offers": [
            {"offerId": "O1", "products": [
                {"name": "Greek Yogurt 4-Pack", "upc": "100", "price": 4.99,
                 "departmentName": "Dairy", "shelfName": "Yogurt",
                 "dispItemSizeQty": "4", "dispUnitOfMeasure": "ct"},
                {"name": "Vanilla Yogurt Cup", "upc": "101", "price": 1.29,
                 "departmentName": "Dairy", "shelfName": "Yogurt"}
            ]}
        ]
    }"#;

    #[test]
    fn test_flatten_one_record_per_product() {
        let store = RecordStore::from_json_strs(DEALS_JSON, PRODUCTS_JSON).unwrap();
        let o1: Vec<_> = store
            .records()
            .iter()
            .filter(|r| r.offer_id == "O1")
            .collect();
        assert_eq!(o1.len(), 2);
        assert!(o1.iter().all(|r| !r.product_name.is_empty()));
    }

    #[test]
    fn test_offer_without_products_gets_single_record() {
        let store = RecordStore::from_json_strs(DEALS_JSON, PRODUCTS_JSON).unwrap();
        let o2: Vec<_> = store
            .records()
            .iter()
            .filter(|r| r.offer_id == "O2")
            .collect();
        assert_eq!(o2.len(), 1);
        assert!(o2[0].product_name.is_empty());
    }

    #[test]
    fn test_search_text_skips_empty_parts() {
        let store = RecordStore::from_json_strs(DEALS_JSON, PRODUCTS_JSON).unwrap();
        let o2 = store
            .records()
            .iter()
            .find(|r| r.offer_id == "O2")
            .unwrap();
        // No product fields and no description: name + category only.
        assert_eq!(o2.search_text, "Paper Towels Paper, Cleaning & Home");
        assert!(!o2.search_text.contains("  "));
    }

    #[test]
    fn test_product_size_joined() {
        let store = RecordStore::from_json_strs(DEALS_JSON, PRODUCTS_JSON).unwrap();
        let rec = store
            .records()
            .iter()
            .find(|r| r.product_upc == "100")
            .unwrap();
        assert_eq!(rec.product_size, "4 ct");
        let rec = store
            .records()
            .iter()
            .find(|r| r.product_upc == "101")
            .unwrap();
        assert_eq!(rec.product_size, "");
    }

    #[test]
    fn test_lowered_projections_populated() {
        let store = RecordStore::from_json_strs(DEALS_JSON, PRODUCTS_JSON).unwrap();
        let rec = store
            .records()
            .iter()
            .find(|r| r.product_upc == "100")
            .unwrap();
        assert_eq!(rec.offer_name_lower, "yogurt multipack");
        assert_eq!(rec.product_name_lower, "greek yogurt 4-pack");
        assert_eq!(rec.search_text_lower, rec.search_text.to_lowercase());
    }

    #[test]
    fn test_end_date_parsed() {
        let store = RecordStore::from_json_strs(DEALS_JSON, PRODUCTS_JSON).unwrap();
        assert_eq!(store.end_date_ms("O1"), Some(1_767_225_600_000));
        assert_eq!(store.end_date_ms("O2"), None);
        assert_eq!(store.end_date_ms("missing"), None);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(RecordStore::from_json_strs("{not json", "{}").is_err());
    }
}
