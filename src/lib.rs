//! # dealscout - Hybrid Deal Search
//!
//! Search engine for a grocery deals/coupons dataset. Three retrievers
//! (keyword, fuzzy, semantic) run concurrently over a flattened
//! (offer x product) record set; their scores are fused, grouped into
//! per-offer deals, and post-ranked so exact matches stay precise, typos
//! recover, and nonsense queries return nothing.
//!
//! ## Features
//!
//! - **Keyword retrieval**: field-weighted conjunctive scan with a
//!   whole-word bonus
//! - **Fuzzy retrieval**: partial-ratio matching over offer and product
//!   names (typo recovery)
//! - **Semantic retrieval**: cosine similarity against a precomputed,
//!   L2-normalized embedding matrix
//! - **Deal grouping**: per-offer results annotated with the products that
//!   caused them to match
//! - **Query expansion**: LLM-assisted multi-term search for thematic
//!   queries ("BBQ essentials")
//! - **Tool surface**: deduped, expiry-filterable entry point for the
//!   conversational assistant
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dealscout::embedder::{Encoder, HttpEncoder};
//! use dealscout::record::RecordStore;
//! use dealscout::search::{Engine, DEFAULT_TOP_K};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = RecordStore::load(
//!     std::path::Path::new("deals.json"),
//!     std::path::Path::new("qualifying-products.json"),
//! )?;
//! let encoder = HttpEncoder::new(
//!     "http://127.0.0.1:8080/v1/embeddings",
//!     "sentence-transformers/all-MiniLM-L6-v2",
//!     None,
//! )?;
//! let matrix = encoder.encode_corpus(&store.search_texts())?;
//! let engine = Engine::new(store, matrix, Arc::new(encoder))?;
//!
//! for deal in engine.search("chocolate", DEFAULT_TOP_K)? {
//!     println!("{} [{:.3}] {}", deal.offer_name, deal.score, deal.offer_price);
//! }
//! # Ok(())
//! # }
//! ```
//!
// Public library API modules
pub mod cache;
pub mod config;
pub mod corpus;
pub mod embedder;
pub mod expand;
pub mod fuzzy;
pub mod keyword;
pub mod record;
pub mod search;
pub mod semantic;
pub mod tool;

// Internal modules
pub(crate) mod math;

pub use embedder::{Embedding, EmbeddingMatrix, Encoder, EncoderError, HttpEncoder};
pub use expand::{search_expanded, ExpandedSearch, LlmExpander, QueryExpander};
pub use fuzzy::fuzzy_search;
pub use keyword::keyword_search;
pub use record::{IndexError, Record, RecordStore};
pub use search::{Deal, Engine, SearchError, Source, DEFAULT_TOP_K};
pub use semantic::semantic_search;
pub use tool::{run_deal_tool, ExpiryWindow, ToolRequest};
