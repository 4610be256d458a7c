//! Semantic retriever: cosine scan over the precomputed embedding matrix
//!
//! Encodes the query, takes the dot product against every row (both sides
//! L2-normalized, so this is cosine similarity), and selects the top-k with
//! a partial-selection pass instead of a full sort.

use crate::embedder::{EmbeddingMatrix, Encoder};
use crate::math;
use crate::record::RecordStore;
use crate::search::SearchError;

/// Semantic search over the record set.
///
/// Returns `(record index, cosine similarity in [-1, 1])` pairs sorted by
/// similarity descending, at most `top_k` of them. A query embedding whose
/// dimensionality does not match the matrix is a programmer error and fails
/// fast.
pub fn semantic_search(
    query: &str,
    store: &RecordStore,
    matrix: &EmbeddingMatrix,
    encoder: &dyn Encoder,
    top_k: usize,
) -> Result<Vec<(usize, f32)>, SearchError> {
    let embedding = encoder.encode_query(query)?;
    if embedding.len() != matrix.dim() {
        return Err(SearchError::DimensionMismatch {
            matrix: matrix.dim(),
            query: embedding.len(),
        });
    }
    debug_assert_eq!(matrix.rows(), store.len());

    let query_vec = embedding.as_slice();
    let scores: Vec<f32> = (0..matrix.rows())
        .map(|i| math::dot(matrix.row(i), query_vec).unwrap_or(f32::MIN))
        .collect();

    let top = math::top_k_desc(&scores, top_k);
    Ok(top.into_iter().map(|i| (i, scores[i])).collect())
}
