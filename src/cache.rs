//! On-disk cache for the corpus embedding matrix
//!
//! Encoding the corpus is the slow part of startup, so the matrix is
//! persisted next to a blake3 hash of the source documents. The cache is
//! only reused when the hash and the record count still match; anything
//! stale or unreadable falls back to re-encoding.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::embedder::EmbeddingMatrix;
use crate::record::IndexError;

const META_FILE: &str = "meta.json";
const EMBEDDINGS_FILE: &str = "embeddings.bin";

#[derive(Serialize, Deserialize)]
struct CacheMeta {
    rows: usize,
    dim: usize,
    source_hash: String,
}

/// Content hash of the two source documents, used as the cache key.
/// Length-framed so document boundaries can't alias.
pub fn source_hash(deals_json: &str, products_json: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    for doc in [deals_json, products_json] {
        hasher.update(&(doc.len() as u64).to_le_bytes());
        hasher.update(doc.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Persist the matrix and its provenance under `dir` (created if missing).
pub fn save(dir: &Path, matrix: &EmbeddingMatrix, source_hash: &str) -> Result<(), IndexError> {
    std::fs::create_dir_all(dir)?;
    let meta = CacheMeta {
        rows: matrix.rows(),
        dim: matrix.dim(),
        source_hash: source_hash.to_string(),
    };
    std::fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(&meta)?)?;
    std::fs::write(
        dir.join(EMBEDDINGS_FILE),
        bytemuck::cast_slice::<f32, u8>(matrix.as_flat()),
    )?;
    tracing::debug!(rows = meta.rows, dim = meta.dim, dir = %dir.display(), "Saved embedding cache");
    Ok(())
}

/// Load a cached matrix if it matches the current sources.
///
/// Returns `Ok(None)` when there is no cache, the hash or record count
/// changed, or the payload doesn't match its metadata; only real IO
/// failures are errors.
pub fn load(
    dir: &Path,
    expected_hash: &str,
    expected_rows: usize,
) -> Result<Option<EmbeddingMatrix>, IndexError> {
    let meta_path = dir.join(META_FILE);
    let meta_bytes = match std::fs::read(&meta_path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let meta: CacheMeta = match serde_json::from_slice(&meta_bytes) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(path = %meta_path.display(), error = %e, "Unreadable cache metadata, re-encoding");
            return Ok(None);
        }
    };
    if meta.source_hash != expected_hash {
        tracing::debug!("Source documents changed, embedding cache is stale");
        return Ok(None);
    }
    if meta.rows != expected_rows {
        tracing::warn!(
            cached = meta.rows,
            expected = expected_rows,
            "Cache row count mismatch, re-encoding"
        );
        return Ok(None);
    }

    let bytes = match std::fs::read(dir.join(EMBEDDINGS_FILE)) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if bytes.len() != meta.rows * meta.dim * std::mem::size_of::<f32>() {
        tracing::warn!("Embedding cache payload truncated, re-encoding");
        return Ok(None);
    }

    // cast_slice needs 4-byte alignment; a fresh Vec<u8> usually has it,
    // but fall back to an explicit copy when it doesn't.
    let data: Vec<f32> = match bytemuck::try_cast_slice::<u8, f32>(&bytes) {
        Ok(slice) => slice.to_vec(),
        Err(_) => bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    };
    Ok(EmbeddingMatrix::from_flat(data, meta.rows, meta.dim))
}
