//! Encoder contract and embedding types
//!
//! The engine consumes embeddings through the [`Encoder`] trait: a corpus
//! matrix built once at startup and a query vector per search. The shipped
//! implementation is [`HttpEncoder`], a blocking client for any
//! OpenAI-compatible `/v1/embeddings` endpoint. Rows are L2-normalized on
//! the way in so cosine similarity reduces to a dot product.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Encoder request failed: {0}")]
    Request(String),
    #[error("Malformed encoder response: {0}")]
    Response(String),
    #[error("Encoder returned {got} embeddings for {expected} inputs")]
    RowCountMismatch { expected: usize, got: usize },
    #[error("Embedding rows have inconsistent dimensions ({0} vs {1})")]
    RaggedRows(usize, usize),
    #[error("Query cannot be empty")]
    EmptyQuery,
}

impl From<reqwest::Error> for EncoderError {
    fn from(e: reqwest::Error) -> Self {
        EncoderError::Request(e.to_string())
    }
}

/// An L2-normalized embedding vector of the corpus dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Create an embedding from raw vector data.
    pub fn new(data: Vec<f32>) -> Self {
        Self(data)
    }

    /// L2-normalize in place. Zero vectors are left untouched.
    pub fn normalized(mut self) -> Self {
        let norm: f32 = self.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 && norm.is_finite() {
            for x in &mut self.0 {
                *x /= norm;
            }
        }
        self
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A dense (N, D) matrix with one embedding row per record.
///
/// Stored as a flat row-major buffer. Created once at index build time and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    rows: usize,
    dim: usize,
}

impl EmbeddingMatrix {
    /// Assemble a matrix from per-row embeddings. All rows must share one
    /// dimensionality.
    pub fn from_rows(rows: Vec<Embedding>) -> Result<Self, EncoderError> {
        let dim = rows.first().map(Embedding::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in &rows {
            if row.len() != dim {
                return Err(EncoderError::RaggedRows(dim, row.len()));
            }
            data.extend_from_slice(row.as_slice());
        }
        Ok(Self {
            data,
            rows: rows.len(),
            dim,
        })
    }

    /// Rebuild a matrix from a flat row-major buffer (cache load path).
    /// Returns `None` when the buffer does not match the shape.
    pub fn from_flat(data: Vec<f32>, rows: usize, dim: usize) -> Option<Self> {
        if data.len() != rows * dim {
            return None;
        }
        Some(Self { data, rows, dim })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// One embedding row as a slice.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// The whole matrix as a flat row-major slice (cache save path).
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }
}

/// External text-to-vector backend.
///
/// Implementations must produce L2-normalized output; `encode_query` must
/// match the dimensionality of the matrix built by `encode_corpus`.
pub trait Encoder: Send + Sync {
    /// Encode every record's search text into the corpus matrix.
    fn encode_corpus(&self, texts: &[&str]) -> Result<EmbeddingMatrix, EncoderError>;

    /// Encode a single query string.
    fn encode_query(&self, text: &str) -> Result<Embedding, EncoderError>;
}

/// Max inputs per embeddings request. Keeps request bodies bounded for
/// servers with strict batch limits.
const MAX_BATCH: usize = 128;

/// Blocking client for an OpenAI-compatible embeddings endpoint.
pub struct HttpEncoder {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEncoder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, EncoderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }

    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Embedding>, EncoderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let brief: String = text.chars().take(200).collect();
            return Err(EncoderError::Request(format!(
                "{} from {}: {}",
                status, self.endpoint, brief
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .map_err(|e| EncoderError::Response(e.to_string()))?;
        if parsed.data.len() != inputs.len() {
            return Err(EncoderError::RowCountMismatch {
                expected: inputs.len(),
                got: parsed.data.len(),
            });
        }

        // Servers may return rows out of order; the index field is authoritative.
        let mut rows = parsed.data;
        rows.sort_by_key(|r| r.index);
        Ok(rows
            .into_iter()
            .map(|r| Embedding::new(r.embedding).normalized())
            .collect())
    }
}

impl Encoder for HttpEncoder {
    fn encode_corpus(&self, texts: &[&str]) -> Result<EmbeddingMatrix, EncoderError> {
        let mut rows = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(MAX_BATCH).enumerate() {
            tracing::debug!(batch = i, size = batch.len(), "Encoding corpus batch");
            rows.extend(self.embed_batch(batch)?);
        }
        EmbeddingMatrix::from_rows(rows)
    }

    fn encode_query(&self, text: &str) -> Result<Embedding, EncoderError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EncoderError::EmptyQuery);
        }
        let mut rows = self.embed_batch(&[text])?;
        Ok(rows.remove(0))
    }
}
