//! Capability contracts consumed by the retrieval pipeline.
//!
//! Every external collaborator is an object-safe trait so that a stub and a
//! real backend are interchangeable behind `Arc<dyn _>`.

use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::types::{Candidate, Document, DocumentId};

/// Text to vector. Vectors of one provider instance all have `dim()` components.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dim(&self) -> usize;
    async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;
    async fn embed_documents(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError>;
}

/// Free-form text generation, used for query transformation and final answers.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError>;
}

/// Second-stage relevance model. Higher is more relevant.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score(&self, query: &str, document: &str) -> std::result::Result<f32, ProviderError>;
}

/// Screens passages for sensitive entities, returning only the safe ones.
#[async_trait]
pub trait SafetyFilter: Send + Sync {
    async fn screen(&self, passages: &[String]) -> std::result::Result<Vec<String>, ProviderError>;
}

/// Similarity index keyed by document id. Metric and structure are the implementation's concern.
///
/// `upsert` must reject vectors whose length differs from `dim()` with
/// `Error::DimensionMismatch`. `search` returns at most `k` `(id, score)`
/// pairs, higher score = more similar; an empty index yields an empty list.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn dim(&self) -> usize;
    async fn upsert(&self, id: &str, vector: &[f32]) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<()>;
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(DocumentId, f32)>>;
}

/// Sparse keyword index over document content.
///
/// `upsert` is all-or-nothing for the batch: on error no document of the
/// batch is visible. `search` returns candidates with `Source::Lexical`,
/// excludes documents sharing no term with the query, and is ranked.
pub trait TextIndexer: Send + Sync {
    fn upsert(&mut self, documents: &[Document]) -> Result<()>;
    fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>>;
}
