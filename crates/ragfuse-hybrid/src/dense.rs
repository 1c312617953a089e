use std::sync::Arc;

use ragfuse_core::traits::{EmbeddingProvider, VectorIndex};
use ragfuse_core::types::sort_ranked;
use ragfuse_core::{Candidate, Error, Result, Source, Stage};

/// Embeds a query and looks it up in the injected vector index.
#[derive(Clone)]
pub struct DenseRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl DenseRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> { &self.embedder }

    pub fn index(&self) -> &Arc<dyn VectorIndex> { &self.index }

    /// Embed `query` and search with the resulting vector.
    pub async fn search_text(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
        let vector = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| Error::provider(Stage::Embedding, e))?;
        self.search(&vector, k).await
    }

    /// At most `k` candidates with `Source::Dense`, in ranked order. Empty index yields an empty list.
    pub async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Candidate>> {
        if k == 0 { return Ok(vec![]); }
        let mut hits: Vec<Candidate> = self
            .index
            .search(vector, k)
            .await?
            .into_iter()
            .map(|(id, score)| Candidate::new(id, score, Source::Dense))
            .collect();
        sort_ranked(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }
}
