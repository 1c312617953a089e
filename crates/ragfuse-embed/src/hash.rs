use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use ragfuse_core::traits::EmbeddingProvider;
use ragfuse_core::ProviderError;

/// Deterministic bag-of-words embedder for tests and offline development.
///
/// Each lowercase alphanumeric token is hashed into one of `dim` buckets;
/// the result is L2-normalized, so texts sharing tokens have positive
/// cosine similarity. Empty text embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder { dim: usize }

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 { for x in &mut v { *x /= norm; } }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn dim(&self) -> usize { self.dim }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> { Ok(self.embed_text(text)) }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
