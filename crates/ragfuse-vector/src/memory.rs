use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use ragfuse_core::traits::VectorIndex;
use ragfuse_core::types::DocumentId;
use ragfuse_core::{Error, Result};

/// Exact cosine-similarity index held in memory. Scores lie in `[-1, 1]`.
pub struct MemoryVectorIndex {
    dim: usize,
    vectors: RwLock<HashMap<DocumentId, Vec<f32>>>,
}

impl MemoryVectorIndex {
    pub fn new(dim: usize) -> Self { Self { dim, vectors: RwLock::new(HashMap::new()) } }

    pub fn len(&self) -> usize { self.vectors.read().len() }

    pub fn is_empty(&self) -> bool { self.vectors.read().is_empty() }

    fn check_dim(&self, id: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::DimensionMismatch { id: id.to_string(), expected: self.dim, actual: vector.len() });
        }
        Ok(())
    }
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn dim(&self) -> usize { self.dim }

    async fn upsert(&self, id: &str, vector: &[f32]) -> Result<()> {
        self.check_dim(id, vector)?;
        self.vectors.write().insert(id.to_string(), vector.to_vec());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.vectors.write().remove(id);
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(DocumentId, f32)>> {
        self.check_dim("<query>", vector)?;
        let mut scored: Vec<(DocumentId, f32)> = self
            .vectors
            .read()
            .iter()
            .map(|(id, v)| (id.clone(), cosine(vector, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}
