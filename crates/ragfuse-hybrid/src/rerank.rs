use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};

use ragfuse_core::traits::Reranker;
use ragfuse_core::types::{sort_ranked, Document};
use ragfuse_core::{Candidate, ProviderError, Source};

/// Scores a narrowed candidate set with a reranker, at most `parallelism` calls in flight.
#[derive(Clone)]
pub struct RerankStage {
    reranker: Arc<dyn Reranker>,
    parallelism: usize,
}

impl RerankStage {
    pub fn new(reranker: Arc<dyn Reranker>, parallelism: usize) -> Self {
        Self { reranker, parallelism: parallelism.max(1) }
    }

    /// Rescore every input and return them in ranked order with `Source::Reranked`.
    ///
    /// The output holds exactly the input ids. Any failed or non-finite score fails the whole call.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[(Candidate, Arc<Document>)],
    ) -> Result<Vec<Candidate>, ProviderError> {
        let mut scored: Vec<Candidate> = stream::iter(candidates.iter().map(|(candidate, document)| {
            let reranker = Arc::clone(&self.reranker);
            async move {
                let score = reranker.score(query, &document.content).await?;
                if !score.is_finite() {
                    return Err(ProviderError::InvalidResponse(format!(
                        "non-finite rerank score for '{}'",
                        candidate.document_id
                    )));
                }
                Ok(Candidate::new(candidate.document_id.clone(), score, Source::Reranked))
            }
        }))
        .buffered(self.parallelism)
        .try_collect::<Vec<_>>()
        .await?;
        sort_ranked(&mut scored);
        tracing::debug!(scored = scored.len(), parallelism = self.parallelism, "rerank complete");
        Ok(scored)
    }
}
