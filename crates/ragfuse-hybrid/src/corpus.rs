use std::collections::HashMap;
use std::sync::Arc;

use ragfuse_core::traits::{TextIndexer, VectorIndex};
use ragfuse_core::types::{Document, DocumentId};
use ragfuse_core::Result;

struct Entry {
    document: Arc<Document>,
    embedding: Vec<f32>,
}

/// Document store plus the lexical index, guarded together by the pipeline's lock.
///
/// The vector index lives outside but is only written while the write lock is held.
pub(crate) struct Corpus {
    entries: HashMap<DocumentId, Entry>,
    lexical: Box<dyn TextIndexer>,
}

impl Corpus {
    pub(crate) fn new(lexical: Box<dyn TextIndexer>) -> Self {
        Self { entries: HashMap::new(), lexical }
    }

    pub(crate) fn len(&self) -> usize { self.entries.len() }

    pub(crate) fn document(&self, id: &str) -> Option<&Arc<Document>> { self.entries.get(id).map(|e| &e.document) }

    pub(crate) fn lexical(&self) -> &dyn TextIndexer { self.lexical.as_ref() }

    /// Apply a validated, embedded batch to both indexes.
    ///
    /// Vectors go first, each remembering the vector it replaced; the lexical
    /// batch is all-or-nothing. If any step fails every vector written so far
    /// is restored, so a document is visible with both its vector and its
    /// terms or with neither.
    pub(crate) async fn apply(
        &mut self,
        vectors: &dyn VectorIndex,
        documents: Vec<Document>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()> {
        let mut written: Vec<(DocumentId, Option<Vec<f32>>)> = Vec::with_capacity(documents.len());
        for (document, embedding) in documents.iter().zip(&embeddings) {
            if let Err(e) = vectors.upsert(&document.id, embedding).await {
                self.restore(vectors, written).await;
                return Err(e);
            }
            let previous = self.entries.get(&document.id).map(|e| e.embedding.clone());
            written.push((document.id.clone(), previous));
        }
        if let Err(e) = self.lexical.upsert(&documents) {
            self.restore(vectors, written).await;
            return Err(e);
        }
        for (document, embedding) in documents.into_iter().zip(embeddings) {
            self.entries.insert(document.id.clone(), Entry { document: Arc::new(document), embedding });
        }
        Ok(())
    }

    async fn restore(&self, vectors: &dyn VectorIndex, written: Vec<(DocumentId, Option<Vec<f32>>)>) {
        for (id, previous) in written.into_iter().rev() {
            let outcome = match previous {
                Some(v) => vectors.upsert(&id, &v).await,
                None => vectors.remove(&id).await,
            };
            if let Err(e) = outcome {
                tracing::error!(id = %id, error = %e, "failed to roll back vector after aborted ingest");
            }
        }
    }
}
