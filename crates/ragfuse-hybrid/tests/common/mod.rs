#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ragfuse_core::config::PipelineConfig;
use ragfuse_core::traits::{EmbeddingProvider, Generator, Reranker, SafetyFilter, TextIndexer, VectorIndex};
use ragfuse_core::types::DocumentId;
use ragfuse_core::{Candidate, Document, Error, ProviderError, Result};
use ragfuse_embed::HashEmbedder;
use ragfuse_hybrid::{Pipeline, PipelineBuilder};
use ragfuse_vector::MemoryVectorIndex;

pub const DIM: usize = 256;

pub fn animals() -> Vec<Document> {
    vec![
        Document::new("d1", "cats are mammals"),
        Document::new("d2", "dogs are mammals"),
        Document::new("d3", "the sky is blue"),
    ]
}

pub fn builder() -> PipelineBuilder {
    Pipeline::builder(Arc::new(HashEmbedder::new(DIM)), Arc::new(MemoryVectorIndex::new(DIM)))
}

pub fn config(alpha: f32) -> PipelineConfig { PipelineConfig { alpha, ..PipelineConfig::default() } }

/// Records every query it embeds.
pub struct RecordingEmbedder {
    inner: HashEmbedder,
    pub queries: Mutex<Vec<String>>,
}

impl RecordingEmbedder {
    pub fn new() -> Self { Self { inner: HashEmbedder::new(DIM), queries: Mutex::new(vec![]) } }

    pub fn seen(&self) -> Vec<String> { self.queries.lock().unwrap().clone() }
}

#[async_trait]
impl EmbeddingProvider for RecordingEmbedder {
    fn dim(&self) -> usize { DIM }

    async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        self.queries.lock().unwrap().push(text.to_string());
        self.inner.embed_query(text).await
    }

    async fn embed_documents(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        self.inner.embed_documents(texts).await
    }
}

/// Embeds documents fine but fails every query.
pub struct QueryOutageEmbedder(pub HashEmbedder);

#[async_trait]
impl EmbeddingProvider for QueryOutageEmbedder {
    fn dim(&self) -> usize { self.0.dim() }

    async fn embed_query(&self, _text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Unavailable("embedding service down".to_string()))
    }

    async fn embed_documents(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        self.0.embed_documents(texts).await
    }
}

/// Fails only when asked to embed `failing`.
pub struct SelectiveOutageEmbedder {
    pub inner: HashEmbedder,
    pub failing: String,
}

#[async_trait]
impl EmbeddingProvider for SelectiveOutageEmbedder {
    fn dim(&self) -> usize { self.inner.dim() }

    async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        if text == self.failing {
            return Err(ProviderError::Unavailable(format!("cannot embed '{text}'")));
        }
        self.inner.embed_query(text).await
    }

    async fn embed_documents(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        self.inner.embed_documents(texts).await
    }
}

/// Declares `DIM` but returns shorter document vectors.
pub struct ShortVectorEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortVectorEmbedder {
    fn dim(&self) -> usize { DIM }

    async fn embed_query(&self, _text: &str) -> std::result::Result<Vec<f32>, ProviderError> { Ok(vec![0.0; DIM]) }

    async fn embed_documents(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|_| vec![1.0; DIM - 1]).collect())
    }
}

/// Ignores the query vector and returns fixed similarities.
pub struct FixedScoreIndex {
    pub scores: Vec<(DocumentId, f32)>,
}

#[async_trait]
impl VectorIndex for FixedScoreIndex {
    fn dim(&self) -> usize { DIM }

    async fn upsert(&self, _id: &str, _vector: &[f32]) -> Result<()> { Ok(()) }

    async fn remove(&self, _id: &str) -> Result<()> { Ok(()) }

    async fn search(&self, _vector: &[f32], k: usize) -> Result<Vec<(DocumentId, f32)>> {
        Ok(self.scores.iter().take(k).cloned().collect())
    }
}

/// Memory index that pauses after every vector write, leaving the ingest half done.
///
/// Each search remembers the stored vector of every id it returned.
pub struct StallingIndex {
    inner: MemoryVectorIndex,
    stall: Duration,
    stored: Mutex<HashMap<DocumentId, Vec<f32>>>,
    last_search: Mutex<HashMap<DocumentId, Vec<f32>>>,
}

impl StallingIndex {
    pub fn new(stall: Duration) -> Self {
        Self {
            inner: MemoryVectorIndex::new(DIM),
            stall,
            stored: Mutex::new(HashMap::new()),
            last_search: Mutex::new(HashMap::new()),
        }
    }

    pub fn last_search(&self) -> HashMap<DocumentId, Vec<f32>> { self.last_search.lock().unwrap().clone() }
}

#[async_trait]
impl VectorIndex for StallingIndex {
    fn dim(&self) -> usize { DIM }

    async fn upsert(&self, id: &str, vector: &[f32]) -> Result<()> {
        self.inner.upsert(id, vector).await?;
        self.stored.lock().unwrap().insert(id.to_string(), vector.to_vec());
        tokio::time::sleep(self.stall).await;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.inner.remove(id).await?;
        self.stored.lock().unwrap().remove(id);
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(DocumentId, f32)>> {
        let hits = self.inner.search(vector, k).await?;
        let snapshot: HashMap<DocumentId, Vec<f32>> = {
            let stored = self.stored.lock().unwrap();
            hits.iter().filter_map(|(id, _)| stored.get(id).map(|v| (id.clone(), v.clone()))).collect()
        };
        *self.last_search.lock().unwrap() = snapshot;
        Ok(hits)
    }
}

/// Lexical index whose writes always fail.
pub struct BrokenTextIndexer;

impl TextIndexer for BrokenTextIndexer {
    fn upsert(&mut self, _documents: &[Document]) -> Result<()> { Err(Error::Index("disk full".to_string())) }

    fn search(&self, _query: &str, _k: usize) -> Result<Vec<Candidate>> { Ok(vec![]) }
}

type Script = Box<dyn Fn(&str) -> std::result::Result<String, ProviderError> + Send + Sync>;

/// Generator driven by a closure over the prompt. Keeps every prompt it saw.
pub struct ScriptedGenerator {
    script: Script,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(script: impl Fn(&str) -> std::result::Result<String, ProviderError> + Send + Sync + 'static) -> Self {
        Self { script: Box::new(script), prompts: Mutex::new(vec![]) }
    }

    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    pub fn failing() -> Self { Self::new(|_| Err(ProviderError::Unavailable("model offline".to_string()))) }

    pub fn seen(&self) -> Vec<String> { self.prompts.lock().unwrap().clone() }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.script)(prompt)
    }
}

/// Scores a document by how many times `keyword` occurs in it, minus its length in words / 100.
pub struct KeywordReranker {
    pub keyword: String,
}

#[async_trait]
impl Reranker for KeywordReranker {
    async fn score(&self, _query: &str, document: &str) -> std::result::Result<f32, ProviderError> {
        let words: Vec<&str> = document.split_whitespace().collect();
        let hits = words.iter().filter(|w| w.eq_ignore_ascii_case(&self.keyword)).count();
        Ok(hits as f32 - words.len() as f32 / 100.0)
    }
}

pub struct FailingReranker;

#[async_trait]
impl Reranker for FailingReranker {
    async fn score(&self, _query: &str, _document: &str) -> std::result::Result<f32, ProviderError> {
        Err(ProviderError::Other("cross-encoder crashed".to_string()))
    }
}

/// Tracks how many `score` calls are in flight at once.
pub struct PeakReranker {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl PeakReranker {
    pub fn new(delay: Duration) -> Self { Self { delay, in_flight: AtomicUsize::new(0), peak: AtomicUsize::new(0) } }

    pub fn peak(&self) -> usize { self.peak.load(Ordering::SeqCst) }
}

#[async_trait]
impl Reranker for PeakReranker {
    async fn score(&self, _query: &str, document: &str) -> std::result::Result<f32, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(document.len() as f32)
    }
}

pub struct SlowReranker(pub Duration);

#[async_trait]
impl Reranker for SlowReranker {
    async fn score(&self, _query: &str, _document: &str) -> std::result::Result<f32, ProviderError> {
        tokio::time::sleep(self.0).await;
        Ok(1.0)
    }
}

/// Withholds every passage containing `marker`.
pub struct MarkerSafetyFilter {
    pub marker: String,
}

#[async_trait]
impl SafetyFilter for MarkerSafetyFilter {
    async fn screen(&self, passages: &[String]) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(passages.iter().filter(|p| !p.contains(&self.marker)).cloned().collect())
    }
}
