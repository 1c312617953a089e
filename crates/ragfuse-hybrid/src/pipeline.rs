//! Orchestration of ingest and the query funnel.
//!
//! `query` runs transform → parallel retrieval → fusion → context filter →
//! optional rerank → truncation → safety screen → prompt assembly. Every
//! stage finishes before the next starts, and the corpus read lock is held
//! from retrieval through document resolution so an ingest never interleaves.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::Instant;

use ragfuse_core::config::{PipelineConfig, TransformMode};
use ragfuse_core::traits::{EmbeddingProvider, Generator, Reranker, SafetyFilter, TextIndexer, VectorIndex};
use ragfuse_core::types::{Document, DocumentId};
use ragfuse_core::{Candidate, ConversationHistory, Error, MetaValue, ProviderError, QueryContext, Result, Source, Stage};
use ragfuse_text::TantivyIndexer;

use crate::corpus::Corpus;
use crate::degradation::Degradation;
use crate::dense::DenseRetriever;
use crate::filter::filter_by_context;
use crate::fusion::{FusionEngine, SubQueryResults};
use crate::prompt::build_prompt;
use crate::rerank::RerankStage;
use crate::transform::QueryTransformer;

/// Per-call overrides layered over `PipelineConfig`.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub context: QueryContext,
    pub top_k_retrieve: Option<usize>,
    pub top_k_rerank: Option<usize>,
    pub use_rerank: Option<bool>,
    pub transform_mode: Option<TransformMode>,
    pub deadline: Option<Duration>,
    /// Dense weight in `[0, 1]`.
    pub alpha: Option<f32>,
    pub enable_lexical: Option<bool>,
    pub expansion_count: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self { Self::default() }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_top_k_retrieve(mut self, k: usize) -> Self {
        self.top_k_retrieve = Some(k);
        self
    }

    pub fn with_top_k_rerank(mut self, k: usize) -> Self {
        self.top_k_rerank = Some(k);
        self
    }

    pub fn with_rerank(mut self, enabled: bool) -> Self {
        self.use_rerank = Some(enabled);
        self
    }

    pub fn with_mode(mut self, mode: TransformMode) -> Self {
        self.transform_mode = Some(mode);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn with_lexical(mut self, enabled: bool) -> Self {
        self.enable_lexical = Some(enabled);
        self
    }

    pub fn with_expansion_count(mut self, count: usize) -> Self {
        self.expansion_count = Some(count);
        self
    }
}

/// A final context passage: the candidate that selected it and the resolved document.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedContext {
    pub candidate: Candidate,
    pub document: Arc<Document>,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Final contexts in ranked order, at most `top_k_rerank`.
    pub ranked_contexts: Vec<RankedContext>,
    /// Answer-generation prompt built from the original query.
    pub prompt: String,
    /// The strings the retrievers were called with.
    pub search_queries: Vec<String>,
    pub no_supporting_context: bool,
    pub degradations: Vec<Degradation>,
    /// Passages removed by the safety filter.
    pub withheld: usize,
}

impl QueryResult {
    pub fn candidates(&self) -> Vec<Candidate> { self.ranked_contexts.iter().map(|c| c.candidate.clone()).collect() }

    pub fn ids(&self) -> Vec<&str> { self.ranked_contexts.iter().map(|c| c.candidate.document_id.as_str()).collect() }
}

/// Effective knobs of one query after applying `QueryOptions`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    top_k_retrieve: usize,
    top_k_rerank: usize,
    use_rerank: bool,
    mode: TransformMode,
    deadline: Option<Duration>,
    alpha: f32,
    enable_lexical: bool,
    expansion_count: usize,
}

impl Settings {
    pub(crate) fn deadline(&self) -> Option<Duration> { self.deadline }
}

/// Tracks the overall deadline of one call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    started: Instant,
    deadline: Option<Instant>,
}

impl Clock {
    pub(crate) fn start(limit: Option<Duration>) -> Self {
        let started = Instant::now();
        Self { started, deadline: limit.map(|d| started + d) }
    }

    /// Await `fut`, failing with `DeadlineExceeded` attributed to `stage` if time runs out first.
    pub(crate) async fn run<F: Future>(&self, stage: Stage, fut: F) -> Result<F::Output> {
        match self.deadline {
            None => Ok(fut.await),
            Some(at) => tokio::time::timeout_at(at, fut).await.map_err(|_| self.exceeded(stage)),
        }
    }

    fn check(&self, stage: Stage) -> Result<()> {
        match self.deadline {
            Some(at) if Instant::now() >= at => Err(self.exceeded(stage)),
            _ => Ok(()),
        }
    }

    fn exceeded(&self, stage: Stage) -> Error {
        let elapsed = self.started.elapsed();
        tracing::warn!(%stage, ?elapsed, "query deadline exceeded");
        Error::DeadlineExceeded { stage, elapsed }
    }
}

pub struct PipelineBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: PipelineConfig,
    lexical: Option<Box<dyn TextIndexer>>,
    generator: Option<Arc<dyn Generator>>,
    reranker: Option<Arc<dyn Reranker>>,
    safety: Option<Arc<dyn SafetyFilter>>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Lexical index to use instead of a fresh in-RAM `TantivyIndexer`.
    pub fn lexical(mut self, lexical: Box<dyn TextIndexer>) -> Self {
        self.lexical = Some(lexical);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn safety_filter(mut self, safety: Arc<dyn SafetyFilter>) -> Self {
        self.safety = Some(safety);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;
        if self.embedder.dim() != self.index.dim() {
            return Err(Error::InvalidConfig(format!(
                "embedder produces {}-dimensional vectors but the index expects {}",
                self.embedder.dim(),
                self.index.dim()
            )));
        }
        let lexical: Box<dyn TextIndexer> = match self.lexical {
            Some(lexical) => lexical,
            None => Box::new(TantivyIndexer::new()?),
        };
        Ok(Pipeline {
            corpus: RwLock::new(Corpus::new(lexical)),
            dense: DenseRetriever::new(self.embedder, self.index),
            transformer: QueryTransformer::new(self.generator.clone(), self.config.expansion_count),
            reranker: self.reranker.map(|r| RerankStage::new(r, self.config.rerank_parallelism)),
            generator: self.generator,
            safety: self.safety,
            config: self.config,
        })
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    corpus: RwLock<Corpus>,
    dense: DenseRetriever,
    transformer: QueryTransformer,
    generator: Option<Arc<dyn Generator>>,
    reranker: Option<RerankStage>,
    safety: Option<Arc<dyn SafetyFilter>>,
}

impl Pipeline {
    pub fn builder(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> PipelineBuilder {
        PipelineBuilder {
            embedder,
            index,
            config: PipelineConfig::default(),
            lexical: None,
            generator: None,
            reranker: None,
            safety: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig { &self.config }

    pub(crate) fn generator(&self) -> Option<&Arc<dyn Generator>> { self.generator.as_ref() }

    /// Number of ingested documents.
    pub async fn len(&self) -> usize { self.corpus.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.len().await == 0 }

    pub async fn document(&self, id: &str) -> Option<Arc<Document>> { self.corpus.read().await.document(id).cloned() }

    /// Validate, embed and index `documents`.
    ///
    /// The batch is rejected as a whole, before anything is written, when a
    /// document is malformed, an id repeats, or an embedding has the wrong
    /// dimension. Re-ingesting an id replaces its document and vector together.
    #[tracing::instrument(skip_all, fields(documents = documents.len()))]
    pub async fn ingest(&self, documents: Vec<Document>) -> Result<()> {
        if documents.is_empty() {
            tracing::debug!("nothing to ingest");
            return Ok(());
        }
        validate_documents(&documents)?;

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = self
            .dense
            .embedder()
            .embed_documents(&texts)
            .await
            .map_err(|e| Error::provider(Stage::Embedding, e))?;
        if embeddings.len() != documents.len() {
            return Err(Error::provider(
                Stage::Embedding,
                ProviderError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    documents.len(),
                    embeddings.len()
                )),
            ));
        }
        let dim = self.dense.index().dim();
        if let Some((d, e)) = documents.iter().zip(&embeddings).find(|(_, e)| e.len() != dim) {
            return Err(Error::DimensionMismatch { id: d.id.clone(), expected: dim, actual: e.len() });
        }

        let mut corpus = self.corpus.write().await;
        corpus.apply(self.dense.index().as_ref(), documents, embeddings).await?;
        tracing::info!(total = corpus.len(), "ingest committed");
        Ok(())
    }

    /// Answer-free retrieval for a standalone query.
    pub async fn query(&self, text: &str, options: &QueryOptions) -> Result<QueryResult> {
        self.query_with_history(text, &ConversationHistory::new(), options).await
    }

    /// Retrieval for a query asked within a conversation. `history` feeds reformulation and the prompt.
    pub async fn query_with_history(
        &self,
        text: &str,
        history: &ConversationHistory,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let settings = self.resolve(options)?;
        let clock = Clock::start(settings.deadline);
        self.run_query(text, history, options, settings, &clock).await
    }

    pub(crate) fn resolve(&self, options: &QueryOptions) -> Result<Settings> {
        let settings = Settings {
            top_k_retrieve: options.top_k_retrieve.unwrap_or(self.config.top_k_retrieve),
            top_k_rerank: options.top_k_rerank.unwrap_or(self.config.top_k_rerank),
            use_rerank: options.use_rerank.unwrap_or(self.config.enable_rerank),
            mode: options.transform_mode.unwrap_or(self.config.transform_mode),
            deadline: options.deadline.or_else(|| self.config.deadline()),
            alpha: options.alpha.unwrap_or(self.config.alpha),
            enable_lexical: options.enable_lexical.unwrap_or(self.config.enable_lexical),
            expansion_count: options.expansion_count.unwrap_or(self.config.expansion_count),
        };
        if settings.top_k_retrieve == 0 || settings.top_k_rerank == 0 {
            return Err(Error::Validation("top_k values must be greater than zero".to_string()));
        }
        if !(0.0..=1.0).contains(&settings.alpha) {
            return Err(Error::Validation(format!("alpha must be within [0, 1], got {}", settings.alpha)));
        }
        if settings.expansion_count == 0 {
            return Err(Error::Validation("expansion_count must be greater than zero".to_string()));
        }
        if settings.deadline == Some(Duration::ZERO) {
            return Err(Error::Validation("deadline must be greater than zero".to_string()));
        }
        Ok(settings)
    }

    #[tracing::instrument(skip_all, fields(mode = ?settings.mode, top_k = settings.top_k_rerank))]
    pub(crate) async fn run_query(
        &self,
        text: &str,
        history: &ConversationHistory,
        options: &QueryOptions,
        settings: Settings,
        clock: &Clock,
    ) -> Result<QueryResult> {
        if text.trim().is_empty() {
            return Err(Error::Validation("query text must not be empty".to_string()));
        }

        let transformer = self.transformer.clone().with_expansion_count(settings.expansion_count);
        let transformed = clock
            .run(Stage::Transform, transformer.transform(settings.mode, text, history, &options.context))
            .await?;
        let mut degradations = transformed.degradations.clone();

        let corpus = clock.run(Stage::Retrieval, self.corpus.read()).await?;
        let results = clock
            .run(
                Stage::Retrieval,
                self.retrieve(&corpus, &transformed.queries, &settings, &mut degradations),
            )
            .await??;

        let alpha = effective_alpha(&results, &settings, &mut degradations);
        let fused = FusionEngine::new(alpha, self.config.normalization).fuse(&results);
        clock.check(Stage::Fusion)?;

        let mut filtered = filter_by_context(fused, &options.context, |id| corpus.document(id).map(|d| d.as_ref()));
        clock.check(Stage::Filter)?;
        filtered.truncate(settings.top_k_retrieve);

        let pool: Vec<(Candidate, Arc<Document>)> = filtered
            .into_iter()
            .filter_map(|c| corpus.document(&c.document_id).cloned().map(|d| (c, d)))
            .collect();
        drop(corpus);

        let mut ranked = pool.iter().map(|(c, _)| c.clone()).collect::<Vec<_>>();
        if settings.use_rerank && !pool.is_empty() {
            match &self.reranker {
                Some(stage) => match clock.run(Stage::Rerank, stage.rerank(&transformed.rerank_query, &pool)).await? {
                    Ok(reranked) => ranked = reranked,
                    Err(e) => {
                        tracing::warn!(error = %e, "reranker failed, keeping fused order");
                        degradations.push(Degradation::RerankFailed { reason: e.to_string() });
                    }
                },
                None => {
                    tracing::warn!("rerank requested but no reranker is configured");
                    degradations.push(Degradation::RerankFailed { reason: "no reranker configured".to_string() });
                }
            }
        }
        ranked.truncate(settings.top_k_rerank);

        let documents: HashMap<&str, &Arc<Document>> = pool.iter().map(|(c, d)| (c.document_id.as_str(), d)).collect();
        let mut contexts: Vec<RankedContext> = ranked
            .into_iter()
            .filter_map(|candidate| {
                let document = Arc::clone(documents.get(candidate.document_id.as_str())?);
                Some(RankedContext { candidate, document })
            })
            .collect();

        let withheld = self.screen(&mut contexts, clock).await?;
        let prompt = build_prompt(text, history, &contexts);
        tracing::info!(
            sub_queries = transformed.queries.len(),
            contexts = contexts.len(),
            degradations = degradations.len(),
            withheld,
            "query complete"
        );
        Ok(QueryResult {
            no_supporting_context: contexts.is_empty(),
            ranked_contexts: contexts,
            prompt,
            search_queries: transformed.queries,
            degradations,
            withheld,
        })
    }

    /// One dense and (when enabled) one lexical search per sub-query.
    ///
    /// A failed branch contributes `None` and a degradation. If every branch
    /// failed, the first failure is returned.
    async fn retrieve(
        &self,
        corpus: &Corpus,
        queries: &[String],
        settings: &Settings,
        degradations: &mut Vec<Degradation>,
    ) -> Result<Vec<SubQueryResults>> {
        let k = settings.top_k_retrieve;
        let dense = join_all(queries.iter().map(|q| self.dense.search_text(q, k))).await;
        let lexical: Vec<Option<Result<Vec<Candidate>>>> = queries
            .iter()
            .map(|q| settings.enable_lexical.then(|| corpus.lexical().search(q, k)))
            .collect();

        let mut first_error: Option<Error> = None;
        let mut succeeded = 0usize;
        let mut out = Vec::with_capacity(queries.len());
        for ((query, dense), lexical) in queries.iter().zip(dense).zip(lexical) {
            let mut sub = SubQueryResults::new(query.clone());
            match dense {
                Ok(list) => {
                    succeeded += 1;
                    sub.dense = Some(list);
                }
                Err(e) => record_branch_failure(Source::Dense, query, e, degradations, &mut first_error),
            }
            match lexical {
                Some(Ok(list)) => {
                    succeeded += 1;
                    sub.lexical = Some(list);
                }
                Some(Err(e)) => record_branch_failure(Source::Lexical, query, e, degradations, &mut first_error),
                None => {}
            }
            out.push(sub);
        }
        if succeeded == 0 {
            return Err(first_error.unwrap_or_else(|| {
                Error::provider(Stage::Retrieval, ProviderError::Unavailable("no retriever ran".to_string()))
            }));
        }
        tracing::debug!(sub_queries = out.len(), succeeded, "retrieval complete");
        Ok(out)
    }

    /// Drop passages the safety filter withholds. Returns how many were dropped.
    async fn screen(&self, contexts: &mut Vec<RankedContext>, clock: &Clock) -> Result<usize> {
        let Some(filter) = &self.safety else { return Ok(0) };
        if contexts.is_empty() { return Ok(0); }
        let passages: Vec<String> = contexts.iter().map(|c| c.document.content.clone()).collect();
        let safe = clock
            .run(Stage::Safety, filter.screen(&passages))
            .await?
            .map_err(|e| Error::provider(Stage::Safety, e))?;
        let mut allowed: HashMap<&str, usize> = HashMap::new();
        for passage in &safe {
            *allowed.entry(passage.as_str()).or_default() += 1;
        }
        let before = contexts.len();
        contexts.retain(|c| match allowed.get_mut(c.document.content.as_str()) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        });
        let withheld = before - contexts.len();
        if withheld > 0 {
            tracing::warn!(withheld, "safety filter withheld passages");
        }
        Ok(withheld)
    }
}

/// Fusion weight after accounting for retrievers that produced nothing.
///
/// A missing side only counts as a degradation when its weight was non-zero.
fn effective_alpha(results: &[SubQueryResults], settings: &Settings, degradations: &mut Vec<Degradation>) -> f32 {
    let dense_ok = results.iter().any(|r| r.dense.is_some());
    let lexical_ok = results.iter().any(|r| r.lexical.is_some());
    if !dense_ok {
        if settings.alpha > 0.0 {
            tracing::warn!("every dense branch failed, fusing lexical results only");
            degradations.push(Degradation::DenseUnavailable);
        }
        0.0
    } else if !lexical_ok {
        if settings.enable_lexical && settings.alpha < 1.0 {
            tracing::warn!("every lexical branch failed, fusing dense results only");
            degradations.push(Degradation::LexicalUnavailable);
        }
        1.0
    } else {
        settings.alpha
    }
}

fn record_branch_failure(
    retriever: Source,
    query: &str,
    error: Error,
    degradations: &mut Vec<Degradation>,
    first_error: &mut Option<Error>,
) {
    tracing::warn!(%retriever, query, error = %error, "retrieval branch failed");
    degradations.push(Degradation::BranchFailed {
        retriever,
        query: query.to_string(),
        reason: error.to_string(),
    });
    first_error.get_or_insert(error);
}

fn validate_documents(documents: &[Document]) -> Result<()> {
    let mut seen: HashSet<&DocumentId> = HashSet::new();
    for d in documents {
        if d.id.trim().is_empty() {
            return Err(Error::Validation("document id must not be empty".to_string()));
        }
        if d.content.trim().is_empty() {
            return Err(Error::Validation(format!("document '{}' has empty content", d.id)));
        }
        if !seen.insert(&d.id) {
            return Err(Error::Validation(format!("document id '{}' appears more than once in the batch", d.id)));
        }
    }
    Ok(())
}
