//! ragfuse-hybrid
//!
//! The retrieval-and-fusion pipeline: query transformation, dense and
//! lexical retrieval, normalized fusion, context filtering, optional
//! reranking and prompt assembly, composed by `Pipeline` and `Session`.

pub mod degradation;
pub mod dense;
pub mod filter;
pub mod fusion;
pub mod pipeline;
pub mod prompt;
pub mod rerank;
pub mod session;
pub mod transform;

mod corpus;

pub use degradation::Degradation;
pub use dense::DenseRetriever;
pub use filter::filter_by_context;
pub use fusion::{normalize, FusionEngine, SubQueryResults};
pub use pipeline::{Pipeline, PipelineBuilder, QueryOptions, QueryResult, RankedContext};
pub use prompt::{build_prompt, NO_CONTEXT_NOTICE};
pub use rerank::RerankStage;
pub use session::{Answer, Session};
pub use transform::{QueryTransformer, Transformed};
