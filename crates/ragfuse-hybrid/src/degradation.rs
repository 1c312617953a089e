use std::fmt;

use ragfuse_core::config::TransformMode;
use ragfuse_core::Source;

/// A recoverable failure the pipeline absorbed while answering a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    /// The transformer could not apply `mode` and searched with the original query.
    TransformFallback { mode: TransformMode, reason: String },
    /// One retriever call for one sub-query failed and contributed nothing.
    BranchFailed { retriever: Source, query: String, reason: String },
    /// No dense list survived; fusion ran lexical-only.
    DenseUnavailable,
    /// No lexical list survived; fusion ran dense-only.
    LexicalUnavailable,
    /// Reranking failed or was unavailable; fused order was kept.
    RerankFailed { reason: String },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::TransformFallback { mode, reason } => {
                write!(f, "{mode:?} transform fell back to passthrough: {reason}")
            }
            Degradation::BranchFailed { retriever, query, reason } => {
                write!(f, "{retriever} retrieval for '{query}' failed: {reason}")
            }
            Degradation::DenseUnavailable => f.write_str("dense retrieval unavailable, lexical-only fusion"),
            Degradation::LexicalUnavailable => f.write_str("lexical retrieval unavailable, dense-only fusion"),
            Degradation::RerankFailed { reason } => write!(f, "rerank skipped: {reason}"),
        }
    }
}
