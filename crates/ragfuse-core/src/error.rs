use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Pipeline stage an error or degradation is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Ingest,
    Transform,
    Embedding,
    Retrieval,
    Fusion,
    Filter,
    Rerank,
    Safety,
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Ingest => "ingest",
            Stage::Transform => "transform",
            Stage::Embedding => "embedding",
            Stage::Retrieval => "retrieval",
            Stage::Fusion => "fusion",
            Stage::Filter => "filter",
            Stage::Rerank => "rerank",
            Stage::Safety => "safety",
            Stage::Generation => "generation",
        };
        f.write_str(s)
    }
}

/// Failure reported by an external capability (embedding, generation, reranking, indexing).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider failed: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{stage} provider failed: {source}")]
    Provider {
        stage: Stage,
        #[source]
        source: ProviderError,
    },

    #[error("Embedding for '{id}' has dimension {actual}, index expects {expected}")]
    DimensionMismatch { id: String, expected: usize, actual: usize },

    #[error("Deadline exceeded during {stage} after {elapsed:?}")]
    DeadlineExceeded { stage: Stage, elapsed: Duration },

    #[error("Index operation failed: {0}")]
    Index(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn provider(stage: Stage, source: ProviderError) -> Self { Error::Provider { stage, source } }
}

pub type Result<T> = std::result::Result<T, Error>;
