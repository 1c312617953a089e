//! ragfuse-core
//!
//! Shared data model, error taxonomy, capability traits and configuration for
//! the hybrid retrieval pipeline.

pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use error::{Error, ProviderError, Result, Stage};
pub use types::{Candidate, ConversationHistory, Document, MetaValue, QueryContext, Source};
