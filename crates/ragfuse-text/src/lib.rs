//! ragfuse-text
//!
//! Tantivy-backed lexical retrieval. `TantivyIndexer` keeps an in-RAM BM25
//! index keyed by document id and implements `ragfuse_core::traits::TextIndexer`.

pub mod index;
pub mod tantivy_utils;

pub use index::TantivyIndexer;
