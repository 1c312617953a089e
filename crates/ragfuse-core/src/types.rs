//! Domain types shared by the retrievers, the fusion engine and the pipeline.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

pub type DocumentId = String;
pub type Metadata = BTreeMap<String, MetaValue>;

/// Caller-supplied attribute predicate (e.g. `role`, `region`).
///
/// Every entry must equal the document's metadata value exactly.
pub type QueryContext = BTreeMap<String, MetaValue>;

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Bool(b) => write!(f, "{b}"),
            MetaValue::Integer(i) => write!(f, "{i}"),
            MetaValue::Float(x) => write!(f, "{x}"),
            MetaValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self { MetaValue::String(s.to_string()) }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self { MetaValue::String(s) }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self { MetaValue::Integer(i) }
}

impl From<f64> for MetaValue {
    fn from(x: f64) -> Self { MetaValue::Float(x) }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self { MetaValue::Bool(b) }
}

/// A unit of retrievable content.
///
/// - `id`: unique within a corpus; re-ingesting an id replaces the document
/// - `content`: the text payload that is embedded and lexically indexed
/// - `metadata`: scalar attributes matched by the context filter
///
/// Documents are shared as `Arc<Document>` once ingested and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), metadata: Metadata::new() }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// True when every `(key, value)` of `context` is present in metadata with an equal value.
    pub fn matches(&self, context: &QueryContext) -> bool {
        context.iter().all(|(k, v)| self.metadata.get(k) == Some(v))
    }
}

/// Indicates which stage produced a candidate's score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Dense,
    Lexical,
    Fused,
    Reranked,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::Dense => "dense",
            Source::Lexical => "lexical",
            Source::Fused => "fused",
            Source::Reranked => "reranked",
        };
        f.write_str(s)
    }
}

/// A scored reference to a document.
///
/// `score` is only comparable to other candidates with the same `source`
/// and higher is always better. The document body is resolved from the
/// corpus when needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub document_id: DocumentId,
    pub score: f32,
    pub source: Source,
}

impl Candidate {
    pub fn new(document_id: impl Into<String>, score: f32, source: Source) -> Self {
        Self { document_id: document_id.into(), score, source }
    }
}

/// Ranked-list ordering: score descending, then document id ascending.
pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.document_id.cmp(&b.document_id))
}

/// Sort candidates into ranked-list order in place.
pub fn sort_ranked(candidates: &mut [Candidate]) {
    candidates.sort_by(rank_order);
}

/// True if `candidates` is in ranked-list order.
pub fn is_ranked(candidates: &[Candidate]) -> bool {
    candidates.windows(2).all(|w| rank_order(&w[0], &w[1]) != Ordering::Greater)
}

/// One exchange of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_utterance: String,
    pub system_response: String,
}

/// Append-only log of conversation turns owned by a single session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, user_utterance: impl Into<String>, system_response: impl Into<String>) {
        self.turns.push(ConversationTurn {
            user_utterance: user_utterance.into(),
            system_response: system_response.into(),
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] { &self.turns }

    pub fn last(&self) -> Option<&ConversationTurn> { self.turns.last() }

    pub fn is_empty(&self) -> bool { self.turns.is_empty() }

    pub fn len(&self) -> usize { self.turns.len() }
}

impl<U: Into<String>, R: Into<String>> FromIterator<(U, R)> for ConversationHistory {
    fn from_iter<I: IntoIterator<Item = (U, R)>>(iter: I) -> Self {
        let mut history = Self::new();
        for (u, r) in iter {
            history.push(u, r);
        }
        history
    }
}
