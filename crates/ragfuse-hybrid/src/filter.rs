use ragfuse_core::types::Document;
use ragfuse_core::{Candidate, QueryContext};

/// Keep candidates whose document satisfies every `(key, value)` of `context`.
///
/// Order and scores are untouched. An empty context returns the input as is;
/// otherwise a candidate whose document cannot be resolved is dropped.
pub fn filter_by_context<'a, F>(candidates: Vec<Candidate>, context: &QueryContext, resolve: F) -> Vec<Candidate>
where
    F: Fn(&str) -> Option<&'a Document>,
{
    if context.is_empty() { return candidates; }
    let before = candidates.len();
    let kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| resolve(&c.document_id).is_some_and(|d| d.matches(context)))
        .collect();
    tracing::debug!(before, after = kept.len(), keys = context.len(), "context filter applied");
    kept
}
