//! Normalize-then-combine fusion of dense and lexical result lists.
//!
//! Each input list is rescaled to `[0, 1]` on its own before any mixing, so a
//! raw BM25 sum never meets a cosine similarity. Within one sub-query a
//! document scores `alpha * dense + (1 - alpha) * lexical` (a missing side
//! counts 0); across sub-queries the best sub-query wins. A side whose
//! weight is zero does not contribute documents at all, so `alpha = 0` is
//! purely lexical and `alpha = 1` purely dense.

use std::collections::{BTreeMap, HashMap};

use ragfuse_core::config::Normalization;
use ragfuse_core::types::{sort_ranked, DocumentId};
use ragfuse_core::{Candidate, Source};

const SCORE_EPSILON: f32 = 1e-9;

/// Retriever output for one search query. `None` means the branch did not run or failed.
#[derive(Debug, Clone, Default)]
pub struct SubQueryResults {
    pub query: String,
    pub dense: Option<Vec<Candidate>>,
    pub lexical: Option<Vec<Candidate>>,
}

impl SubQueryResults {
    pub fn new(query: impl Into<String>) -> Self { Self { query: query.into(), ..Self::default() } }
}

/// Rescale one ranked list to `[0, 1]`.
///
/// Min-max maps the best score to 1 and the worst to 0; a list whose scores
/// are all equal maps every entry to 1. Rank normalization gives position `r`
/// (0-based) of `n` the value `(n - r) / n`, with tied scores sharing the
/// better position.
pub fn normalize(list: &[Candidate], normalization: Normalization) -> Vec<(DocumentId, f32)> {
    if list.is_empty() { return vec![]; }
    match normalization {
        Normalization::MinMax => {
            let max = list.iter().map(|c| c.score).fold(f32::NEG_INFINITY, f32::max);
            let min = list.iter().map(|c| c.score).fold(f32::INFINITY, f32::min);
            let range = max - min;
            list.iter()
                .map(|c| {
                    let s = if range > SCORE_EPSILON { (c.score - min) / range } else { 1.0 };
                    (c.document_id.clone(), s)
                })
                .collect()
        }
        Normalization::Rank => {
            let mut ordered = list.to_vec();
            sort_ranked(&mut ordered);
            let n = ordered.len() as f32;
            let mut out = Vec::with_capacity(ordered.len());
            let mut position = 0usize;
            for (i, c) in ordered.iter().enumerate() {
                if i > 0 && ordered[i - 1].score != c.score { position = i; }
                out.push((c.document_id.clone(), (n - position as f32) / n));
            }
            out
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionEngine {
    alpha: f32,
    normalization: Normalization,
}

impl FusionEngine {
    pub fn new(alpha: f32, normalization: Normalization) -> Self {
        Self { alpha: alpha.clamp(0.0, 1.0), normalization }
    }

    pub fn alpha(&self) -> f32 { self.alpha }

    /// One deduplicated, ranked list with `Source::Fused`.
    pub fn fuse(&self, inputs: &[SubQueryResults]) -> Vec<Candidate> {
        let mut best: BTreeMap<DocumentId, f32> = BTreeMap::new();
        for sub in inputs {
            let mut components: HashMap<DocumentId, (f32, f32)> = HashMap::new();
            let dense = sub.dense.as_deref().filter(|_| self.alpha > 0.0);
            let lexical = sub.lexical.as_deref().filter(|_| self.alpha < 1.0);
            for (id, s) in dense.map(|l| normalize(l, self.normalization)).unwrap_or_default() {
                let entry = components.entry(id).or_insert((0.0, 0.0));
                entry.0 = entry.0.max(s);
            }
            for (id, s) in lexical.map(|l| normalize(l, self.normalization)).unwrap_or_default() {
                let entry = components.entry(id).or_insert((0.0, 0.0));
                entry.1 = entry.1.max(s);
            }
            for (id, (d, l)) in components {
                let combined = self.alpha * d + (1.0 - self.alpha) * l;
                best.entry(id).and_modify(|b| *b = b.max(combined)).or_insert(combined);
            }
        }
        let mut fused: Vec<Candidate> =
            best.into_iter().map(|(id, score)| Candidate::new(id, score, Source::Fused)).collect();
        sort_ranked(&mut fused);
        tracing::debug!(sub_queries = inputs.len(), fused = fused.len(), alpha = self.alpha, "fusion complete");
        fused
    }
}
