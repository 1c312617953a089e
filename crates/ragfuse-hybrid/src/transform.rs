//! Query transformation: turns the user's query into the strings actually searched.
//!
//! Every call to the generator is isolated. A failed or unusable generation
//! never aborts the query; the transformer searches with the original query
//! and reports a `Degradation::TransformFallback`.

use std::collections::HashSet;
use std::sync::Arc;

use ragfuse_core::config::TransformMode;
use ragfuse_core::traits::Generator;
use ragfuse_core::{ConversationHistory, QueryContext};

use crate::degradation::Degradation;

const PRONOUNS: &[&str] = &["he", "she", "him", "it", "they", "them"];
const POSSESSIVES: &[&str] = &["his", "hers", "its", "their", "theirs"];
const NOT_A_SUBJECT: &[&str] = &[
    "the", "a", "an", "it", "he", "she", "they", "this", "that", "these", "those", "i", "we", "you", "yes", "no",
    "based", "sure", "well",
];

/// Output of one transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    /// Non-empty, in search order.
    pub queries: Vec<String>,
    /// Query the reranker scores documents against.
    pub rerank_query: String,
    pub degradations: Vec<Degradation>,
}

impl Transformed {
    fn passthrough(query: &str) -> Self {
        let query = query.trim().to_string();
        Self { queries: vec![query.clone()], rerank_query: query, degradations: vec![] }
    }

    fn fallback(query: &str, mode: TransformMode, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(?mode, %reason, "query transform fell back to passthrough");
        let mut out = Self::passthrough(query);
        out.degradations.push(Degradation::TransformFallback { mode, reason });
        out
    }

    fn standalone(query: String) -> Self {
        Self { queries: vec![query.clone()], rerank_query: query, degradations: vec![] }
    }
}

#[derive(Clone)]
pub struct QueryTransformer {
    generator: Option<Arc<dyn Generator>>,
    expansion_count: usize,
}

impl QueryTransformer {
    pub fn new(generator: Option<Arc<dyn Generator>>, expansion_count: usize) -> Self {
        Self { generator, expansion_count: expansion_count.max(1) }
    }

    pub fn with_expansion_count(mut self, expansion_count: usize) -> Self {
        self.expansion_count = expansion_count.max(1);
        self
    }

    pub async fn transform(
        &self,
        mode: TransformMode,
        query: &str,
        history: &ConversationHistory,
        context: &QueryContext,
    ) -> Transformed {
        let out = match mode {
            TransformMode::Passthrough => Transformed::passthrough(query),
            TransformMode::Reformulate => self.reformulate(query, history).await,
            TransformMode::Expand => self.expand(query, context).await,
            TransformMode::Hyde => self.hyde(query, context).await,
        };
        tracing::debug!(?mode, queries = ?out.queries, "query transformed");
        out
    }

    async fn reformulate(&self, query: &str, history: &ConversationHistory) -> Transformed {
        let Some(last) = history.last() else { return Transformed::passthrough(query) };
        if find_reference(query).is_none() {
            return Transformed::passthrough(query);
        }
        let Some(generator) = &self.generator else {
            return match rewrite_reference(query, &last.system_response) {
                Some(rewritten) => Transformed::standalone(rewritten),
                None => {
                    tracing::debug!(query, "no subject found in last response, query left as is");
                    Transformed::passthrough(query)
                }
            };
        };
        match generator.generate(&reformulation_prompt(query, history)).await {
            Ok(text) => match first_line(&text) {
                Some(rewritten) => Transformed::standalone(rewritten),
                None => Transformed::fallback(query, TransformMode::Reformulate, "generator returned an empty rewrite"),
            },
            Err(e) => Transformed::fallback(query, TransformMode::Reformulate, e.to_string()),
        }
    }

    async fn expand(&self, query: &str, context: &QueryContext) -> Transformed {
        let Some(generator) = &self.generator else {
            return Transformed::fallback(query, TransformMode::Expand, "no generator configured");
        };
        match generator.generate(&expansion_prompt(query, self.expansion_count, context)).await {
            Ok(text) => {
                let expansions = parse_expansions(&text, query, self.expansion_count);
                if expansions.is_empty() {
                    return Transformed::fallback(query, TransformMode::Expand, "generator returned no usable sub-queries");
                }
                let mut out = Transformed::passthrough(query);
                out.queries.extend(expansions);
                out
            }
            Err(e) => Transformed::fallback(query, TransformMode::Expand, e.to_string()),
        }
    }

    async fn hyde(&self, query: &str, context: &QueryContext) -> Transformed {
        let Some(generator) = &self.generator else {
            return Transformed::fallback(query, TransformMode::Hyde, "no generator configured");
        };
        match generator.generate(&hyde_prompt(query, context)).await {
            Ok(passage) if !passage.trim().is_empty() => Transformed {
                queries: vec![passage.trim().to_string()],
                rerank_query: query.trim().to_string(),
                degradations: vec![],
            },
            Ok(_) => Transformed::fallback(query, TransformMode::Hyde, "generator returned an empty passage"),
            Err(e) => Transformed::fallback(query, TransformMode::Hyde, e.to_string()),
        }
    }
}

fn bare_word(token: &str) -> &str { token.trim_matches(|c: char| !c.is_alphanumeric()) }

/// Position of the first pronoun token in `query` and whether it is possessive.
///
/// `her` counts as possessive when another word follows it in the same clause.
fn find_reference(query: &str) -> Option<(usize, bool)> {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    tokens.iter().enumerate().find_map(|(i, token)| {
        let word = bare_word(token).to_lowercase();
        if word == "her" {
            let followed = i + 1 < tokens.len() && !token.ends_with(|c: char| c.is_ascii_punctuation());
            Some((i, followed))
        } else if PRONOUNS.contains(&word.as_str()) {
            Some((i, false))
        } else if POSSESSIVES.contains(&word.as_str()) {
            Some((i, true))
        } else {
            None
        }
    })
}

/// The first run of capitalized words in `text`, skipping leading articles and pronouns.
///
/// `"Jane Doe is the CEO of Acme."` yields `"Jane Doe"`.
pub fn leading_subject(text: &str) -> Option<String> {
    let mut words: Vec<&str> = Vec::new();
    for raw in text.split_whitespace() {
        let word = bare_word(raw);
        let capitalized = word.chars().next().is_some_and(char::is_uppercase);
        let skippable = words.is_empty() && NOT_A_SUBJECT.contains(&word.to_lowercase().as_str());
        if capitalized && !skippable {
            words.push(word);
            if raw.ends_with(['.', ',', ';', ':', '!', '?']) { break; }
        } else if !words.is_empty() {
            break;
        }
    }
    (!words.is_empty()).then(|| words.join(" "))
}

/// Replace the first pronoun of `query` with the leading subject of `response`.
pub fn rewrite_reference(query: &str, response: &str) -> Option<String> {
    let (position, possessive) = find_reference(query)?;
    let subject = leading_subject(response)?;
    let rewritten: Vec<String> = query
        .split_whitespace()
        .enumerate()
        .map(|(i, token)| {
            if i != position { return token.to_string(); }
            let prefix = &token[..token.len() - token.trim_start_matches(|c: char| !c.is_alphanumeric()).len()];
            let suffix = &token[token.trim_end_matches(|c: char| !c.is_alphanumeric()).len()..];
            let replacement = if possessive { format!("{subject}'s") } else { subject.clone() };
            format!("{prefix}{replacement}{suffix}")
        })
        .collect();
    Some(rewritten.join(" "))
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let rest = if digits > 0 {
        line[digits..].strip_prefix(['.', ')']).unwrap_or(line)
    } else {
        line.strip_prefix(['-', '*', '•']).unwrap_or(line)
    };
    rest.trim().trim_matches('"').trim()
}

/// Parse one sub-query per line from generator output.
///
/// List markers (`1.`, `2)`, `-`, `*`) are stripped, lines equal to the
/// original query or to an earlier line (ignoring case) are dropped, and at
/// most `limit` sub-queries are kept.
pub fn parse_expansions(text: &str, original: &str, limit: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::from([original.trim().to_lowercase()]);
    text.lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_lowercase()))
        .take(limit)
        .map(str::to_string)
        .collect()
}

fn first_line(text: &str) -> Option<String> {
    text.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_string)
}

fn context_note(context: &QueryContext) -> String {
    if context.is_empty() { return String::new(); }
    let pairs: Vec<String> = context.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("User context: {}\n", pairs.join(", "))
}

fn reformulation_prompt(query: &str, history: &ConversationHistory) -> String {
    let mut prompt = String::from(
        "Rewrite the follow-up question as a standalone question that can be understood without the conversation. \
Replace pronouns with the people or things they refer to. Reply with the question only.\n\nConversation:\n",
    );
    for turn in history.turns() {
        prompt.push_str(&format!("User: {}\nAssistant: {}\n", turn.user_utterance, turn.system_response));
    }
    prompt.push_str(&format!("\nFollow-up question: {}\nStandalone question:", query.trim()));
    prompt
}

fn expansion_prompt(query: &str, count: usize, context: &QueryContext) -> String {
    format!(
        "Write {count} different search queries for the question below. Each should cover a distinct \
interpretation or angle of any ambiguous term. One query per line, no commentary.\n{}\nQuestion: {}\nQueries:",
        context_note(context),
        query.trim()
    )
}

fn hyde_prompt(query: &str, context: &QueryContext) -> String {
    format!(
        "Write a short passage that answers the question below as a reference document would. \
Do not mention that it is hypothetical.\n{}\nQuestion: {}\nPassage:",
        context_note(context),
        query.trim()
    )
}
