mod common;

use std::sync::Arc;

use common::ScriptedGenerator;
use ragfuse_core::config::TransformMode;
use ragfuse_core::{ConversationHistory, QueryContext};
use ragfuse_hybrid::transform::{leading_subject, parse_expansions, rewrite_reference};
use ragfuse_hybrid::{Degradation, QueryTransformer};

fn acme_history() -> ConversationHistory {
    [("Who is the CEO of Acme?", "Jane Doe is the CEO of Acme.")].into_iter().collect()
}

#[tokio::test]
async fn passthrough_returns_the_query() {
    let t = QueryTransformer::new(None, 3);
    let out = t.transform(TransformMode::Passthrough, "  what is rust? ", &ConversationHistory::new(), &QueryContext::new()).await;
    assert_eq!(out.queries, vec!["what is rust?"]);
    assert!(out.degradations.is_empty());
}

#[tokio::test]
async fn reformulation_without_generator_resolves_pronoun_from_last_response() {
    let t = QueryTransformer::new(None, 3);
    let out = t.transform(TransformMode::Reformulate, "How old is she?", &acme_history(), &QueryContext::new()).await;
    assert_eq!(out.queries, vec!["How old is Jane Doe?"]);
    assert_eq!(out.rerank_query, "How old is Jane Doe?");
}

#[tokio::test]
async fn reformulation_leaves_queries_without_references_alone() {
    let generator = Arc::new(ScriptedGenerator::replying("should not be used"));
    let t = QueryTransformer::new(Some(generator.clone()), 3);
    let out = t.transform(TransformMode::Reformulate, "Where is Acme based?", &acme_history(), &QueryContext::new()).await;
    assert_eq!(out.queries, vec!["Where is Acme based?"]);
    assert!(generator.seen().is_empty());

    let empty = ConversationHistory::new();
    let out = t.transform(TransformMode::Reformulate, "How old is she?", &empty, &QueryContext::new()).await;
    assert_eq!(out.queries, vec!["How old is she?"]);
}

#[tokio::test]
async fn reformulation_uses_generator_output_first_line() {
    let generator = Arc::new(ScriptedGenerator::replying("\nHow old is Jane Doe, CEO of Acme?\nextra"));
    let t = QueryTransformer::new(Some(generator.clone()), 3);
    let out = t.transform(TransformMode::Reformulate, "How old is she?", &acme_history(), &QueryContext::new()).await;
    assert_eq!(out.queries, vec!["How old is Jane Doe, CEO of Acme?"]);
    let prompt = &generator.seen()[0];
    assert!(prompt.contains("Jane Doe is the CEO of Acme."));
    assert!(prompt.contains("Follow-up question: How old is she?"));
}

#[tokio::test]
async fn generator_failure_degrades_to_passthrough() {
    let t = QueryTransformer::new(Some(Arc::new(ScriptedGenerator::failing())), 3);
    for mode in [TransformMode::Reformulate, TransformMode::Expand, TransformMode::Hyde] {
        let out = t.transform(mode, "How old is she?", &acme_history(), &QueryContext::new()).await;
        assert_eq!(out.queries, vec!["How old is she?"], "{mode:?}");
        assert!(matches!(&out.degradations[..], [Degradation::TransformFallback { mode: m, .. }] if *m == mode));
    }
}

#[tokio::test]
async fn expansion_keeps_original_and_adds_distinct_sub_queries() {
    let reply = "1. python programming language\n2. python snake species\n- Python snake species\n* python monty comedy\n4. python web frameworks";
    let t = QueryTransformer::new(Some(Arc::new(ScriptedGenerator::replying(reply))), 3);
    let out = t.transform(TransformMode::Expand, "python", &ConversationHistory::new(), &QueryContext::new()).await;
    assert_eq!(
        out.queries,
        vec!["python", "python programming language", "python snake species", "python monty comedy"]
    );
    assert_eq!(out.rerank_query, "python");
}

#[tokio::test]
async fn expansion_with_nothing_usable_falls_back() {
    let t = QueryTransformer::new(Some(Arc::new(ScriptedGenerator::replying("\n  \n-\nPython\n"))), 3);
    let out = t.transform(TransformMode::Expand, "python", &ConversationHistory::new(), &QueryContext::new()).await;
    assert_eq!(out.queries, vec!["python"]);
    assert_eq!(out.degradations.len(), 1);

    let no_generator = QueryTransformer::new(None, 3);
    let out = no_generator.transform(TransformMode::Hyde, "python", &ConversationHistory::new(), &QueryContext::new()).await;
    assert_eq!(out.queries, vec!["python"]);
    assert_eq!(out.degradations.len(), 1);
}

#[tokio::test]
async fn hyde_searches_with_the_generated_passage() {
    let passage = "Photosynthesis converts light energy into chemical energy stored in glucose.";
    let generator = Arc::new(ScriptedGenerator::replying(passage));
    let t = QueryTransformer::new(Some(generator.clone()), 3);
    let context: QueryContext = [("role".to_string(), "student".into())].into_iter().collect();
    let out = t.transform(TransformMode::Hyde, "how do plants eat?", &ConversationHistory::new(), &context).await;
    assert_eq!(out.queries, vec![passage]);
    assert_eq!(out.rerank_query, "how do plants eat?");
    assert!(generator.seen()[0].contains("role=student"));
}

#[test]
fn subject_extraction() {
    assert_eq!(leading_subject("Jane Doe is the CEO of Acme.").as_deref(), Some("Jane Doe"));
    assert_eq!(leading_subject("Based on the records, Sundar Pichai leads Google.").as_deref(), Some("Sundar Pichai"));
    assert_eq!(leading_subject("The answer is unknown."), None);
}

#[test]
fn possessive_pronouns_become_possessive_subjects() {
    assert_eq!(rewrite_reference("What is her salary?", "Jane Doe is the CEO.").as_deref(), Some("What is Jane Doe's salary?"));
    assert_eq!(rewrite_reference("Tell me about her.", "Jane Doe is the CEO.").as_deref(), Some("Tell me about Jane Doe."));
    assert_eq!(rewrite_reference("Where was his office?", "John Smith founded it.").as_deref(), Some("Where was John Smith's office?"));
    assert_eq!(rewrite_reference("Tell me more", "John Smith founded it."), None);
}

#[test]
fn expansion_parser_strips_markers_dedupes_and_caps() {
    let parsed = parse_expansions("1) alpha\n2. Beta\n- beta\n\"gamma\"\n* delta", "original", 3);
    assert_eq!(parsed, vec!["alpha", "Beta", "gamma"]);
    assert!(parse_expansions("original\nORIGINAL", "original", 3).is_empty());
}
