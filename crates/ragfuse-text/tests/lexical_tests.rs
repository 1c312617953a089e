use ragfuse_core::traits::TextIndexer;
use ragfuse_core::types::is_ranked;
use ragfuse_core::{Document, Source};
use ragfuse_text::TantivyIndexer;

fn corpus() -> Vec<Document> {
    vec![
        Document::new("d1", "cats are mammals"),
        Document::new("d2", "dogs are mammals"),
        Document::new("d3", "the sky is blue"),
    ]
}

fn ids(hits: &[ragfuse_core::Candidate]) -> Vec<&str> { hits.iter().map(|h| h.document_id.as_str()).collect() }

#[test]
fn overlap_ranks_and_excludes_zero_overlap() {
    let mut index = TantivyIndexer::new().expect("indexer");
    index.upsert(&corpus()).expect("upsert");

    let hits = index.search("mammals cats", 10).expect("search");
    assert_eq!(ids(&hits), vec!["d1", "d2"], "d3 shares no term and is excluded");
    assert!(hits.iter().all(|h| h.source == Source::Lexical && h.score > 0.0));
    assert!(is_ranked(&hits));
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn search_respects_k() {
    let mut index = TantivyIndexer::new().expect("indexer");
    index.upsert(&corpus()).expect("upsert");
    let hits = index.search("mammals", 1).expect("search");
    assert_eq!(hits.len(), 1);
}

#[test]
fn empty_index_and_stopword_queries_return_nothing() {
    let mut index = TantivyIndexer::new().expect("indexer");
    assert!(index.search("cats", 5).expect("search").is_empty());

    index.upsert(&corpus()).expect("upsert");
    assert!(index.search("the is are", 5).expect("search").is_empty(), "stopwords only");
    assert!(index.search("", 5).expect("search").is_empty());
}

#[test]
fn query_syntax_characters_are_plain_text() {
    let mut index = TantivyIndexer::new().expect("indexer");
    index.upsert(&corpus()).expect("upsert");
    let hits = index.search("sky: (blue)?", 5).expect("search");
    assert_eq!(ids(&hits), vec!["d3"]);
}

#[test]
fn upsert_replaces_existing_id() {
    let mut index = TantivyIndexer::new().expect("indexer");
    index.upsert(&corpus()).expect("upsert");
    index.upsert(&[Document::new("d3", "whales are mammals too")]).expect("replace");

    assert_eq!(index.num_docs(), 3);
    assert!(index.search("sky", 5).expect("search").is_empty(), "old content is gone");
    let hits = index.search("whales", 5).expect("search");
    assert_eq!(ids(&hits), vec!["d3"]);
}
