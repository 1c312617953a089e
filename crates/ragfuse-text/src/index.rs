use std::collections::BTreeSet;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::{TextAnalyzer, TokenStream};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use ragfuse_core::traits::TextIndexer;
use ragfuse_core::{Candidate, Document, Error, Result, Source};

use crate::tantivy_utils::{build_analyzer, build_schema, register_tokenizer, ID_FIELD, TEXT_FIELD};

const WRITER_MEMORY_BYTES: usize = 50_000_000;

fn index_err(e: impl std::fmt::Display) -> Error { Error::Index(format!("tantivy: {e}")) }

/// In-memory BM25 index over document content.
///
/// Scores are raw BM25 sums: unbounded and not comparable to dense similarities.
pub struct TantivyIndexer {
	writer: IndexWriter,
	reader: IndexReader,
	analyzer: TextAnalyzer,
	id_field: Field,
	text_field: Field,
}

impl TantivyIndexer {
	pub fn new() -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let id_field = schema.get_field(ID_FIELD).map_err(index_err)?;
		let text_field = schema.get_field(TEXT_FIELD).map_err(index_err)?;
		let writer = index.writer_with_num_threads(1, WRITER_MEMORY_BYTES).map_err(index_err)?;
		let reader: IndexReader = index
			.reader_builder()
			.reload_policy(ReloadPolicy::Manual)
			.try_into()
			.map_err(index_err)?;
		Ok(Self { writer, reader, analyzer: build_analyzer(), id_field, text_field })
	}

	/// Number of live documents visible to searches.
	pub fn num_docs(&self) -> u64 { self.reader.searcher().num_docs() }

	/// Distinct analyzed terms of `text`, in sorted order.
	pub fn terms(&self, text: &str) -> Vec<String> {
		let mut analyzer = self.analyzer.clone();
		let mut stream = analyzer.token_stream(text);
		let mut terms = BTreeSet::new();
		while stream.advance() {
			terms.insert(stream.token().text.clone());
		}
		terms.into_iter().collect()
	}

	fn stage(&mut self, documents: &[Document]) -> tantivy::Result<()> {
		for d in documents {
			self.writer.delete_term(Term::from_field_text(self.id_field, &d.id));
			self.writer.add_document(doc!(
				self.id_field => d.id.clone(),
				self.text_field => d.content.clone(),
			))?;
		}
		self.writer.commit()?;
		Ok(())
	}
}

impl TextIndexer for TantivyIndexer {
	fn upsert(&mut self, documents: &[Document]) -> Result<()> {
		if documents.is_empty() { return Ok(()); }
		if let Err(e) = self.stage(documents) {
			tracing::warn!(error = %e, "lexical upsert failed, rolling back");
			self.writer.rollback().map_err(index_err)?;
			return Err(index_err(e));
		}
		self.reader.reload().map_err(index_err)?;
		tracing::debug!(staged = documents.len(), live = self.num_docs(), "lexical index committed");
		Ok(())
	}

	fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
		let terms = self.terms(query);
		if terms.is_empty() || k == 0 { return Ok(vec![]); }
		let clauses: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|t| {
				let term = Term::from_field_text(self.text_field, t);
				(Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
			})
			.collect();
		let q = BooleanQuery::new(clauses);
		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&q, &TopDocs::with_limit(k)).map_err(index_err)?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			if score <= 0.0 { continue; }
			let doc: TantivyDocument = searcher.doc(addr).map_err(index_err)?;
			let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) else { continue };
			hits.push(Candidate::new(id, score, Source::Lexical));
		}
		ragfuse_core::types::sort_ranked(&mut hits);
		Ok(hits)
	}
}
