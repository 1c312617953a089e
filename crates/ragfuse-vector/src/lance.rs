//! LanceDB-backed vector index.
//!
//! One table holds `(id, vector)` rows. Upserts delete any previous row for
//! the id before appending; callers serialize writers.

use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};
use std::sync::Arc;

use ragfuse_core::traits::VectorIndex;
use ragfuse_core::types::DocumentId;
use ragfuse_core::{Error, Result};

use crate::schema::{build_arrow_schema, ID_COLUMN};

fn lance_err(e: impl std::fmt::Display) -> Error { Error::Index(format!("lancedb: {e}")) }

fn quote(id: &str) -> String { format!("{ID_COLUMN} = '{}'", id.replace('\'', "''")) }

pub struct LanceVectorIndex { db: Connection, table_name: String, dim: usize }

impl LanceVectorIndex {
	/// Connect to `uri` and create `table_name` if it does not exist yet.
	pub async fn open(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let db = connect(uri).execute().await.map_err(lance_err)?;
		let index = Self { db, table_name: table_name.to_string(), dim };
		index.ensure_table().await?;
		Ok(index)
	}

	async fn ensure_table(&self) -> Result<()> {
		let names = self.db.table_names().execute().await.map_err(lance_err)?;
		if names.contains(&self.table_name) { return Ok(()); }
		let schema = build_arrow_schema(self.dim);
		let empty = RecordBatch::new_empty(schema.clone());
		let batches = RecordBatchIterator::new(vec![Ok(empty)], schema);
		self.db.create_table(&self.table_name, batches).execute().await.map_err(lance_err)?;
		tracing::info!(table = %self.table_name, dim = self.dim, "created vector table");
		Ok(())
	}

	async fn table(&self) -> Result<lancedb::Table> {
		self.db.open_table(&self.table_name).execute().await.map_err(lance_err)
	}

	pub async fn count(&self) -> Result<usize> {
		self.table().await?.count_rows(None).await.map_err(lance_err)
	}
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
	fn dim(&self) -> usize { self.dim }

	async fn upsert(&self, id: &str, vector: &[f32]) -> Result<()> {
		if vector.len() != self.dim {
			return Err(Error::DimensionMismatch { id: id.to_string(), expected: self.dim, actual: vector.len() });
		}
		let schema = build_arrow_schema(self.dim);
		let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
			std::iter::once(Some(vector.iter().copied().map(Some).collect::<Vec<_>>())),
			self.dim as i32,
		);
		let batch = RecordBatch::try_new(
			schema.clone(),
			vec![Arc::new(StringArray::from(vec![id.to_string()])), Arc::new(vectors) as Arc<dyn Array>],
		)
		.map_err(lance_err)?;
		let table = self.table().await?;
		table.delete(&quote(id)).await.map_err(lance_err)?;
		table.add(RecordBatchIterator::new(vec![Ok(batch)], schema)).execute().await.map_err(lance_err)?;
		Ok(())
	}

	async fn remove(&self, id: &str) -> Result<()> {
		self.table().await?.delete(&quote(id)).await.map_err(lance_err)?;
		Ok(())
	}

	async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(DocumentId, f32)>> {
		if vector.len() != self.dim {
			return Err(Error::DimensionMismatch { id: "<query>".to_string(), expected: self.dim, actual: vector.len() });
		}
		if k == 0 { return Ok(vec![]); }
		let batches: Vec<RecordBatch> = self
			.table()
			.await?
			.vector_search(vector)
			.map_err(lance_err)?
			.distance_type(DistanceType::Cosine)
			.limit(k)
			.execute()
			.await
			.map_err(lance_err)?
			.try_collect()
			.await
			.map_err(lance_err)?;
		let mut hits = Vec::new();
		for batch in &batches {
			let ids = batch.column_by_name(ID_COLUMN).and_then(|c| c.as_any().downcast_ref::<StringArray>());
			let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
			let (Some(ids), Some(distances)) = (ids, distances) else {
				return Err(Error::Index(format!("lancedb: result batch lacks {ID_COLUMN} or _distance")));
			};
			for i in 0..batch.num_rows() {
				hits.push((ids.value(i).to_string(), 1.0 - distances.value(i)));
			}
		}
		hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		Ok(hits)
	}
}
