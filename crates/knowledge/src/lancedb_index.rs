//! LanceDB-backed vector index implementation.

use crate::types::{RetrievedChunk, VectorRecord};
use crate::vector_index::{cosine_similarity, IndexBackend, VectorIndex};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::database::CreateTableMode;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use ragchat_core::{AppError, AppResult};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

const VECTOR_COLUMN: &str = "vector";

/// Backend storing each table as a LanceDB dataset under one directory.
pub struct LanceDbBackend {
    conn: Connection,
}

impl LanceDbBackend {
    /// Connect to (or create) the database directory at `db_path`.
    pub async fn connect(db_path: &Path) -> AppResult<Self> {
        std::fs::create_dir_all(db_path)
            .map_err(|e| AppError::Index(format!("Failed to create index directory: {}", e)))?;

        let uri = db_path.to_string_lossy().to_string();
        let conn = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| AppError::Index(format!("Failed to connect to LanceDB: {}", e)))?;

        tracing::debug!("Connected to LanceDB at {:?}", db_path);
        Ok(Self { conn })
    }

    fn create_schema(dimensions: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new(
                VECTOR_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimensions as i32,
                ),
                false,
            ),
        ]))
    }

    /// Convert all records into one RecordBatch.
    fn records_to_batch(records: &[VectorRecord], dimensions: usize) -> AppResult<RecordBatch> {
        let schema = Self::create_schema(dimensions);

        let mut flat = Vec::with_capacity(records.len() * dimensions);
        for record in records {
            if record.vector.len() != dimensions {
                return Err(AppError::Index(format!(
                    "Embedding dimension mismatch for '{}': expected {}, got {}",
                    record.id,
                    dimensions,
                    record.vector.len()
                )));
            }
            flat.extend_from_slice(&record.vector);
        }

        let id_array = StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()));
        let text_array = StringArray::from_iter_values(records.iter().map(|r| r.text.as_str()));
        let source_array =
            StringArray::from_iter_values(records.iter().map(|r| r.source.as_str()));
        let index_array = UInt32Array::from_iter_values(records.iter().map(|r| r.chunk_index));

        let vector_array = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            dimensions as i32,
            Arc::new(Float32Array::from(flat)),
            None,
        )
        .map_err(|e| AppError::Index(format!("Failed to build vector column: {}", e)))?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(id_array),
                Arc::new(text_array),
                Arc::new(source_array),
                Arc::new(index_array),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| AppError::Index(format!("Failed to create RecordBatch: {}", e)))
    }

    async fn wrap(name: &str, table: Table) -> AppResult<Arc<dyn VectorIndex>> {
        let len = table
            .count_rows(None)
            .await
            .map_err(|e| AppError::Index(format!("Failed to count rows: {}", e)))?;

        Ok(Arc::new(LanceDbIndex {
            table,
            table_name: name.to_string(),
            len,
        }))
    }
}

#[async_trait]
impl IndexBackend for LanceDbBackend {
    fn name(&self) -> &str {
        "lancedb"
    }

    async fn create_table(
        &self,
        name: &str,
        records: Vec<VectorRecord>,
        dimensions: usize,
    ) -> AppResult<Arc<dyn VectorIndex>> {
        let batch = Self::records_to_batch(&records, dimensions)?;
        let schema = batch.schema();

        let table = self
            .conn
            .create_table(name, RecordBatchIterator::new(vec![Ok(batch)], schema))
            .mode(CreateTableMode::Overwrite)
            .execute()
            .await
            .map_err(|e| AppError::Index(format!("Failed to create table '{}': {}", name, e)))?;

        tracing::debug!("Wrote {} records to LanceDB table '{}'", records.len(), name);
        Self::wrap(name, table).await
    }

    async fn open_table(&self, name: &str) -> AppResult<Option<Arc<dyn VectorIndex>>> {
        let table_names = self
            .conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::Index(format!("Failed to list tables: {}", e)))?;

        if !table_names.iter().any(|t| t == name) {
            return Ok(None);
        }

        let table = self
            .conn
            .open_table(name)
            .execute()
            .await
            .map_err(|e| AppError::Index(format!("Failed to open table '{}': {}", name, e)))?;

        Self::wrap(name, table).await.map(Some)
    }
}

/// One LanceDB table.
pub struct LanceDbIndex {
    table: Table,
    table_name: String,
    len: usize,
}

impl LanceDbIndex {
    /// Convert one result row into a hit scored against `query`.
    fn row_to_hit(batch: &RecordBatch, row_idx: usize, query: &[f32]) -> AppResult<RetrievedChunk> {
        let string_column = |name: &str| -> AppResult<String> {
            Ok(batch
                .column_by_name(name)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| AppError::Index(format!("Invalid {} column", name)))?
                .value(row_idx)
                .to_string())
        };

        let vectors = batch
            .column_by_name(VECTOR_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| AppError::Index("Invalid vector column".to_string()))?;

        let vector_ref = vectors.value(row_idx);
        let values = vector_ref
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| AppError::Index("Invalid vector values".to_string()))?;

        Ok(RetrievedChunk {
            id: string_column("id")?,
            text: string_column("text")?,
            source: string_column("source")?,
            score: cosine_similarity(query, values.values()),
        })
    }
}

#[async_trait]
impl VectorIndex for LanceDbIndex {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn len(&self) -> usize {
        self.len
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> AppResult<Vec<RetrievedChunk>> {
        if k == 0 || self.len == 0 {
            return Ok(Vec::new());
        }

        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .nearest_to(query_vector.to_vec())
            .map_err(|e| AppError::Index(format!("Failed to create query: {}", e)))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| AppError::Index(format!("Failed to execute search: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::Index(format!("Failed to collect results: {}", e)))?;

        let mut hits = Vec::new();
        for batch in &batches {
            for row_idx in 0..batch.num_rows() {
                hits.push(Self::row_to_hit(batch, row_idx, query_vector)?);
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);

        tracing::debug!(
            "Retrieved {} chunks from '{}' (requested top-{})",
            hits.len(),
            self.table_name,
            k
        );

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            text: format!("text {}", id),
            source: "test.txt".to_string(),
            chunk_index: 0,
        }
    }

    #[tokio::test]
    async fn test_create_search_and_reopen() {
        let dir = TempDir::new().unwrap();
        let backend = LanceDbBackend::connect(&dir.path().join("lance")).await.unwrap();

        let index = backend
            .create_table(
                "rag_sample",
                vec![
                    record("x", vec![1.0, 0.0, 0.0]),
                    record("y", vec![0.0, 1.0, 0.0]),
                    record("z", vec![0.0, 0.0, 1.0]),
                ],
                3,
            )
            .await
            .unwrap();
        assert_eq!(index.len(), 3);

        let hits = index.search(&[0.9, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "x");
        assert_eq!(hits[0].text, "text x");
        assert!(hits[0].score >= hits[1].score);

        let reopened = backend.open_table("rag_sample").await.unwrap().unwrap();
        assert_eq!(reopened.len(), 3);
        assert!(backend.open_table("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_overwrites_previous_rows() {
        let dir = TempDir::new().unwrap();
        let backend = LanceDbBackend::connect(dir.path()).await.unwrap();

        backend
            .create_table("t", vec![record("a1", vec![1.0, 0.0]), record("a2", vec![0.0, 1.0])], 2)
            .await
            .unwrap();
        let index = backend
            .create_table("t", vec![record("b1", vec![1.0, 0.0])], 2)
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b1");
    }

    #[test]
    fn test_batch_rejects_dimension_mismatch() {
        let result = LanceDbBackend::records_to_batch(&[record("a", vec![1.0])], 2);
        assert!(matches!(result, Err(AppError::Index(_))));
    }
}
