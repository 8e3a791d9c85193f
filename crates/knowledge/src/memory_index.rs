//! In-process vector backend with brute-force cosine search.

use crate::types::{RetrievedChunk, VectorRecord};
use crate::vector_index::{cosine_similarity, IndexBackend, VectorIndex};
use async_trait::async_trait;
use ragchat_core::{AppError, AppResult};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Backend that keeps tables in memory for the life of the process.
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Arc<MemoryIndex>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_table(
        &self,
        name: &str,
        records: Vec<VectorRecord>,
        dimensions: usize,
    ) -> AppResult<Arc<dyn VectorIndex>> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimensions) {
            return Err(AppError::Index(format!(
                "Record '{}' has {} dimensions, table expects {}",
                bad.id,
                bad.vector.len(),
                dimensions
            )));
        }

        let index = Arc::new(MemoryIndex {
            table_name: name.to_string(),
            records,
        });

        let mut tables = self
            .tables
            .write()
            .map_err(|_| AppError::Index("Memory backend lock poisoned".to_string()))?;
        tables.insert(name.to_string(), index.clone());

        Ok(index)
    }

    async fn open_table(&self, name: &str) -> AppResult<Option<Arc<dyn VectorIndex>>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| AppError::Index("Memory backend lock poisoned".to_string()))?;
        Ok(tables
            .get(name)
            .map(|index| index.clone() as Arc<dyn VectorIndex>))
    }
}

/// One in-memory table.
pub struct MemoryIndex {
    table_name: String,
    records: Vec<VectorRecord>,
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> AppResult<Vec<RetrievedChunk>> {
        let mut scored: Vec<(&VectorRecord, f32)> = self
            .records
            .iter()
            .map(|r| (r, cosine_similarity(query_vector, &r.vector)))
            .collect();

        // sort_by is stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(r, score)| RetrievedChunk {
                id: r.id.clone(),
                text: r.text.clone(),
                source: r.source.clone(),
                score,
            })
            .collect())
    }
}
