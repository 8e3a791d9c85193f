//! Index building and top-k retrieval.

use crate::embeddings::Embedder;
use crate::types::{Chunk, RetrievedChunk, VectorRecord};
use crate::vector_index::{IndexBackend, VectorIndex};
use ragchat_core::{AppError, AppResult};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Embed every chunk and store the result as table `table_name`, replacing
/// whatever the table held before.
///
/// All embeddings are computed before the backend is touched, so an
/// embedding failure leaves the stored table as it was.
#[instrument(skip(chunks, embedder, backend), fields(chunks = chunks.len(), backend = backend.name()))]
pub async fn build_index(
    chunks: &[Chunk],
    embedder: &dyn Embedder,
    backend: &dyn IndexBackend,
    table_name: &str,
) -> AppResult<Arc<dyn VectorIndex>> {
    if chunks.is_empty() {
        return Err(AppError::EmptyCorpus(format!(
            "No chunks to index for table '{}'",
            table_name
        )));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder
        .embed_documents(&texts)
        .await
        .map_err(AppError::into_embedding)?;

    if vectors.len() != chunks.len() {
        return Err(AppError::Embedding(format!(
            "Embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }

    let records: Vec<VectorRecord> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| VectorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            vector,
            text: chunk.text.clone(),
            source: chunk.source.clone(),
            chunk_index: chunk.index as u32,
        })
        .collect();

    debug!("Embedded {} chunks, writing table '{}'", records.len(), table_name);
    backend
        .create_table(table_name, records, embedder.dimensions())
        .await
}

/// Vector index plus a fixed result-count policy.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self { embedder, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Embed `query` and return up to `top_k` nearest chunks, best first.
    pub async fn retrieve(
        &self,
        index: &dyn VectorIndex,
        query: &str,
    ) -> AppResult<Vec<RetrievedChunk>> {
        let query_vector = self
            .embedder
            .embed_query(query)
            .await
            .map_err(AppError::into_embedding)?;

        index.search(&query_vector, self.top_k).await
    }
}
