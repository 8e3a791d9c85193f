//! Vector index abstraction.
//!
//! An [`IndexBackend`] creates tables; each table is a [`VectorIndex`] that
//! answers nearest-neighbor queries. Tables are always built whole: creating
//! a table under an existing name replaces its contents.

use crate::types::{RetrievedChunk, VectorRecord};
use async_trait::async_trait;
use ragchat_core::AppResult;
use std::sync::Arc;

/// One built, immutable table of vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Logical table name this index was built under.
    fn table_name(&self) -> &str;

    /// Number of stored records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return at most `min(k, len())` records, best first.
    ///
    /// Scores are cosine similarities in `[-1, 1]`.
    async fn search(&self, query_vector: &[f32], k: usize) -> AppResult<Vec<RetrievedChunk>>;
}

/// Storage that can create and reopen tables.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Backend identifier for logs ("memory", "lancedb").
    fn name(&self) -> &str;

    /// Create `name` from `records`, discarding anything previously stored
    /// under that name.
    async fn create_table(
        &self,
        name: &str,
        records: Vec<VectorRecord>,
        dimensions: usize,
    ) -> AppResult<Arc<dyn VectorIndex>>;

    /// Reopen a previously created table, if the backend persists them.
    async fn open_table(&self, name: &str) -> AppResult<Option<Arc<dyn VectorIndex>>>;
}

/// Calculate cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
