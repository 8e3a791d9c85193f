//! Published index generations, one per logical table name.
//!
//! A build for a table runs under that table's build lock, so at most one
//! ingestion per table is in flight. The finished index is published by
//! swapping an `Arc`; retrievals that already hold the previous generation
//! keep using it until they finish.

use crate::vector_index::VectorIndex;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One published, immutable build of a table.
pub struct IndexGeneration {
    /// Monotonic per table, starting at 1
    pub generation: u64,
    pub table_name: String,
    pub index: Arc<dyn VectorIndex>,
    pub record_count: usize,
    pub built_at: DateTime<Utc>,
}

impl std::fmt::Debug for IndexGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexGeneration")
            .field("generation", &self.generation)
            .field("table_name", &self.table_name)
            .field("record_count", &self.record_count)
            .field("built_at", &self.built_at)
            .finish()
    }
}

#[derive(Default)]
struct TableSlot {
    build_lock: Arc<Mutex<()>>,
    current: Option<Arc<IndexGeneration>>,
    last_generation: u64,
}

/// Tracks build locks and the current generation of every table.
#[derive(Default)]
pub struct IndexRegistry {
    tables: RwLock<HashMap<String, TableSlot>>,
}

/// Proof that the caller holds a table's build lock.
///
/// Dropping it releases the lock.
pub struct BuildPermit {
    table_name: String,
    _guard: OwnedMutexGuard<()>,
}

impl BuildPermit {
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive build rights on `table_name`.
    pub async fn lock_build(&self, table_name: &str) -> BuildPermit {
        let lock = {
            let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
            tables
                .entry(table_name.to_string())
                .or_default()
                .build_lock
                .clone()
        };

        let guard = lock.lock_owned().await;
        tracing::debug!("Acquired build lock for table '{}'", table_name);

        BuildPermit {
            table_name: table_name.to_string(),
            _guard: guard,
        }
    }

    /// Publish a finished index as the table's next generation.
    pub fn publish(&self, permit: &BuildPermit, index: Arc<dyn VectorIndex>) -> Arc<IndexGeneration> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let slot = tables.entry(permit.table_name.clone()).or_default();

        slot.last_generation += 1;
        let generation = Arc::new(IndexGeneration {
            generation: slot.last_generation,
            table_name: permit.table_name.clone(),
            record_count: index.len(),
            index,
            built_at: Utc::now(),
        });
        slot.current = Some(generation.clone());

        tracing::info!(
            "Published generation {} of table '{}' ({} records)",
            generation.generation,
            generation.table_name,
            generation.record_count
        );

        generation
    }

    /// The generation currently published for `table_name`.
    pub fn current(&self, table_name: &str) -> Option<Arc<IndexGeneration>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.get(table_name).and_then(|slot| slot.current.clone())
    }
}
