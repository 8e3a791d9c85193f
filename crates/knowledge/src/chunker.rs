//! Text chunking with configurable size and overlap.
//!
//! Splitting is delegated to `text-splitter`, which works down the semantic
//! levels (paragraphs, lines, sentences, words, graphemes, characters) and
//! only cuts at a lower level when a higher one does not fit. Sizes are
//! measured in characters.

use crate::types::{Chunk, Document};
use ragchat_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use text_splitter::{ChunkConfig, TextSplitter};

/// Deterministic document chunker.
pub struct Chunker {
    splitter: TextSplitter<text_splitter::Characters>,
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker. Requires `overlap < size`.
    pub fn new(size: usize, overlap: usize) -> AppResult<Self> {
        if size == 0 {
            return Err(AppError::Config("Chunk size must be positive".to_string()));
        }
        if overlap >= size {
            return Err(AppError::Config(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }

        let config = ChunkConfig::new(size)
            .with_overlap(overlap)
            .map_err(|e| AppError::Config(format!("Invalid chunk configuration: {}", e)))?;

        Ok(Self {
            splitter: TextSplitter::new(config),
            size,
            overlap,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split one document.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.splitter
            .chunk_indices(&document.text)
            .filter(|(_, text)| !text.trim().is_empty())
            .enumerate()
            .map(|(index, (offset, text))| Chunk {
                text: text.to_string(),
                source: document.metadata.source.clone(),
                index,
                byte_range: offset..offset + text.len(),
                hash: calculate_hash(text),
            })
            .collect()
    }

    /// Split documents in order; chunks of one document stay contiguous.
    pub fn chunk(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.chunk_document(doc))
            .collect();

        tracing::debug!(
            "Chunked {} documents into {} chunks (size {}, overlap {})",
            documents.len(),
            chunks.len(),
            self.size,
            self.overlap
        );

        chunks
    }
}

/// Calculate SHA-256 hash of text.
pub fn calculate_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
