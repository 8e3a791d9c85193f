//! Retrieval pipeline type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

/// Metadata inherited by every chunk of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Origin identifier: file path or URL
    pub source: String,

    /// MIME-ish content type ("application/pdf", "text/html", "text/plain", ...)
    pub content_type: String,

    /// Size of the raw source in bytes
    pub byte_len: usize,
}

/// Raw text loaded from one source. Immutable, discarded after chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>, content_type: &str) -> Self {
        let text = text.into();
        let byte_len = text.len();
        Self {
            text,
            metadata: DocumentMetadata {
                source: source.into(),
                content_type: content_type.to_string(),
                byte_len,
            },
        }
    }
}

/// A contiguous piece of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Chunk text
    pub text: String,

    /// Source of the parent document
    pub source: String,

    /// Position within the parent document
    pub index: usize,

    /// Byte range of `text` within the parent document
    pub byte_range: Range<usize>,

    /// SHA-256 of `text`, hex encoded
    pub hash: String,
}

/// What gets stored in a vector table.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Unique within one table generation
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub source: String,
    pub chunk_index: u32,
}

/// One retrieval hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub source: String,
    /// Cosine similarity to the query, in `[-1, 1]`
    pub score: f32,
}

/// Where a corpus comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusSource {
    /// Files and/or directories
    Paths(Vec<PathBuf>),
    /// A single web page
    Url(String),
}

impl CorpusSource {
    /// True when there is nothing to load at all.
    pub fn is_empty(&self) -> bool {
        match self {
            CorpusSource::Paths(paths) => paths.is_empty(),
            CorpusSource::Url(url) => url.trim().is_empty(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            CorpusSource::Paths(paths) => paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            CorpusSource::Url(url) => url.clone(),
        }
    }
}

/// Which corpus a question is answered against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Corpus {
    /// Whatever generation is currently published for the configured table
    LastIngested,
    /// Ingest this source first, then answer against it
    Source(CorpusSource),
}

/// A question for the pipeline.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub corpus: Corpus,
}

impl AskRequest {
    pub fn new(question: impl Into<String>, corpus: Corpus) -> Self {
        Self {
            question: question.into(),
            corpus,
        }
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub table_name: String,
    /// Generation number now published for the table
    pub generation: u64,
    pub documents: usize,
    pub chunks: usize,
    pub built_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Outcome of a successful question.
#[derive(Debug, Clone)]
pub struct AnswerReport {
    /// Finalized answer (truncated to the last complete sentence)
    pub response: String,
    /// Answer as produced by the generator
    pub raw_response: String,
    /// Retrieved chunks, best first
    pub sources: Vec<RetrievedChunk>,
    /// Generation the answer was retrieved from
    pub generation: u64,
    pub elapsed: Duration,
}
