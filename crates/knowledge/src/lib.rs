//! Retrieval-augmented question answering.
//!
//! The crate turns a corpus (files, directories or a web page) into a
//! searchable vector table and answers questions against it:
//!
//! - [`loader`]: documents from PDFs, text files and HTML pages
//! - [`chunker`]: bounded, overlapping chunks
//! - [`embeddings`]: the embedding capability and its providers
//! - [`vector_index`], [`memory_index`], [`lancedb_index`]: vector storage
//! - [`registry`]: per-table build locks and published generations
//! - [`retriever`]: index building and top-k retrieval
//! - [`memory`]: conversation memory and sessions
//! - [`pipeline`]: the orchestrator tying it together

pub mod chunker;
pub mod embeddings;
pub mod finalize;
pub mod lancedb_index;
pub mod loader;
pub mod memory;
pub mod memory_index;
pub mod pipeline;
pub mod registry;
pub mod retriever;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use chunker::Chunker;
pub use embeddings::{create_embedder, Embedder};
pub use finalize::finalize_answer;
pub use loader::{DocumentLoader, Loaded, SourceLoader};
pub use memory::{ConversationMemory, SessionStore};
pub use pipeline::{Pipeline, PipelineFailure, PipelineParts, Stage};
pub use registry::{IndexGeneration, IndexRegistry};
pub use retriever::{build_index, Retriever};
pub use types::{
    AnswerReport, AskRequest, Chunk, Corpus, CorpusSource, Document, IngestReport,
    RetrievedChunk, VectorRecord,
};
pub use vector_index::{IndexBackend, VectorIndex};

pub use ragchat_prompt::{Role, Turn};
