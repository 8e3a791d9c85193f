//! Error types for ragchat.
//!
//! One enum covers the retrieval pipeline's failure taxonomy (no input, load,
//! empty corpus, embedding, generation) plus the ambient categories every
//! crate needs (configuration, I/O, storage, prompt rendering, serialization).

use thiserror::Error;

/// Unified error type for ragchat.
///
/// All functions in the workspace return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request arrived without any source or question
    #[error("No input: {0}")]
    NoInput(String),

    /// The source produced zero documents
    #[error("Load error: {0}")]
    Load(String),

    /// Chunking or indexing was handed zero chunks
    #[error("Empty corpus: {0}")]
    EmptyCorpus(String),

    /// The embedding capability failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector storage failures (table create/open/search)
    #[error("Index error: {0}")]
    Index(String),

    /// The generation capability failed or produced a malformed stream
    #[error("Generation error: {0}")]
    Generation(String),

    /// LLM provider construction errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Stable taxonomy name, used in JSON error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "ConfigError",
            AppError::Io(_) => "IoError",
            AppError::NoInput(_) => "NoInputError",
            AppError::Load(_) => "LoadError",
            AppError::EmptyCorpus(_) => "EmptyCorpusError",
            AppError::Embedding(_) => "EmbeddingError",
            AppError::Index(_) => "IndexError",
            AppError::Generation(_) => "GenerationError",
            AppError::Llm(_) => "LlmError",
            AppError::Prompt(_) => "PromptError",
            AppError::Serialization(_) => "SerializationError",
            AppError::Other(_) => "Error",
        }
    }

    /// The message without the category prefix.
    pub fn message(&self) -> String {
        match self {
            AppError::Io(e) => e.to_string(),
            AppError::Config(m)
            | AppError::NoInput(m)
            | AppError::Load(m)
            | AppError::EmptyCorpus(m)
            | AppError::Embedding(m)
            | AppError::Index(m)
            | AppError::Generation(m)
            | AppError::Llm(m)
            | AppError::Prompt(m)
            | AppError::Serialization(m)
            | AppError::Other(m) => m.clone(),
        }
    }

    /// Reclassify any error raised while talking to the embedding capability.
    pub fn into_embedding(self) -> Self {
        match self {
            AppError::Embedding(_) => self,
            other => AppError::Embedding(other.message()),
        }
    }

    /// Reclassify any error raised while talking to the generation capability.
    pub fn into_generation(self) -> Self {
        match self {
            AppError::Generation(_) => self,
            other => AppError::Generation(other.message()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
