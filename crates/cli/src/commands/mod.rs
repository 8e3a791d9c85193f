//! Command handlers for the ragchat CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod chat;
pub mod ingest;
pub mod serve;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use ingest::IngestCommand;
pub use serve::ServeCommand;

use ragchat_core::AppError;
use ragchat_knowledge::{CorpusSource, PipelineFailure};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Source selected by `--path`/positional paths and `--url`.
///
/// A URL wins over paths; `None` when neither was given.
pub(crate) fn corpus_source(paths: &[PathBuf], url: Option<&str>) -> Option<CorpusSource> {
    match url {
        Some(url) => Some(CorpusSource::Url(url.to_string())),
        None if !paths.is_empty() => Some(CorpusSource::Paths(paths.to_vec())),
        None => None,
    }
}

/// `"<Kind>: <message>"`, as reported to API and JSON consumers.
pub(crate) fn error_text(error: &AppError) -> String {
    format!("{}: {}", error.kind(), error.message())
}

pub(crate) fn failure_json(failure: &PipelineFailure) -> Value {
    json!({
        "error": error_text(&failure.error),
        "response_time": seconds(failure.elapsed),
    })
}

pub(crate) fn seconds(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64()
}
