//! Embedding capability.
//!
//! Maps text to fixed-length vectors. Providers are selected by configuration;
//! the `mock` provider is deterministic and needs no network.

pub mod providers;

pub use providers::{GeminiEmbedder, MockEmbedder, OllamaEmbedder};

use ragchat_core::config::EmbeddingSettings;
use ragchat_core::{AppError, AppResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

/// Longest wait between two attempts, in milliseconds
const MAX_BACKOFF_MS: u64 = 10_000;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "mock", "ollama", "gemini")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Embed corpus texts, one vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Embed a query.
    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_documents(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Create an embedder from configuration.
pub fn create_embedder(
    settings: &EmbeddingSettings,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn Embedder>> {
    let max_attempts = settings.max_attempts.max(1);

    match settings.provider.to_lowercase().as_str() {
        "mock" => Ok(Arc::new(MockEmbedder::new(settings.dimensions))),

        "ollama" => {
            let base_url = settings
                .endpoint
                .as_deref()
                .unwrap_or(providers::ollama::DEFAULT_OLLAMA_URL);
            Ok(Arc::new(OllamaEmbedder::new(
                base_url,
                &settings.model,
                settings.dimensions,
                max_attempts,
            )?))
        }

        "gemini" => {
            let key = api_key.ok_or_else(|| {
                AppError::Config(format!(
                    "Gemini embeddings require an API key ({})",
                    settings.api_key_env
                ))
            })?;
            let base_url = settings
                .endpoint
                .as_deref()
                .unwrap_or(providers::gemini::DEFAULT_GEMINI_URL);
            Ok(Arc::new(GeminiEmbedder::new(
                base_url,
                key,
                &settings.model,
                settings.dimensions,
                max_attempts,
            )?))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: mock, ollama, gemini",
            settings.provider
        ))),
    }
}

/// Run `op` up to `max_attempts` times with exponential backoff.
///
/// With `max_attempts == 1` this is a single call. Errors come back as
/// `AppError::Embedding`.
pub(crate) async fn with_attempts<T, F, Fut>(max_attempts: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(e.into_embedding());
                }

                let backoff = backoff_delay(attempt);
                tracing::warn!(
                    "Embedding failed (attempt {}/{}), retrying in {}ms: {}",
                    attempt,
                    max_attempts,
                    backoff.as_millis(),
                    e
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Delay before retry number `attempt`, doubling each time up to a ceiling.
fn backoff_delay(attempt: u32) -> Duration {
    let ms = INITIAL_BACKOFF_MS
        .saturating_mul(2_u64.saturating_pow(attempt))
        .min(MAX_BACKOFF_MS);
    Duration::from_millis(ms)
}

/// Reject vectors whose length does not match the configured dimensions.
pub(crate) fn check_dimensions(vector: &[f32], expected: usize) -> AppResult<()> {
    if vector.len() != expected {
        return Err(AppError::Embedding(format!(
            "Unexpected embedding dimensions: got {}, expected {}",
            vector.len(),
            expected
        )));
    }
    Ok(())
}
