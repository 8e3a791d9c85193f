//! Generator provider factory.
//!
//! Resolves the configured provider name into a client, injecting the endpoint
//! override and API key.

use crate::client::LlmClient;
use crate::providers::gemini::DEFAULT_GEMINI_URL;
use crate::providers::ollama::DEFAULT_OLLAMA_URL;
use crate::providers::{GeminiClient, OllamaClient};
use ragchat_core::config::GenerationSettings;
use ragchat_core::{AppError, AppResult};
use std::sync::Arc;

/// Create a generator client from settings.
///
/// # Errors
/// Returns error if:
/// - Provider is unknown
/// - Gemini is selected without an API key
pub fn create_client(
    settings: &GenerationSettings,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    match settings.provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = settings.endpoint.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            tracing::debug!(%base_url, "Creating Ollama generator");
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        "gemini" => {
            let key = api_key.ok_or_else(|| {
                AppError::Config(format!(
                    "Gemini provider requires an API key ({})",
                    settings.api_key_env
                ))
            })?;
            let base_url = settings.endpoint.as_deref().unwrap_or(DEFAULT_GEMINI_URL);
            tracing::debug!(%base_url, "Creating Gemini generator");
            Ok(Arc::new(GeminiClient::with_base_url(base_url, key)))
        }
        _ => Err(AppError::Llm(format!(
            "Unknown provider: {}",
            settings.provider
        ))),
    }
}
