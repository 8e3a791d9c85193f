//! Generator abstraction and request/response types.
//!
//! A provider answers a prompt either in one piece ([`LlmClient::complete`]) or
//! as a lazy, finite, non-restartable stream of fragments ([`LlmClient::stream`]).

use futures::{Stream, StreamExt};
use ragchat_core::config::GenerationSettings;
use ragchat_core::AppResult;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The fully assembled prompt
    pub prompt: String,

    /// Model identifier (e.g., "llama3.2", "gemini-1.5-flash")
    pub model: String,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Request a token stream instead of a single response
    #[serde(default)]
    pub stream: bool,
}

impl LlmRequest {
    /// Create a new request with required fields.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            stream: false,
        }
    }

    /// Build a request from the configured generation settings.
    pub fn from_settings(prompt: impl Into<String>, settings: &GenerationSettings) -> Self {
        let mut request = Self::new(prompt, settings.model.clone());
        request.max_tokens = settings.max_tokens;
        request.temperature = settings.temperature;
        request.stream = settings.stream;
        request
    }

    /// Enable streaming for this request.
    pub fn with_streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Complete (non-streamed) generation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,

    /// Model that generated the response
    pub model: String,

    /// Usage statistics
    #[serde(default)]
    pub usage: LlmUsage,
}

/// Token usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LlmUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    /// Create usage stats from prompt and completion token counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A fragment of a streamed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStreamChunk {
    /// Incremental text content
    pub content: String,

    /// Whether this is the final fragment
    #[serde(default)]
    pub done: bool,

    /// Usage statistics (only on the final fragment, when the provider reports them)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<LlmUsage>,
}

impl LlmStreamChunk {
    /// A content fragment that is not the last one.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
            usage: None,
        }
    }
}

/// Stream of response fragments.
pub type LlmStream = Pin<Box<dyn Stream<Item = AppResult<LlmStreamChunk>> + Send>>;

/// Drain a stream into a single string, handing every fragment to `on_token`
/// in arrival order.
///
/// The accumulated text only leaves this function when the stream finished
/// cleanly; an error mid-stream discards everything received so far.
pub async fn accumulate<F>(mut stream: LlmStream, mut on_token: F) -> AppResult<String>
where
    F: FnMut(&str) + Send,
{
    let mut buffer = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.content.is_empty() {
            on_token(&chunk.content);
            buffer.push_str(&chunk.content);
        }
        if chunk.done {
            break;
        }
    }
    Ok(buffer)
}

/// Trait for generator providers.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Get the provider name (e.g., "ollama", "gemini").
    fn provider_name(&self) -> &str;

    /// Perform a blocking completion.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;

    /// Perform a streaming completion.
    ///
    /// The returned stream ends after the provider's final fragment.
    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream>;
}
