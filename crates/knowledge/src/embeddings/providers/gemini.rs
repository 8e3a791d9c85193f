//! Gemini embedding provider (Google Generative Language API).

use crate::embeddings::{check_dimensions, with_attempts, Embedder};
use async_trait::async_trait;
use ragchat_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

/// Public Generative Language endpoint.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Upper bound on requests per `batchEmbedContents` call.
const MAX_BATCH: usize = 100;

const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    max_attempts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

impl GeminiEmbedder {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        dimensions: usize,
        max_attempts: u32,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                AppError::Embedding(format!("Failed to create HTTP client for Gemini: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.trim_start_matches("models/").to_string(),
            dimensions,
            max_attempts,
        })
    }

    fn request<'a>(&self, text: &'a str, task_type: &'static str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part { text }],
            },
            task_type,
        }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> AppResult<R> {
        let url = format!("{}/models/{}:{}", self.base_url, self.model, method);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("Failed to send request to Gemini: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Embedding(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("Failed to parse Gemini response: {}", e)))
    }

    async fn embed_batch_once(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| self.request(t, "RETRIEVAL_DOCUMENT"))
                .collect(),
        };

        let response: BatchEmbedResponse = self.post("batchEmbedContents", &body).await?;

        if response.embeddings.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "Gemini returned {} embeddings for {} texts",
                response.embeddings.len(),
                texts.len()
            )));
        }

        response
            .embeddings
            .into_iter()
            .map(|e| {
                check_dimensions(&e.values, self.dimensions)?;
                Ok(e.values)
            })
            .collect()
    }

    async fn embed_query_once(&self, text: &str) -> AppResult<Vec<f32>> {
        let response: EmbedContentResponse = self
            .post("embedContent", &self.request(text, "RETRIEVAL_QUERY"))
            .await?;
        check_dimensions(&response.embedding.values, self.dimensions)?;
        Ok(response.embedding.values)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), model = %self.model))]
    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            let vectors = with_attempts(self.max_attempts, || self.embed_batch_once(batch)).await?;
            embeddings.extend(vectors);
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        with_attempts(self.max_attempts, || self.embed_query_once(text)).await
    }
}
