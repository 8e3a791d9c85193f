//! Gemini generator (Google Generative Language API).

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::lines::split_lines;
use futures::StreamExt;
use ragchat_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Public Generative Language endpoint.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| c.content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }

    fn finished(&self) -> bool {
        self.candidates
            .first()
            .map(|c| c.finish_reason.is_some())
            .unwrap_or(false)
    }

    fn usage(&self) -> Option<LlmUsage> {
        self.usage_metadata
            .as_ref()
            .map(|u| LlmUsage::new(u.prompt_token_count, u.candidates_token_count))
    }
}

/// Gemini generation client.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client for the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_GEMINI_URL, api_key)
    }

    /// Create a client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn to_gemini_request(&self, request: &LlmRequest) -> GenerateRequest {
        let generation_config = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            })
        } else {
            None
        };

        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config,
        }
    }

    async fn post(&self, url: String, body: &GenerateRequest) -> AppResult<reqwest::Response> {
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to send request to Gemini: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Generation(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

/// Decode one SSE line. Non-data lines (comments, event names) yield nothing.
fn parse_sse_line(line: &str) -> Option<AppResult<LlmStreamChunk>> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }

    let parsed: GenerateResponse = match serde_json::from_str(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            return Some(Err(AppError::Generation(format!(
                "Malformed Gemini stream event: {}",
                e
            ))))
        }
    };

    let done = parsed.finished();
    Some(Ok(LlmStreamChunk {
        content: parsed.text(),
        done,
        usage: if done { parsed.usage() } else { None },
    }))
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending completion request to Gemini");

        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let response = self.post(url, &self.to_gemini_request(request)).await?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to parse Gemini response: {}", e)))?;

        if parsed.candidates.is_empty() {
            return Err(AppError::Generation(
                "Gemini returned no candidates".to_string(),
            ));
        }

        Ok(LlmResponse {
            content: parsed.text(),
            model: request.model.clone(),
            usage: parsed.usage().unwrap_or_default(),
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming request to Gemini");

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, request.model
        );
        let response = self.post(url, &self.to_gemini_request(request)).await?;

        let bytes = Box::pin(
            response
                .bytes_stream()
                .map(|r| r.map_err(|e| AppError::Generation(format!("Stream error: {}", e)))),
        );

        let stream = split_lines(bytes).filter_map(|line| async move {
            match line {
                Ok(line) => parse_sse_line(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::accumulate;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_sse_line_skips_non_data() {
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("event: message").is_none());
        assert!(matches!(
            parse_sse_line("data: {oops"),
            Some(Err(AppError::Generation(_)))
        ));
    }

    #[tokio::test]
    async fn test_complete_sends_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .and(header("x-goog-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Blue."}]},"finishReason":"STOP"}],
                    "usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":1}}"#,
            ))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(server.uri(), "secret");
        let response = client
            .complete(&LlmRequest::new("Sky colour?", "gemini-1.5-flash"))
            .await
            .unwrap();

        assert_eq!(response.content, "Blue.");
        assert_eq!(response.usage.total_tokens, 5);
    }

    #[tokio::test]
    async fn test_stream_reads_sse_events() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"The sky \"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"is blue.\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
        );
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:streamGenerateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(server.uri(), "secret");
        let stream = client
            .stream(&LlmRequest::new("q", "gemini-1.5-flash").with_streaming())
            .await
            .unwrap();

        let mut tokens = Vec::new();
        let text = accumulate(stream, |t| tokens.push(t.to_string()))
            .await
            .unwrap();
        assert_eq!(text, "The sky is blue.");
        assert_eq!(tokens.len(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_is_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(server.uri(), "bad");
        let result = client.complete(&LlmRequest::new("q", "gemini-1.5-flash")).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
    }
}
