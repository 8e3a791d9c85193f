//! Route handlers.

use super::AppState;
use crate::commands::{error_text, seconds};
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ragchat_core::AppError;
use ragchat_knowledge::{AskRequest, Corpus, CorpusSource, PipelineFailure};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Failure body: `{"error": "<Kind>: <message>", "response_time": secs}`.
#[derive(Debug)]
pub struct ApiError {
    error: AppError,
    elapsed: Duration,
}

impl ApiError {
    fn new(error: AppError, started: Instant) -> Self {
        Self {
            error,
            elapsed: started.elapsed(),
        }
    }
}

impl From<PipelineFailure> for ApiError {
    fn from(failure: PipelineFailure) -> Self {
        Self {
            error: failure.error,
            elapsed: failure.elapsed,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!("Request failed: {}", self.error);
        let body = json!({
            "error": error_text(&self.error),
            "response_time": seconds(self.elapsed),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatUrlRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UrlQuery {
    pub url: Option<String>,
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Hello, world!" }))
}

/// Save every uploaded file under a fresh directory, ingest it, then remove
/// the directory. The vector table keeps the text.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let target = state.uploads_dir.join(uuid::Uuid::new_v4().to_string());

    let outcome = match receive_files(multipart, &target).await {
        Ok(saved) if saved.is_empty() => Err(ApiError::new(
            AppError::NoInput("No file was uploaded".into()),
            started,
        )),
        Ok(_) => state
            .pipeline
            .ingest(&CorpusSource::Paths(vec![target.clone()]))
            .await
            .map_err(ApiError::from),
        Err(e) => Err(ApiError::new(e, started)),
    };

    remove_upload_dir(&target).await;

    let report = outcome?;
    Ok(Json(json!({
        "status": "ingested",
        "documents": report.documents,
        "chunks": report.chunks,
        "generation": report.generation,
        "response_time": seconds(started.elapsed()),
    })))
}

async fn receive_files(mut multipart: Multipart, target: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut saved = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Load(format!("Malformed upload: {}", e)))?
    {
        let Some(name) = field.file_name().map(sanitize_file_name) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Load(format!("Failed to read {}: {}", name, e)))?;

        // Parts may share a name; the index keeps them apart
        let name = format!("{}-{}", saved.len(), name);
        let path = save_upload(target, &name, &bytes).await?;
        tracing::info!("Saved upload {} ({} bytes)", path.display(), bytes.len());
        saved.push(path);
    }

    Ok(saved)
}

async fn remove_upload_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => tracing::debug!("Removed upload directory {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove upload directory {}: {}", dir.display(), e),
    }
}

/// Answer against whatever was uploaded last.
pub async fn chat_pdf(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let request = AskRequest::new(body.question, Corpus::LastIngested);
    answer(&state, request, body.session_id.as_deref()).await
}

/// Answer against a web page; `?url=` wins over a `url` body field.
pub async fn chat_url(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
    Json(body): Json<ChatUrlRequest>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let url = query
        .url
        .or(body.url)
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| {
            ApiError::new(AppError::NoInput("No URL was given".into()), started)
        })?;

    let request = AskRequest::new(body.question, Corpus::Source(CorpusSource::Url(url)));
    answer(&state, request, body.session_id.as_deref()).await
}

async fn answer(
    state: &AppState,
    request: AskRequest,
    session_id: Option<&str>,
) -> Result<Json<Value>, ApiError> {
    let memory = state.sessions.session(session_id);
    let report = state.pipeline.ask(&request, &memory, |_| {}).await?;

    Ok(Json(json!({
        "response": report.response,
        "response_time": seconds(report.elapsed),
    })))
}

async fn save_upload(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Keep only the final path component, with anything unusual replaced.
fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
