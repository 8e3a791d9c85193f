//! HTTP front door.
//!
//! Routes:
//! - `GET /`: liveness message
//! - `POST /upload`: multipart upload, then ingestion
//! - `POST /chatpdf`: question against the last-ingested corpus
//! - `POST /chaturl`: question against a web page

pub mod handlers;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use ragchat_knowledge::{Pipeline, SessionStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state for all handlers.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub sessions: Arc<SessionStore>,
    /// Uploaded files land in a fresh subdirectory per request
    pub uploads_dir: PathBuf,
    /// Body cap for `/upload`
    pub max_upload_bytes: usize,
}

/// Creates the application router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/", get(handlers::root))
        .route("/upload", post(handlers::upload).layer(upload_limit))
        .route("/chatpdf", post(handlers::chat_pdf))
        .route("/chaturl", post(handlers::chat_url))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local = listener.local_addr()?;
    tracing::info!("Listening on http://{}", local);
    eprintln!("ragchat listening on http://{}", local);

    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::config::{AppConfig, IndexBackendKind, DEFAULT_MAX_UPLOAD_BYTES};
    use serde_json::Value;
    use std::net::SocketAddr;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn generator_mock(answer: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3.2",
                "response": answer,
                "done": true
            })))
            .mount(&server)
            .await;
        server
    }

    async fn start(workspace: &TempDir, generator: &MockServer) -> SocketAddr {
        let mut config = AppConfig {
            workspace: workspace.path().to_path_buf(),
            ..AppConfig::default()
        };
        config.embedding.provider = "mock".to_string();
        config.embedding.dimensions = 128;
        config.rag.index_backend = IndexBackendKind::Memory;
        config.rag.chunk_size = 300;
        config.rag.chunk_overlap = 30;
        config.generation.endpoint = Some(generator.uri());
        config.generation.stream = false;

        let pipeline = Pipeline::from_config(&config).await.unwrap();
        let state = Arc::new(AppState {
            pipeline: Arc::new(pipeline),
            sessions: Arc::new(SessionStore::new(4)),
            uploads_dir: config.uploads_dir(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_root() {
        let workspace = TempDir::new().unwrap();
        let generator = generator_mock("Hi.").await;
        let addr = start(&workspace, &generator).await;

        let body: Value = reqwest::get(format!("http://{}/", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["message"], "Hello, world!");
    }

    #[tokio::test]
    async fn test_chatpdf_before_upload_is_server_error() {
        let workspace = TempDir::new().unwrap();
        let generator = generator_mock("Hi.").await;
        let addr = start(&workspace, &generator).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/chatpdf", addr))
            .json(&serde_json::json!({"question": "What is in the file?"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("NoInputError"));
        assert!(body["response_time"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_upload_then_chatpdf() {
        let workspace = TempDir::new().unwrap();
        let generator = generator_mock("Kiwis cannot fly. They also lay").await;
        let addr = start(&workspace, &generator).await;
        let client = reqwest::Client::new();

        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(
                b"Kiwis are flightless birds native to New Zealand.".to_vec(),
            )
            .file_name("birds.txt"),
        );
        let response = client
            .post(format!("http://{}/upload", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["documents"], 1);
        assert_eq!(body["generation"], 1);

        let response = client
            .post(format!("http://{}/chatpdf", addr))
            .json(&serde_json::json!({"question": "Can kiwis fly?"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["response"], "Kiwis cannot fly.");
        assert!(body["response_time"].is_number());
    }

    #[tokio::test]
    async fn test_chaturl_reads_query_param() {
        let workspace = TempDir::new().unwrap();
        let generator = generator_mock("It is about tea.").await;
        generator_page(&generator).await;
        let addr = start(&workspace, &generator).await;

        let response = reqwest::Client::new()
            .post(format!(
                "http://{}/chaturl?url={}/page",
                addr,
                generator.uri()
            ))
            .json(&serde_json::json!({"question": "What is the page about?"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["response"], "It is about tea.");
    }

    #[tokio::test]
    async fn test_chaturl_without_url_is_no_input() {
        let workspace = TempDir::new().unwrap();
        let generator = generator_mock("x").await;
        let addr = start(&workspace, &generator).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/chaturl", addr))
            .json(&serde_json::json!({"question": "Anything?"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("NoInputError"));
    }

    fn text_part(name: &str, body: Vec<u8>) -> reqwest::multipart::Part {
        reqwest::multipart::Part::bytes(body).file_name(name.to_string())
    }

    async fn upload(addr: SocketAddr, form: reqwest::multipart::Form) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(format!("http://{}/upload", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    fn uploads_left(workspace: &TempDir) -> usize {
        let dir = workspace.path().join(".ragchat/uploads");
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[tokio::test]
    async fn test_upload_larger_than_two_megabytes() {
        let workspace = TempDir::new().unwrap();
        let generator = generator_mock("Fine.").await;
        let addr = start(&workspace, &generator).await;

        let mut body = b"Large uploads are accepted.".to_vec();
        body.resize(3 * 1024 * 1024, b'\n');
        let form = reqwest::multipart::Form::new().part("file", text_part("big.txt", body));

        let (status, body) = upload(addr, form).await;
        assert_eq!(status, 200, "{}", body);
        assert_eq!(body["documents"], 1);
    }

    #[tokio::test]
    async fn test_upload_directory_removed_after_ingest() {
        let workspace = TempDir::new().unwrap();
        let generator = generator_mock("Fine.").await;
        let addr = start(&workspace, &generator).await;

        let form = reqwest::multipart::Form::new()
            .part("file", text_part("notes.txt", b"Owls hunt at night.".to_vec()));
        let (status, _) = upload(addr, form).await;
        assert_eq!(status, 200);
        assert_eq!(uploads_left(&workspace), 0);

        // Not UTF-8, so nothing loads and ingestion fails
        let form = reqwest::multipart::Form::new()
            .part("file", text_part("broken.txt", vec![0xff, 0xfe, 0xfd]));
        let (status, body) = upload(addr, form).await;
        assert_eq!(status, 500);
        assert!(body["error"].as_str().unwrap().starts_with("LoadError"));
        assert_eq!(uploads_left(&workspace), 0);
    }

    #[tokio::test]
    async fn test_upload_keeps_parts_with_same_name() {
        let workspace = TempDir::new().unwrap();
        let generator = generator_mock("Fine.").await;
        let addr = start(&workspace, &generator).await;

        let form = reqwest::multipart::Form::new()
            .part("file", text_part("a/report.txt", b"Report one covers apples.".to_vec()))
            .part("file", text_part("b/report.txt", b"Report two covers pears.".to_vec()));

        let (status, body) = upload(addr, form).await;
        assert_eq!(status, 200);
        assert_eq!(body["documents"], 2);
    }

    async fn generator_page(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><body><h1>Tea</h1><p>Green tea is steamed, black tea is oxidized.</p></body></html>",
                "text/html; charset=utf-8",
            ))
            .mount(server)
            .await;
    }
}
