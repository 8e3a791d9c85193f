//! Document loading from files, directories and web pages.
//!
//! Loaders never fail outright: a source that cannot be read contributes zero
//! documents and a warning. Turning "nothing loaded" into an error is the
//! orchestrator's job.

use crate::types::Document;
use ragchat_core::{AppError, AppResult};
use scraper::{Html, Selector};
use std::path::Path;
use walkdir::WalkDir;

/// File extensions picked up when walking a directory.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "txt", "md"];

/// Documents plus the reasons anything was skipped.
#[derive(Debug, Default)]
pub struct Loaded {
    pub documents: Vec<Document>,
    pub warnings: Vec<String>,
}

impl Loaded {
    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    fn push(&mut self, document: Document) {
        if document.text.trim().is_empty() {
            tracing::debug!("Dropping blank document: {}", document.metadata.source);
        } else {
            self.documents.push(document);
        }
    }

    /// Merge another result into this one, keeping order.
    pub fn extend(&mut self, other: Loaded) {
        self.documents.extend(other.documents);
        self.warnings.extend(other.warnings);
    }
}

/// Turns a source into documents.
#[async_trait::async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load a file, or every supported file below a directory.
    async fn load_from_path(&self, path: &Path) -> Loaded;

    /// Fetch a web page and reduce it to visible text.
    async fn load_from_url(&self, url: &str) -> Loaded;
}

/// Default loader: local PDFs and text files, HTML over HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct SourceLoader {
    client: reqwest::Client,
}

impl SourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    async fn load_file(&self, path: &Path) -> AppResult<Document> {
        let source = path.display().to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Load(format!("Failed to read {}: {}", source, e)))?;
        let byte_len = bytes.len();

        let (text, content_type) = match extension.as_str() {
            "pdf" => (pdf_text(bytes, &source).await?, "application/pdf"),
            "md" => (utf8_text(bytes, &source)?, "text/markdown"),
            _ => (utf8_text(bytes, &source)?, "text/plain"),
        };

        let mut document = Document::new(text, source, content_type);
        document.metadata.byte_len = byte_len;
        Ok(document)
    }

    async fn fetch(&self, url: &str) -> AppResult<Document> {
        let parsed = url::Url::parse(url)
            .map_err(|e| AppError::Load(format!("Invalid URL {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Load(format!(
                "Unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| AppError::Load(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Load(format!("Fetching {} returned {}", url, status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_lowercase())
            .unwrap_or_else(|| "text/html".to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Load(format!("Failed to read body of {}: {}", url, e)))?;
        let byte_len = bytes.len();

        let text = match content_type.as_str() {
            "application/pdf" => pdf_text(bytes.to_vec(), url).await?,
            "text/html" | "application/xhtml+xml" => {
                visible_text(&String::from_utf8_lossy(&bytes))?
            }
            ct if ct.starts_with("text/") || ct == "application/json" => {
                String::from_utf8_lossy(&bytes).into_owned()
            }
            other => {
                return Err(AppError::Load(format!(
                    "Unsupported content type {} at {}",
                    other, url
                )))
            }
        };

        let mut document = Document::new(text, parsed.as_str(), &content_type);
        document.metadata.byte_len = byte_len;
        Ok(document)
    }
}

#[async_trait::async_trait]
impl DocumentLoader for SourceLoader {
    async fn load_from_path(&self, path: &Path) -> Loaded {
        let mut loaded = Loaded::default();

        if path.is_file() {
            match self.load_file(path).await {
                Ok(doc) => loaded.push(doc),
                Err(e) => loaded.warn(e.message()),
            }
            return loaded;
        }

        if !path.is_dir() {
            loaded.warn(format!("Source does not exist: {}", path.display()));
            return loaded;
        }

        for entry in WalkDir::new(path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let entry_path = entry.path();
            if entry_path.is_file() && is_supported(entry_path) {
                match self.load_file(entry_path).await {
                    Ok(doc) => loaded.push(doc),
                    Err(e) => loaded.warn(e.message()),
                }
            }
        }

        tracing::debug!(
            "Loaded {} documents from {}",
            loaded.documents.len(),
            path.display()
        );
        loaded
    }

    async fn load_from_url(&self, url: &str) -> Loaded {
        let mut loaded = Loaded::default();
        match self.fetch(url).await {
            Ok(doc) => loaded.push(doc),
            Err(e) => loaded.warn(e.message()),
        }
        loaded
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn utf8_text(bytes: Vec<u8>, source: &str) -> AppResult<String> {
    String::from_utf8(bytes)
        .map_err(|e| AppError::Load(format!("{} is not valid UTF-8: {}", source, e)))
}

async fn pdf_text(bytes: Vec<u8>, source: &str) -> AppResult<String> {
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| AppError::Load(format!("PDF extraction task failed for {}: {}", source, e)))?;

    extracted.map_err(|e| AppError::Load(format!("Failed to extract text from {}: {}", source, e)))
}

/// Reduce an HTML page to its visible body text.
///
/// `script`, `style` and `noscript` subtrees are removed; remaining text nodes
/// are joined line by line with whitespace collapsed.
pub fn visible_text(html: &str) -> AppResult<String> {
    let mut document = Html::parse_document(html);

    let hidden = Selector::parse("script, style, noscript, template")
        .map_err(|e| AppError::Load(format!("Failed to create selector: {:?}", e)))?;
    let hidden_ids: Vec<_> = document.select(&hidden).map(|el| el.id()).collect();
    for node_id in hidden_ids {
        if let Some(mut node) = document.tree.get_mut(node_id) {
            node.detach();
        }
    }

    let body = Selector::parse("body")
        .map_err(|e| AppError::Load(format!("Failed to create selector: {:?}", e)))?;
    let root = document
        .select(&body)
        .next()
        .unwrap_or_else(|| document.root_element());

    let lines: Vec<String> = root
        .text()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect();

    Ok(lines.join("\n"))
}
