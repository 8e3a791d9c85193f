//! Configuration management for ragchat.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - Config file (`.ragchat/config.yaml` or `RAGCHAT_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with all state stored in `.ragchat/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;

/// Providers that can serve generation requests.
pub const GENERATION_PROVIDERS: [&str; 2] = ["ollama", "gemini"];

/// Providers that can serve embedding requests.
pub const EMBEDDING_PROVIDERS: [&str; 3] = ["ollama", "gemini", "mock"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragchat/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// API key override for whichever provider needs one
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Log filter override
    pub log_level: Option<String>,

    /// Log output format
    #[serde(skip)]
    pub log_format: LogFormat,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    pub generation: GenerationSettings,
    pub embedding: EmbeddingSettings,
    pub rag: RagSettings,
    pub timeouts: TimeoutSettings,
    pub memory: MemorySettings,
    pub server: ServerSettings,
}

/// Generator (chat model) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    /// "ollama" or "gemini"
    pub provider: String,
    pub model: String,
    /// Base URL override
    pub endpoint: Option<String>,
    /// Environment variable holding the API key (Gemini)
    pub api_key_env: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Accumulate answers from a token stream instead of a single response
    pub stream: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            temperature: None,
            max_tokens: None,
            stream: true,
        }
    }
}

/// Embedder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// "ollama", "gemini" or "mock"
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub endpoint: Option<String>,
    pub api_key_env: String,
    /// Attempts per embedding call; 1 means at-most-once
    pub max_attempts: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            endpoint: None,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            max_attempts: 1,
        }
    }
}

/// Which vector storage backs the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackendKind {
    /// Persistent LanceDB tables under `.ragchat/lance`
    Lancedb,
    /// Process-local tables, lost on exit
    Memory,
}

/// Retrieval pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RagSettings {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Maximum overlap between adjacent chunks in characters
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question
    pub top_k: usize,
    /// Logical table name; a new ingestion replaces its content
    pub table_name: String,
    pub index_backend: IndexBackendKind,
    /// Default corpus directory for interactive chat
    pub data_dir: PathBuf,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 3,
            table_name: "rag_sample".to_string(),
            index_backend: IndexBackendKind::Lancedb,
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Optional per-stage timeouts, in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutSettings {
    pub ingest_secs: Option<u64>,
    pub index_secs: Option<u64>,
    pub generate_secs: Option<u64>,
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySettings {
    /// Named sessions kept before the least recently used one is evicted
    pub max_sessions: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self { max_sessions: 64 }
    }
}

/// HTTP front door settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub bind: String,
    /// Request body cap for `/upload`, in bytes
    pub max_upload_bytes: usize,
}

/// Default upload cap: 64 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Upper bound for `embedding.maxAttempts`.
pub const MAX_EMBEDDING_ATTEMPTS: u32 = 10;

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    generation: Option<GenerationSettings>,
    embedding: Option<EmbeddingSettings>,
    rag: Option<RagSettings>,
    timeouts: Option<TimeoutSettings>,
    memory: Option<MemorySettings>,
    server: Option<ServerSettings>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    format: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            api_key: None,
            log_level: None,
            log_format: LogFormat::Text,
            verbose: false,
            no_color: false,
            generation: GenerationSettings::default(),
            embedding: EmbeddingSettings::default(),
            rag: RagSettings::default(),
            timeouts: TimeoutSettings::default(),
            memory: MemorySettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `RAGCHAT_WORKSPACE`: Override workspace path
    /// - `RAGCHAT_CONFIG`: Path to config file
    /// - `RAGCHAT_PROVIDER`: Generation provider
    /// - `RAGCHAT_MODEL`: Generation model
    /// - `RAGCHAT_EMBEDDING_PROVIDER`: Embedding provider
    /// - `RAGCHAT_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Like [`AppConfig::load`], with explicit workspace/config-file paths
    /// taking precedence over the environment.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("RAGCHAT_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }
        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }

        if let Ok(config_file) = std::env::var("RAGCHAT_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }
        if let Some(config_file) = config_file {
            config.config_file = Some(config_file);
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.ragchat_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("RAGCHAT_PROVIDER") {
            config.generation.provider = provider;
        }
        if let Ok(model) = std::env::var("RAGCHAT_MODEL") {
            config.generation.model = model;
        }
        if let Ok(provider) = std::env::var("RAGCHAT_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }

        config.api_key = std::env::var("RAGCHAT_API_KEY").ok();
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into a copy of this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.clone().merge(config_file))
    }

    fn merge(mut self, file: ConfigFile) -> Self {
        if let Some(path) = file.workspace.and_then(|ws| ws.path) {
            self.workspace = PathBuf::from(path);
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(format) = logging.format.as_deref().and_then(LogFormat::parse) {
                self.log_format = format;
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
        }

        if let Some(generation) = file.generation {
            self.generation = generation;
        }
        if let Some(embedding) = file.embedding {
            self.embedding = embedding;
        }
        if let Some(rag) = file.rag {
            self.rag = rag;
        }
        if let Some(timeouts) = file.timeouts {
            self.timeouts = timeouts;
        }
        if let Some(memory) = file.memory {
            self.memory = memory;
        }
        if let Some(server) = file.server {
            self.server = server;
        }

        self
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over the file and environment.
    pub fn with_overrides(
        mut self,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(provider) = provider {
            self.generation.provider = provider;
        }

        if let Some(model) = model {
            self.generation.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .ragchat directory.
    pub fn ragchat_dir(&self) -> PathBuf {
        self.workspace.join(".ragchat")
    }

    /// Ensure the .ragchat directory exists.
    pub fn ensure_ragchat_dir(&self) -> AppResult<()> {
        let dir = self.ragchat_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .ragchat directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Directory holding LanceDB tables.
    pub fn index_dir(&self) -> PathBuf {
        self.ragchat_dir().join("lance")
    }

    /// Directory receiving uploaded files.
    pub fn uploads_dir(&self) -> PathBuf {
        self.ragchat_dir().join("uploads")
    }

    /// The corpus directory used when `chat` is started without a source.
    pub fn data_dir(&self) -> PathBuf {
        if self.rag.data_dir.is_absolute() {
            self.rag.data_dir.clone()
        } else {
            self.workspace.join(&self.rag.data_dir)
        }
    }

    /// Resolve the API key for a provider that needs one.
    ///
    /// `RAGCHAT_API_KEY` wins, then the provider's configured environment variable.
    pub fn resolve_api_key(&self, api_key_env: &str) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Validate configuration before any component is built.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.generation.provider.to_lowercase();
        if !GENERATION_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown generation provider: {}. Supported: {}",
                self.generation.provider,
                GENERATION_PROVIDERS.join(", ")
            )));
        }

        let embedding_provider = self.embedding.provider.to_lowercase();
        if !EMBEDDING_PROVIDERS.contains(&embedding_provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.rag.chunk_size == 0 {
            return Err(AppError::Config("chunkSize must be positive".to_string()));
        }

        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(AppError::Config(format!(
                "chunkOverlap ({}) must be smaller than chunkSize ({})",
                self.rag.chunk_overlap, self.rag.chunk_size
            )));
        }

        if self.rag.top_k == 0 {
            return Err(AppError::Config("topK must be at least 1".to_string()));
        }

        if !(1..=MAX_EMBEDDING_ATTEMPTS).contains(&self.embedding.max_attempts) {
            return Err(AppError::Config(format!(
                "embedding maxAttempts must be between 1 and {}",
                MAX_EMBEDDING_ATTEMPTS
            )));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(AppError::Config(
                "server maxUploadBytes must be positive".to_string(),
            ));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        if provider == "gemini" && self.resolve_api_key(&self.generation.api_key_env).is_none() {
            return Err(AppError::Config(format!(
                "API key not found in environment variable: {}",
                self.generation.api_key_env
            )));
        }

        if embedding_provider == "gemini"
            && self.resolve_api_key(&self.embedding.api_key_env).is_none()
        {
            return Err(AppError::Config(format!(
                "API key not found in environment variable: {}",
                self.embedding.api_key_env
            )));
        }

        Ok(())
    }
}
