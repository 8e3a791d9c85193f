//! Request orchestration.
//!
//! Every request walks a fixed sequence of stages:
//!
//! ```text
//! Idle → Ingesting → Chunking → Indexing → Retrieving → PromptBuilding
//!      → Generating → Finalizing → Recording → Done
//! ```
//!
//! Questions against the last-ingested corpus skip the first three. Any
//! failure stops the request and is reported as a [`PipelineFailure`] naming
//! the stage it happened in and the time spent since the request started.
//! Nothing is retried here.

use crate::chunker::Chunker;
use crate::embeddings::{create_embedder, Embedder};
use crate::finalize::finalize_answer;
use crate::lancedb_index::LanceDbBackend;
use crate::loader::{DocumentLoader, Loaded, SourceLoader};
use crate::memory::ConversationMemory;
use crate::memory_index::MemoryBackend;
use crate::registry::{BuildPermit, IndexGeneration, IndexRegistry};
use crate::retriever::{build_index, Retriever};
use crate::types::{AnswerReport, AskRequest, Corpus, CorpusSource, IngestReport};
use crate::vector_index::IndexBackend;
use ragchat_core::config::{GenerationSettings, IndexBackendKind, RagSettings, TimeoutSettings};
use ragchat_core::{AppConfig, AppError, AppResult};
use ragchat_llm::client::accumulate;
use ragchat_llm::{create_client, LlmClient, LlmRequest};
use ragchat_prompt::PromptAssembler;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Ingesting,
    Chunking,
    Indexing,
    Retrieving,
    PromptBuilding,
    Generating,
    Finalizing,
    Recording,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "Idle",
            Stage::Ingesting => "Ingesting",
            Stage::Chunking => "Chunking",
            Stage::Indexing => "Indexing",
            Stage::Retrieving => "Retrieving",
            Stage::PromptBuilding => "PromptBuilding",
            Stage::Generating => "Generating",
            Stage::Finalizing => "Finalizing",
            Stage::Recording => "Recording",
            Stage::Done => "Done",
        };
        f.write_str(name)
    }
}

/// A request that ended in the `Errored` state.
#[derive(Debug, thiserror::Error)]
#[error("{error} (during {stage}, after {:.3}s)", .elapsed.as_secs_f64())]
pub struct PipelineFailure {
    /// Stage that was active when the request failed
    pub stage: Stage,
    pub error: AppError,
    /// Wall-clock time from request start to the failure
    pub elapsed: Duration,
}

/// Tracks the active stage and the request's start time.
struct StageTracker {
    stage: Stage,
    started: Instant,
}

impl StageTracker {
    fn start() -> Self {
        Self {
            stage: Stage::Idle,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = %self.stage, to = %stage, "stage transition");
        self.stage = stage;
    }

    fn fail(&self, error: AppError) -> PipelineFailure {
        let failure = PipelineFailure {
            stage: self.stage,
            error,
            elapsed: self.started.elapsed(),
        };
        warn!(
            stage = %failure.stage,
            kind = failure.error.kind(),
            elapsed_ms = failure.elapsed.as_millis() as u64,
            "Request failed: {}",
            failure.error
        );
        failure
    }
}

/// Collaborators and settings a pipeline is assembled from.
pub struct PipelineParts {
    pub loader: Arc<dyn DocumentLoader>,
    pub embedder: Arc<dyn Embedder>,
    pub backend: Arc<dyn IndexBackend>,
    pub generator: Arc<dyn LlmClient>,
    pub assembler: PromptAssembler,
    pub rag: RagSettings,
    pub generation: GenerationSettings,
    pub timeouts: TimeoutSettings,
}

/// The retrieval-augmented answering pipeline.
pub struct Pipeline {
    loader: Arc<dyn DocumentLoader>,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn IndexBackend>,
    registry: IndexRegistry,
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: Arc<dyn LlmClient>,
    generation: GenerationSettings,
    table_name: String,
    timeouts: TimeoutSettings,
}

impl Pipeline {
    pub fn new(parts: PipelineParts) -> AppResult<Self> {
        if parts.rag.top_k == 0 {
            return Err(AppError::Config("topK must be at least 1".to_string()));
        }

        let chunker = Chunker::new(parts.rag.chunk_size, parts.rag.chunk_overlap)?;
        let retriever = Retriever::new(parts.embedder.clone(), parts.rag.top_k);

        Ok(Self {
            loader: parts.loader,
            chunker,
            embedder: parts.embedder,
            backend: parts.backend,
            registry: IndexRegistry::new(),
            retriever,
            assembler: parts.assembler,
            generator: parts.generator,
            generation: parts.generation,
            table_name: parts.rag.table_name,
            timeouts: parts.timeouts,
        })
    }

    /// Build a pipeline from configuration and restore the last persisted
    /// table, if any.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let embedding_key = config.resolve_api_key(&config.embedding.api_key_env);
        let embedder = create_embedder(&config.embedding, embedding_key.as_deref())?;

        let generation_key = config.resolve_api_key(&config.generation.api_key_env);
        let generator = create_client(&config.generation, generation_key.as_deref())?;

        let backend: Arc<dyn IndexBackend> = match config.rag.index_backend {
            IndexBackendKind::Lancedb => {
                config.ensure_ragchat_dir()?;
                Arc::new(LanceDbBackend::connect(&config.index_dir()).await?)
            }
            IndexBackendKind::Memory => Arc::new(MemoryBackend::new()),
        };

        let pipeline = Self::new(PipelineParts {
            loader: Arc::new(SourceLoader::new()),
            embedder,
            backend,
            generator,
            assembler: PromptAssembler::for_workspace(&config.workspace)?,
            rag: config.rag.clone(),
            generation: config.generation.clone(),
            timeouts: config.timeouts.clone(),
        })?;

        info!(
            embedder = %format!("{}/{}", pipeline.embedder.provider_name(), pipeline.embedder.model_name()),
            generator = pipeline.generator.provider_name(),
            backend = pipeline.backend.name(),
            table = %pipeline.table_name,
            "Pipeline ready"
        );

        pipeline.restore().await?;
        Ok(pipeline)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn top_k(&self) -> usize {
        self.retriever.top_k()
    }

    /// The generation questions without a source are answered from.
    pub fn current_generation(&self) -> Option<Arc<IndexGeneration>> {
        self.registry.current(&self.table_name)
    }

    /// Publish the table persisted by a previous process, if the backend
    /// still has it.
    pub async fn restore(&self) -> AppResult<Option<Arc<IndexGeneration>>> {
        let permit = self.registry.lock_build(&self.table_name).await;
        if self.registry.current(&self.table_name).is_some() {
            return Ok(self.registry.current(&self.table_name));
        }

        match self.backend.open_table(&self.table_name).await? {
            Some(index) if !index.is_empty() => {
                info!(
                    "Restored table '{}' with {} records",
                    self.table_name,
                    index.len()
                );
                Ok(Some(self.registry.publish(&permit, index)))
            }
            _ => Ok(None),
        }
    }

    /// Load, chunk and index `source`, replacing the table's contents.
    pub async fn ingest(&self, source: &CorpusSource) -> Result<IngestReport, PipelineFailure> {
        let span = tracing::info_span!("pipeline", request = %request_id(), op = "ingest");

        async {
            let mut tracker = StageTracker::start();
            match self.ingest_stages(source, &mut tracker).await {
                Ok((generation, documents)) => {
                    tracker.enter(Stage::Done);
                    let report = IngestReport {
                        table_name: generation.table_name.clone(),
                        generation: generation.generation,
                        documents,
                        chunks: generation.record_count,
                        built_at: generation.built_at,
                        elapsed: tracker.started.elapsed(),
                    };
                    info!(
                        documents = report.documents,
                        chunks = report.chunks,
                        generation = report.generation,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "Ingestion complete"
                    );
                    Ok(report)
                }
                Err(e) => Err(tracker.fail(e)),
            }
        }
        .instrument(span)
        .await
    }

    /// Answer a question and record the exchange in `memory`.
    ///
    /// Generated text is handed to `on_token` as it arrives. `memory` is
    /// only written once the full answer has been accumulated and
    /// finalized; a failed or dropped request leaves it untouched.
    pub async fn ask<F>(
        &self,
        request: &AskRequest,
        memory: &ConversationMemory,
        on_token: F,
    ) -> Result<AnswerReport, PipelineFailure>
    where
        F: FnMut(&str) + Send,
    {
        let span = tracing::info_span!("pipeline", request = %request_id(), op = "ask");

        async {
            let mut tracker = StageTracker::start();
            match self.ask_stages(request, memory, on_token, &mut tracker).await {
                Ok(mut report) => {
                    tracker.enter(Stage::Done);
                    report.elapsed = tracker.started.elapsed();
                    info!(
                        generation = report.generation,
                        sources = report.sources.len(),
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "Answered question"
                    );
                    Ok(report)
                }
                Err(e) => Err(tracker.fail(e)),
            }
        }
        .instrument(span)
        .await
    }

    async fn ingest_stages(
        &self,
        source: &CorpusSource,
        tracker: &mut StageTracker,
    ) -> AppResult<(Arc<IndexGeneration>, usize)> {
        if source.is_empty() {
            return Err(AppError::NoInput(
                "No files or URL were provided".to_string(),
            ));
        }

        let permit = self.registry.lock_build(&self.table_name).await;
        self.ingest_locked(source, &permit, tracker).await
    }

    async fn ingest_locked(
        &self,
        source: &CorpusSource,
        permit: &BuildPermit,
        tracker: &mut StageTracker,
    ) -> AppResult<(Arc<IndexGeneration>, usize)> {
        tracker.enter(Stage::Ingesting);
        let loaded = within(self.timeouts.ingest_secs, self.load(source), |limit| {
            AppError::Load(format!("Loading timed out after {}s", limit.as_secs()))
        })
        .await?;

        if loaded.documents.is_empty() {
            let detail = if loaded.warnings.is_empty() {
                "no supported documents found".to_string()
            } else {
                loaded.warnings.join("; ")
            };
            return Err(AppError::Load(format!(
                "{} produced zero documents: {}",
                source.describe(),
                detail
            )));
        }
        let documents = loaded.documents.len();

        tracker.enter(Stage::Chunking);
        let chunks = self.chunker.chunk(&loaded.documents);

        tracker.enter(Stage::Indexing);
        let index = within(
            self.timeouts.index_secs,
            build_index(
                &chunks,
                self.embedder.as_ref(),
                self.backend.as_ref(),
                permit.table_name(),
            ),
            |limit| AppError::Embedding(format!("Indexing timed out after {}s", limit.as_secs())),
        )
        .await?;

        Ok((self.registry.publish(permit, index), documents))
    }

    async fn load(&self, source: &CorpusSource) -> AppResult<Loaded> {
        let loaded = match source {
            CorpusSource::Paths(paths) => {
                let mut loaded = Loaded::default();
                for path in paths {
                    loaded.extend(self.loader.load_from_path(path).await);
                }
                loaded
            }
            CorpusSource::Url(url) => self.loader.load_from_url(url.trim()).await,
        };

        debug!(
            documents = loaded.documents.len(),
            warnings = loaded.warnings.len(),
            "Loaded {}",
            source.describe()
        );
        Ok(loaded)
    }

    async fn ask_stages<F>(
        &self,
        request: &AskRequest,
        memory: &ConversationMemory,
        mut on_token: F,
        tracker: &mut StageTracker,
    ) -> AppResult<AnswerReport>
    where
        F: FnMut(&str) + Send,
    {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(AppError::NoInput("Question is empty".to_string()));
        }

        let generation = match &request.corpus {
            Corpus::LastIngested => self.current_generation().ok_or_else(|| {
                AppError::NoInput(format!(
                    "Nothing has been ingested into '{}' yet",
                    self.table_name
                ))
            })?,
            Corpus::Source(source) => self.ingest_stages(source, tracker).await?.0,
        };

        tracker.enter(Stage::Retrieving);
        let sources = self
            .retriever
            .retrieve(generation.index.as_ref(), question)
            .await?;

        tracker.enter(Stage::PromptBuilding);
        let context: Vec<String> = sources.iter().map(|s| s.text.clone()).collect();
        let prompt = self.assembler.assemble(&memory.history(), &context, question)?;

        tracker.enter(Stage::Generating);
        let llm_request = LlmRequest::from_settings(prompt.text, &self.generation);
        let raw_response = within(
            self.timeouts.generate_secs,
            self.generate(&llm_request, &mut on_token),
            |limit| AppError::Generation(format!("Generation timed out after {}s", limit.as_secs())),
        )
        .await
        .map_err(AppError::into_generation)?;

        tracker.enter(Stage::Finalizing);
        let response = finalize_answer(&raw_response);

        tracker.enter(Stage::Recording);
        memory.append_exchange(question, response.clone());

        Ok(AnswerReport {
            response,
            raw_response,
            sources,
            generation: generation.generation,
            elapsed: tracker.started.elapsed(),
        })
    }

    async fn generate<F>(&self, request: &LlmRequest, on_token: &mut F) -> AppResult<String>
    where
        F: FnMut(&str) + Send,
    {
        if request.stream {
            let stream = self.generator.stream(request).await?;
            accumulate(stream, |token| on_token(token)).await
        } else {
            let response = self.generator.complete(request).await?;
            on_token(&response.content);
            Ok(response.content)
        }
    }
}

/// Run `fut`, failing with `on_timeout` if it outlives `limit_secs`.
async fn within<T, Fut>(
    limit_secs: Option<u64>,
    fut: Fut,
    on_timeout: impl FnOnce(Duration) -> AppError,
) -> AppResult<T>
where
    Fut: Future<Output = AppResult<T>>,
{
    match limit_secs {
        Some(secs) => {
            let limit = Duration::from_secs(secs);
            tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| on_timeout(limit))?
        }
        None => fut.await,
    }
}

fn request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_names_stage() {
        let failure = PipelineFailure {
            stage: Stage::Generating,
            error: AppError::Generation("upstream closed".into()),
            elapsed: Duration::from_millis(1500),
        };
        let text = failure.to_string();
        assert!(text.contains("Generating"));
        assert!(text.contains("upstream closed"));
        assert!(text.contains("1.500s"));
    }

    #[tokio::test]
    async fn test_within_without_limit_passes_through() {
        let value = within(None, async { Ok(7) }, |_| AppError::Other("timeout".into()))
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_within_maps_timeout() {
        let result: AppResult<()> = within(
            Some(0),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            },
            |_| AppError::Load("slow".into()),
        )
        .await;
        assert!(matches!(result, Err(AppError::Load(_))));
    }

    #[test]
    fn test_request_id_is_short() {
        assert_eq!(request_id().len(), 8);
    }
}
