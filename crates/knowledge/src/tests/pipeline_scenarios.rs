//! End-to-end pipeline behavior against in-memory collaborators.

use super::doubles::{
    default_pipeline, pipeline, pipeline_on, rag_settings, Ending, ScriptedGenerator,
    SwitchableEmbedder,
};
use crate::embeddings::{Embedder, MockEmbedder};
use crate::memory_index::MemoryBackend;
use crate::memory::ConversationMemory;
use crate::pipeline::Stage;
use crate::types::{AskRequest, Corpus, CorpusSource, VectorRecord};
use crate::vector_index::IndexBackend;
use ragchat_core::config::TimeoutSettings;
use ragchat_core::AppError;
use ragchat_prompt::Role;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn paths(paths: &[PathBuf]) -> CorpusSource {
    CorpusSource::Paths(paths.to_vec())
}

fn ask_last(question: &str) -> AskRequest {
    AskRequest::new(question, Corpus::LastIngested)
}

#[tokio::test]
async fn test_reingest_replaces_previous_corpus() {
    let dir = TempDir::new().unwrap();
    let corpus_a = write(
        dir.path(),
        "a.txt",
        "Alpha notes. The alpha river flows north through granite valleys.",
    );
    let corpus_b = write(
        dir.path(),
        "b.txt",
        "Beta notes. The beta river flows south across sandy plains.",
    );

    let pipeline = default_pipeline(ScriptedGenerator::new(&["It flows."]));
    let memory = ConversationMemory::new();

    let first = pipeline.ingest(&paths(&[corpus_a])).await.unwrap();
    assert_eq!(first.generation, 1);
    let answer = pipeline
        .ask(&ask_last("Which way does the river flow?"), &memory, |_| {})
        .await
        .unwrap();
    assert!(answer.sources.iter().any(|s| s.text.contains("alpha")));

    let second = pipeline.ingest(&paths(&[corpus_b])).await.unwrap();
    assert_eq!(second.generation, 2);
    let answer = pipeline
        .ask(&ask_last("Which way does the river flow?"), &memory, |_| {})
        .await
        .unwrap();

    assert_eq!(answer.generation, 2);
    assert!(!answer.sources.is_empty());
    assert!(answer.sources.iter().all(|s| !s.text.contains("alpha")));
}

#[tokio::test]
async fn test_empty_file_set_is_no_input() {
    let pipeline = default_pipeline(ScriptedGenerator::new(&["x"]));
    let failure = pipeline.ingest(&CorpusSource::Paths(vec![])).await.unwrap_err();

    assert!(matches!(failure.error, AppError::NoInput(_)));
    assert_eq!(failure.stage, Stage::Idle);
    assert!(pipeline.current_generation().is_none());
}

#[tokio::test]
async fn test_empty_directory_is_load_error_and_keeps_index() {
    let dir = TempDir::new().unwrap();
    let doc = write(dir.path(), "doc.txt", "Some real content about comets.");
    let empty = TempDir::new().unwrap();

    let pipeline = default_pipeline(ScriptedGenerator::new(&["x"]));
    pipeline.ingest(&paths(&[doc])).await.unwrap();

    let failure = pipeline
        .ingest(&paths(&[empty.path().to_path_buf()]))
        .await
        .unwrap_err();

    assert!(matches!(failure.error, AppError::Load(_)));
    assert_eq!(failure.stage, Stage::Ingesting);
    assert_eq!(pipeline.current_generation().unwrap().generation, 1);
}

#[tokio::test]
async fn test_unreachable_url_is_load_error() {
    let pipeline = default_pipeline(ScriptedGenerator::new(&["x"]));
    let request = AskRequest::new(
        "What is on the page?",
        Corpus::Source(CorpusSource::Url("http://127.0.0.1:9/nothing".to_string())),
    );
    let memory = ConversationMemory::new();

    let failure = pipeline.ask(&request, &memory, |_| {}).await.unwrap_err();
    assert!(matches!(failure.error, AppError::Load(_)));
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_last_ingested_without_corpus_is_no_input() {
    let pipeline = default_pipeline(ScriptedGenerator::new(&["x"]));
    let memory = ConversationMemory::new();

    let failure = pipeline
        .ask(&ask_last("anything?"), &memory, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(failure.error, AppError::NoInput(_)));
}

#[tokio::test]
async fn test_empty_question_is_no_input() {
    let pipeline = default_pipeline(ScriptedGenerator::new(&["x"]));
    let memory = ConversationMemory::new();

    let failure = pipeline.ask(&ask_last("   "), &memory, |_| {}).await.unwrap_err();
    assert!(matches!(failure.error, AppError::NoInput(_)));
    assert_eq!(failure.stage, Stage::Idle);
}

#[tokio::test]
async fn test_retrieval_bounded_by_corpus_size() {
    let dir = TempDir::new().unwrap();
    let doc = write(dir.path(), "short.txt", "A single short fact about owls.");

    let pipeline = default_pipeline(ScriptedGenerator::new(&["Owls hoot."]));
    let report = pipeline.ingest(&paths(&[doc])).await.unwrap();
    assert_eq!(report.chunks, 1);

    let answer = pipeline
        .ask(&ask_last("Tell me about owls"), &ConversationMemory::new(), |_| {})
        .await
        .unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert!(pipeline.top_k() > answer.sources.len());
}

#[tokio::test]
async fn test_memory_holds_two_turns_per_exchange() {
    let dir = TempDir::new().unwrap();
    let doc = write(dir.path(), "facts.txt", "Mercury is the closest planet to the sun.");

    let generator = ScriptedGenerator::new(&["Mercury", " is closest."]);
    let pipeline = default_pipeline(generator.clone());
    pipeline.ingest(&paths(&[doc])).await.unwrap();

    let memory = ConversationMemory::new();
    for i in 0..3 {
        pipeline
            .ask(&ask_last(&format!("question {}", i)), &memory, |_| {})
            .await
            .unwrap();
    }

    let history = memory.history();
    assert_eq!(history.len(), 6);
    for (i, pair) in history.chunks(2).enumerate() {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[0].content, format!("question {}", i));
        assert_eq!(pair[1].role, Role::Assistant);
        assert_eq!(pair[1].content, "Mercury is closest.");
    }

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].contains("assistant:"));
    assert!(prompts[2].contains("user: question 0\nassistant: Mercury is closest.\nuser: question 1"));
    assert!(prompts[2].ends_with("user: question 2"));
    assert!(prompts[2].contains("Mercury is the closest planet"));
}

#[tokio::test]
async fn test_tokens_forwarded_in_order_and_answer_finalized() {
    let dir = TempDir::new().unwrap();
    let doc = write(dir.path(), "sky.txt", "The sky appears blue because of scattering.");

    let pipeline = default_pipeline(ScriptedGenerator::new(&[
        "The sky",
        " is blue.",
        " It is also vast",
    ]));
    pipeline.ingest(&paths(&[doc])).await.unwrap();

    let mut tokens = Vec::new();
    let memory = ConversationMemory::new();
    let answer = pipeline
        .ask(&ask_last("What color is the sky?"), &memory, |t| {
            tokens.push(t.to_string())
        })
        .await
        .unwrap();

    assert_eq!(tokens, vec!["The sky", " is blue.", " It is also vast"]);
    assert_eq!(answer.raw_response, "The sky is blue. It is also vast");
    assert_eq!(answer.response, "The sky is blue.");
    assert_eq!(memory.history()[1].content, "The sky is blue.");
}

#[tokio::test]
async fn test_stream_failure_leaves_memory_unchanged() {
    let dir = TempDir::new().unwrap();
    let doc = write(dir.path(), "doc.txt", "Volcanoes form where plates meet.");

    let pipeline = default_pipeline(ScriptedGenerator::with_ending(
        &["Volcanoes", " form"],
        Ending::Error,
    ));
    pipeline.ingest(&paths(&[doc])).await.unwrap();

    let memory = ConversationMemory::new();
    memory.append_exchange("earlier", "Earlier answer.");

    let failure = pipeline
        .ask(&ask_last("Where do volcanoes form?"), &memory, |_| {})
        .await
        .unwrap_err();

    assert!(matches!(failure.error, AppError::Generation(_)));
    assert_eq!(failure.stage, Stage::Generating);
    assert_eq!(memory.len(), 2);
}

#[tokio::test]
async fn test_cancelled_stream_leaves_memory_unchanged() {
    let dir = TempDir::new().unwrap();
    let doc = write(dir.path(), "doc.txt", "Glaciers carve valleys over millennia.");

    let pipeline = default_pipeline(ScriptedGenerator::with_ending(
        &["Glaciers carve"],
        Ending::Hang,
    ));
    pipeline.ingest(&paths(&[doc])).await.unwrap();

    let memory = ConversationMemory::new();
    let request = ask_last("What do glaciers do?");
    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        pipeline.ask(&request, &memory, |_| {}),
    )
    .await;

    assert!(outcome.is_err());
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_generation_timeout_is_generation_error() {
    let dir = TempDir::new().unwrap();
    let doc = write(dir.path(), "doc.txt", "Tides follow the moon.");

    let pipeline = pipeline(
        ScriptedGenerator::with_ending(&["Tides"], Ending::Hang),
        SwitchableEmbedder::new(64),
        TimeoutSettings {
            generate_secs: Some(0),
            ..TimeoutSettings::default()
        },
    );
    pipeline.ingest(&paths(&[doc])).await.unwrap();

    let memory = ConversationMemory::new();
    let failure = pipeline
        .ask(&ask_last("What drives tides?"), &memory, |_| {})
        .await
        .unwrap_err();

    assert!(matches!(failure.error, AppError::Generation(_)));
    assert_eq!(failure.stage, Stage::Generating);
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_embedding_failure_keeps_previous_generation() {
    let dir = TempDir::new().unwrap();
    let doc_a = write(dir.path(), "a.txt", "First corpus about deserts.");
    let doc_b = write(dir.path(), "b.txt", "Second corpus about oceans.");

    let embedder = SwitchableEmbedder::new(64);
    let pipeline = pipeline(
        ScriptedGenerator::new(&["Sand."]),
        embedder.clone(),
        TimeoutSettings::default(),
    );
    pipeline.ingest(&paths(&[doc_a])).await.unwrap();

    embedder.fail_from_now_on();
    let failure = pipeline.ingest(&paths(&[doc_b])).await.unwrap_err();

    assert!(matches!(failure.error, AppError::Embedding(_)));
    assert_eq!(failure.stage, Stage::Indexing);
    assert!(failure.elapsed > Duration::ZERO);

    let current = pipeline.current_generation().unwrap();
    assert_eq!(current.generation, 1);
    let hits = current.index.search(&vec![1.0; 64], 5).await.unwrap();
    assert!(hits.iter().all(|h| h.text.contains("deserts")));
}

#[tokio::test]
async fn test_ask_with_source_ingests_first() {
    let dir = TempDir::new().unwrap();
    let doc = write(dir.path(), "guide.md", "# Guide\n\nPress the red button to start.");

    let pipeline = default_pipeline(ScriptedGenerator::new(&["Press red."]));
    let request = AskRequest::new(
        "How do I start?",
        Corpus::Source(paths(&[doc])),
    );

    let answer = pipeline
        .ask(&request, &ConversationMemory::new(), |_| {})
        .await
        .unwrap();
    assert_eq!(answer.generation, 1);
    assert!(answer.sources[0].text.contains("red button"));
    assert_eq!(pipeline.current_generation().unwrap().generation, 1);
}

#[tokio::test]
async fn test_concurrent_ingestions_publish_distinct_generations() {
    let dir = TempDir::new().unwrap();
    let doc_a = write(dir.path(), "a.txt", "Corpus one about lighthouses.");
    let doc_b = write(dir.path(), "b.txt", "Corpus two about windmills.");

    let pipeline = Arc::new(default_pipeline(ScriptedGenerator::new(&["ok."])));
    let source_a = paths(&[doc_a]);
    let source_b = paths(&[doc_b]);

    let (a, b) = tokio::join!(pipeline.ingest(&source_a), pipeline.ingest(&source_b));
    let mut generations = vec![a.unwrap().generation, b.unwrap().generation];
    generations.sort();

    assert_eq!(generations, vec![1, 2]);
    assert_eq!(pipeline.current_generation().unwrap().generation, 2);
}

/// A backend holding `texts` under the default table, as a previous process
/// would have left it.
async fn persisted_backend(embedder: &MockEmbedder, texts: &[&str]) -> Arc<MemoryBackend> {
    let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
    let vectors = embedder.embed_documents(&texts).await.unwrap();
    let records = texts
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (text, vector))| VectorRecord {
            id: format!("persisted-{}", i),
            vector,
            text,
            source: "earlier.txt".to_string(),
            chunk_index: i as u32,
        })
        .collect();

    let backend = Arc::new(MemoryBackend::new());
    backend
        .create_table(&rag_settings().table_name, records, embedder.dimensions())
        .await
        .unwrap();
    backend
}

#[tokio::test]
async fn test_restore_publishes_persisted_table() {
    let embedder = MockEmbedder::new(256);
    let backend = persisted_backend(
        &embedder,
        &["Lighthouses guide ships at night.", "Fog horns warn of rocks."],
    )
    .await;
    let pipeline = pipeline_on(
        backend,
        ScriptedGenerator::new(&["They guide ships."]),
        Arc::new(embedder),
        TimeoutSettings::default(),
    );
    assert!(pipeline.current_generation().is_none());

    let restored = pipeline.restore().await.unwrap().unwrap();
    assert_eq!(restored.generation, 1);
    assert_eq!(restored.record_count, 2);
    assert_eq!(pipeline.current_generation().unwrap().generation, 1);

    let memory = ConversationMemory::new();
    let answer = pipeline
        .ask(&ask_last("What do lighthouses do?"), &memory, |_| {})
        .await
        .unwrap();
    assert_eq!(answer.generation, 1);
    assert_eq!(answer.response, "They guide ships.");
    assert!(answer.sources.iter().any(|s| s.text.contains("Lighthouses")));
}

#[tokio::test]
async fn test_restore_without_table_publishes_nothing() {
    let missing = default_pipeline(ScriptedGenerator::new(&["x"]));
    assert!(missing.restore().await.unwrap().is_none());
    assert!(missing.current_generation().is_none());

    let embedder = MockEmbedder::new(256);
    let backend = persisted_backend(&embedder, &[]).await;
    let empty = pipeline_on(
        backend,
        ScriptedGenerator::new(&["x"]),
        Arc::new(embedder),
        TimeoutSettings::default(),
    );
    assert!(empty.restore().await.unwrap().is_none());
    assert!(empty.current_generation().is_none());
}

#[tokio::test]
async fn test_restore_after_ingest_keeps_newer_generation() {
    let dir = TempDir::new().unwrap();
    let fresh = write(dir.path(), "fresh.txt", "Fresh notes about glaciers carving valleys.");

    let embedder = MockEmbedder::new(256);
    let backend = persisted_backend(&embedder, &["Stale notes about deserts."]).await;
    let pipeline = pipeline_on(
        backend,
        ScriptedGenerator::new(&["Glaciers."]),
        Arc::new(embedder),
        TimeoutSettings::default(),
    );

    let report = pipeline.ingest(&paths(&[fresh])).await.unwrap();
    assert_eq!(report.generation, 1);

    let current = pipeline.restore().await.unwrap().unwrap();
    assert_eq!(current.generation, 1);
    assert_eq!(pipeline.current_generation().unwrap().generation, 1);

    let memory = ConversationMemory::new();
    let answer = pipeline
        .ask(&ask_last("What carves valleys?"), &memory, |_| {})
        .await
        .unwrap();
    assert!(answer.sources.iter().all(|s| !s.text.contains("Stale")));
}
