//! Ask command handler.
//!
//! Answers one question against a given source or the last-ingested corpus.

use super::{corpus_source, failure_json, seconds};
use clap::Args;
use ragchat_core::{config::AppConfig, AppResult};
use ragchat_knowledge::{AskRequest, ConversationMemory, Corpus, Pipeline};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;

/// Ask a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Files or directories to ingest before answering
    #[arg(long = "path")]
    pub paths: Vec<PathBuf>,

    /// Web page to ingest before answering
    #[arg(long, conflicts_with = "paths")]
    pub url: Option<String>,

    /// Disable streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let mut config = config.clone();
        if self.no_stream || self.json {
            config.generation.stream = false;
        }

        let pipeline = Pipeline::from_config(&config).await?;
        // One exchange per process; sessions only live inside `serve` and `chat`
        let memory = ConversationMemory::new();

        let corpus = corpus_source(&self.paths, self.url.as_deref())
            .map(Corpus::Source)
            .unwrap_or(Corpus::LastIngested);
        let request = AskRequest::new(self.question.clone(), corpus);

        let streaming = config.generation.stream;
        let outcome = pipeline
            .ask(&request, &memory, |token| {
                if streaming {
                    print!("{}", token);
                    let _ = std::io::stdout().flush();
                }
            })
            .await;

        match outcome {
            Ok(report) => {
                if self.json {
                    let output = json!({
                        "response": report.response,
                        "response_time": seconds(report.elapsed),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                } else {
                    if streaming {
                        println!();
                    } else {
                        println!("{}", report.response);
                    }
                    eprintln!(
                        "({} source chunk(s), {:.2}s)",
                        report.sources.len(),
                        seconds(report.elapsed)
                    );
                }
                Ok(())
            }
            Err(failure) => {
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&failure_json(&failure))?);
                }
                Err(failure.error)
            }
        }
    }
}
