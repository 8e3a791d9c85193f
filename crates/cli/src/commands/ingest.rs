//! Ingest command handler.

use super::{corpus_source, failure_json, seconds};
use clap::Args;
use ragchat_core::{config::AppConfig, AppResult};
use ragchat_knowledge::{CorpusSource, Pipeline};
use serde_json::json;
use std::path::PathBuf;

/// Ingest files, directories or a web page
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest (PDF, Markdown, text)
    pub paths: Vec<PathBuf>,

    /// Web page to ingest instead of files
    #[arg(long, conflicts_with = "paths")]
    pub url: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command");

        let source = corpus_source(&self.paths, self.url.as_deref()).unwrap_or_else(|| {
            tracing::info!("No source given, using {:?}", config.data_dir());
            CorpusSource::Paths(vec![config.data_dir()])
        });

        let pipeline = Pipeline::from_config(config).await?;

        match pipeline.ingest(&source).await {
            Ok(report) => {
                if self.json {
                    let output = json!({
                        "status": "ok",
                        "table": report.table_name,
                        "generation": report.generation,
                        "documents": report.documents,
                        "chunks": report.chunks,
                        "response_time": seconds(report.elapsed),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                } else {
                    println!(
                        "Ingested {} document(s) into {} chunk(s) in table '{}' (generation {}, {:.2}s)",
                        report.documents,
                        report.chunks,
                        report.table_name,
                        report.generation,
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
