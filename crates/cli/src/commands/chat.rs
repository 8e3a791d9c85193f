//! Interactive chat loop.
//!
//! Ingests one corpus, then answers questions read from stdin until `exit`
//! or end of input. Turns accumulate in the process-wide conversation.

use super::{corpus_source, error_text, seconds};
use clap::Args;
use ragchat_core::{config::AppConfig, AppResult};
use ragchat_knowledge::{AskRequest, Corpus, CorpusSource, Pipeline, SessionStore, Turn};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive question loop over one corpus
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Files or directories to ingest (default: the configured data directory)
    #[arg(long = "path")]
    pub paths: Vec<PathBuf>,

    /// Web page to ingest instead of files
    #[arg(long, conflicts_with = "paths")]
    pub url: Option<String>,

    /// Print the conversation history after every answer
    #[arg(long)]
    pub show_history: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let source = corpus_source(&self.paths, self.url.as_deref())
            .unwrap_or_else(|| CorpusSource::Paths(vec![config.data_dir()]));

        let pipeline = Pipeline::from_config(config).await?;
        let report = pipeline.ingest(&source).await.map_err(|f| f.error)?;
        eprintln!(
            "Loaded {} document(s), {} chunk(s) from {} in {:.2}s",
            report.documents,
            report.chunks,
            source.describe(),
            seconds(report.elapsed)
        );

        let sessions = SessionStore::new(config.memory.max_sessions);
        let memory = sessions.default_session();
        let streaming = config.generation.stream;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("Question: ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();

            match question {
                "" => continue,
                "exit" | "quit" => break,
                "/history" => {
                    print_history(&memory.history());
                    continue;
                }
                _ => {}
            }

            let request = AskRequest::new(question, Corpus::LastIngested);
            let outcome = pipeline
                .ask(&request, &memory, |token| {
                    if streaming {
                        print!("{}", token);
                        let _ = std::io::stdout().flush();
                    }
                })
                .await;

            match outcome {
                Ok(answer) => {
                    if streaming {
                        println!();
                    } else {
                        println!("{}", answer.response);
                    }
                    eprintln!("({:.2}s)", seconds(answer.elapsed));
                    if self.show_history {
                        print_history(&memory.history());
                    }
                }
                Err(failure) => {
                    println!();
                    eprintln!(
                        "Error: {} ({:.2}s)",
                        error_text(&failure.error),
                        seconds(failure.elapsed)
                    );
                }
            }
        }

        tracing::info!("Chat ended after {} exchange(s)", memory.exchanges());
        Ok(())
    }
}

fn print_history(turns: &[Turn]) {
    println!("--- history ({} turns) ---", turns.len());
    for turn in turns {
        println!("{}: {}", turn.role, turn.content);
    }
    println!("---");
}
