//! ragchat CLI
//!
//! Main entry point for the ragchat command-line tool.
//! Ingests documents, answers questions over them, and serves the HTTP API.

mod commands;
mod server;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, IngestCommand, ServeCommand};
use ragchat_core::{config::AppConfig, logging};
use std::path::PathBuf;

/// ragchat - question answering over your documents
#[derive(Parser, Debug)]
#[command(name = "ragchat")]
#[command(about = "Retrieval-augmented question answering over PDFs and web pages", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGCHAT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Generation provider (ollama, gemini)
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest files, directories or a web page
    Ingest(IngestCommand),

    /// Ask a single question
    Ask(AskCommand),

    /// Interactive question loop over one corpus
    Chat(ChatCommand),

    /// Start the HTTP API
    Serve(ServeCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Defaults, YAML file and environment, then CLI overrides
    let config = AppConfig::load_from(cli.workspace, cli.config)?.with_overrides(
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.log_format, config.no_color)?;
    config.validate()?;

    tracing::info!("ragchat starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!(
        "Generation: {}/{}, embedding: {}/{}",
        config.generation.provider,
        config.generation.model,
        config.embedding.provider,
        config.embedding.model
    );

    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Serve(_) => "serve",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await.map_err(anyhow::Error::from),
        Commands::Ask(cmd) => cmd.execute(&config).await.map_err(anyhow::Error::from),
        Commands::Chat(cmd) => cmd.execute(&config).await.map_err(anyhow::Error::from),
        Commands::Serve(cmd) => cmd.execute(config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
