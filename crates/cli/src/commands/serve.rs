//! Serve command handler.

use crate::server::{self, AppState};
use anyhow::Context;
use clap::Args;
use ragchat_core::config::AppConfig;
use ragchat_knowledge::{Pipeline, SessionStore};
use std::sync::Arc;

/// Start the HTTP API
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Address to listen on (default: server.bind from config)
    #[arg(long)]
    pub bind: Option<String>,
}

impl ServeCommand {
    pub async fn execute(&self, config: AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing serve command");

        config.ensure_ragchat_dir()?;
        let bind = self.bind.clone().unwrap_or_else(|| config.server.bind.clone());

        let pipeline = Pipeline::from_config(&config)
            .await
            .context("Failed to build pipeline")?;

        let state = AppState {
            pipeline: Arc::new(pipeline),
            sessions: Arc::new(SessionStore::new(config.memory.max_sessions)),
            uploads_dir: config.uploads_dir(),
            max_upload_bytes: config.server.max_upload_bytes,
        };

        server::serve(&bind, state).await
    }
}
