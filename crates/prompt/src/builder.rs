//! Prompt assembler: merges conversation history, retrieved context and the
//! current question into a single generation prompt.
//!
//! Content is inserted verbatim. Neither history nor context is sanitized, so
//! text that looks like a turn (`user: ...`) inside a chunk stays in the prompt.

use crate::loader::find_prompt;
use crate::types::{Prompt, PromptDefinition, Turn};
use handlebars::Handlebars;
use ragchat_core::{AppError, AppResult};
use serde_json::json;
use std::path::Path;

/// Template id used by the answer pipeline.
pub const DEFAULT_PROMPT_ID: &str = "ragchat.answer";

/// Built-in answer template.
///
/// History lines, a blank line, `Context:` with the chunks, a blank line and
/// the question as the final line. Empty sections are left out entirely.
pub const DEFAULT_TEMPLATE: &str = "{{#if history}}{{history}}\n\n{{/if}}{{#if context}}Context:\n{{context}}\n\n{{/if}}user: {{question}}";

const TEMPLATE_NAME: &str = "prompt";

/// Renders prompts from one registered template.
pub struct PromptAssembler {
    handlebars: Handlebars<'static>,
    template_id: String,
}

impl PromptAssembler {
    /// Assembler with the built-in template.
    pub fn new() -> AppResult<Self> {
        Self::from_template(DEFAULT_PROMPT_ID, DEFAULT_TEMPLATE)
    }

    /// Assembler with a custom template.
    pub fn from_template(id: &str, template: &str) -> AppResult<Self> {
        let mut handlebars = Handlebars::new();

        // Plain text prompts, no HTML escaping
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| AppError::Prompt(format!("Failed to register template {}: {}", id, e)))?;

        Ok(Self {
            handlebars,
            template_id: id.to_string(),
        })
    }

    /// Assembler from a loaded definition.
    pub fn from_definition(definition: &PromptDefinition) -> AppResult<Self> {
        Self::from_template(&definition.id, &definition.template)
    }

    /// Assembler for a workspace: uses `.ragchat/prompts/ragchat.answer.yml`
    /// when present, the built-in template otherwise.
    pub fn for_workspace(workspace_path: &Path) -> AppResult<Self> {
        match find_prompt(workspace_path, DEFAULT_PROMPT_ID)? {
            Some(definition) => {
                tracing::info!("Using workspace prompt override: {}", definition.title);
                Self::from_definition(&definition)
            }
            None => Self::new(),
        }
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// Assemble a prompt.
    ///
    /// # Arguments
    /// * `history` - Prior turns in chronological order
    /// * `context` - Retrieved chunk texts, best match first
    /// * `question` - The current question
    pub fn assemble(&self, history: &[Turn], context: &[String], question: &str) -> AppResult<Prompt> {
        let history_text = history
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n");
        let context_text = context.join("\n\n");

        let data = json!({
            "history": history_text,
            "context": context_text,
            "question": question,
            "turns": history,
            "chunks": context,
        });

        let text = self
            .handlebars
            .render(TEMPLATE_NAME, &data)
            .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

        tracing::debug!(
            history_turns = history.len(),
            context_chunks = context.len(),
            chars = text.len(),
            "Assembled prompt"
        );

        Ok(Prompt {
            text,
            template_id: self.template_id.clone(),
            history_turns: history.len(),
            context_chunks: context.len(),
        })
    }
}

/// Assemble a prompt with the built-in template.
pub fn assemble(history: &[Turn], context: &[String], question: &str) -> AppResult<Prompt> {
    PromptAssembler::new()?.assemble(history, context, question)
}
