//! Prompt assembly for ragchat.
//!
//! This crate provides:
//! - Conversation turn types shared with the memory layer
//! - The prompt assembler (history + retrieved context + question)
//! - YAML-based template overrides loaded from the workspace

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{assemble, PromptAssembler, DEFAULT_PROMPT_ID, DEFAULT_TEMPLATE};
pub use loader::{list_prompts, load_prompt};
pub use types::{Prompt, PromptDefinition, Role, Turn};
