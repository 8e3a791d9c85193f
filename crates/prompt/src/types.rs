//! Prompt and conversation types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A prompt template loaded from `.ragchat/prompts/<id>.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// Optional free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Handlebars template
    ///
    /// Variables: `history`, `context`, `question` (pre-joined strings) and
    /// `turns`, `chunks` (lists) for templates that lay them out themselves.
    pub template: String,
}

/// A fully assembled generation prompt. Built per request, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    /// The rendered text handed to the generator
    pub text: String,

    /// Template that produced the text
    pub template_id: String,

    /// Number of history turns included
    pub history_turns: usize,

    /// Number of retrieved chunks included
    pub context_chunks: usize,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: ragchat.answer
title: Terse answers
template: "{{context}} => {{question}}"
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "ragchat.answer");
        assert_eq!(def.description, None);
        assert!(def.template.contains("{{question}}"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let turn = Turn::assistant("hello");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hello"}"#);
        assert_eq!(Role::User.to_string(), "user");
    }
}
