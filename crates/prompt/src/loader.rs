//! Loader for workspace prompt overrides (`.ragchat/prompts/<id>.yml`).

use crate::types::PromptDefinition;
use ragchat_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".ragchat/prompts")
}

/// Load a prompt definition by ID from the workspace.
///
/// # Example
/// ```no_run
/// use ragchat_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "ragchat.answer")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    find_prompt(workspace_path, prompt_id)?.ok_or_else(|| {
        AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompts_dir(workspace_path).join(format!("{}.yml", prompt_id))
        ))
    })
}

/// Like [`load_prompt`], but a missing file is `Ok(None)`.
pub fn find_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<Option<PromptDefinition>> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    if !prompt_file.exists() {
        return Ok(None);
    }

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    Ok(Some(definition))
}

/// List all prompt IDs present in the workspace, sorted.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(workspace_path);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids: Vec<String> = walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("yml"))
        .filter_map(|e| {
            e.path()
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .collect();

    prompt_ids.sort();
    Ok(prompt_ids)
}

fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.trim().is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.trim().is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PromptAssembler;
    use crate::types::Turn;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, id: &str, content: &str) {
        let prompts = dir.join(".ragchat/prompts");
        fs::create_dir_all(&prompts).unwrap();
        fs::write(prompts.join(format!("{}.yml", id)), content).unwrap();
    }

    fn valid_prompt(id: &str) -> String {
        format!(
            "id: {}\ntitle: \"Bracketed\"\ntemplate: \"[{{{{context}}}}] Q: {{{{question}}}}\"\n",
            id
        )
    }

    #[test]
    fn test_load_valid_prompt() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "ragchat.answer", &valid_prompt("ragchat.answer"));

        let prompt = load_prompt(temp_dir.path(), "ragchat.answer").unwrap();
        assert_eq!(prompt.id, "ragchat.answer");
        assert_eq!(prompt.title, "Bracketed");
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
        assert!(find_prompt(temp_dir.path(), "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "invalid", "invalid: yaml: content:");

        let result = load_prompt(temp_dir.path(), "invalid");
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_empty_template_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "empty", "id: empty\ntitle: Empty\ntemplate: \"  \"\n");

        assert!(load_prompt(temp_dir.path(), "empty").is_err());
    }

    #[test]
    fn test_list_prompts() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "prompt2", &valid_prompt("prompt2"));
        write_prompt(temp_dir.path(), "prompt1", &valid_prompt("prompt1"));

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts, vec!["prompt1".to_string(), "prompt2".to_string()]);
    }

    #[test]
    fn test_workspace_override_is_used() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "ragchat.answer", &valid_prompt("ragchat.answer"));

        let assembler = PromptAssembler::for_workspace(temp_dir.path()).unwrap();
        let prompt = assembler
            .assemble(&[Turn::user("hi")], &["ctx".to_string()], "why?")
            .unwrap();
        assert_eq!(prompt.text, "[ctx] Q: why?");
    }

    #[test]
    fn test_workspace_without_override_uses_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let assembler = PromptAssembler::for_workspace(temp_dir.path()).unwrap();
        assert_eq!(assembler.template_id(), "ragchat.answer");

        let prompt = assembler.assemble(&[], &[], "why?").unwrap();
        assert_eq!(prompt.text, "user: why?");
    }
}
