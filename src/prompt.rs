//! System prompt resolution.

use std::path::Path;
use tracing::warn;

use crate::config::PromptConfig;

/// The prompt file's trimmed content when it exists and is non-empty,
/// otherwise the inline `system_prompt`.
pub async fn load_system_prompt(config: &PromptConfig) -> String {
    if let Some(path) = &config.system_prompt_path {
        if let Some(content) = read_prompt_file(path).await {
            return content;
        }
    }
    config.system_prompt.clone()
}

async fn read_prompt_file(path: &Path) -> Option<String> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return None,
    }
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let trimmed = content.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "system prompt file unreadable, using inline prompt");
            None
        }
    }
}
