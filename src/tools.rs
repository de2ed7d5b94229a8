//! Built-in tools and the declarative override file.
//!
//! Built-ins are enumerated in [`builtin_tools`]. A deployment can reshape
//! them with a JSON file:
//!
//! ```json
//! {
//!   "tools": [
//!     { "name": "now", "handler": "get_current_time", "description": "Current time" }
//!   ]
//! }
//! ```
//!
//! Each entry must name a built-in `handler`; `description` and
//! `parameters` default to the built-in's. Entries without a name, without
//! a handler, or with an unknown handler are skipped. When at least one
//! entry survives, the override list replaces the built-in set entirely.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use relay_core::tools::{Tool, ToolRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

use crate::config::ToolsConfig;

/// Zero-argument tool returning the current UTC time in ISO 8601.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current UTC time in ISO 8601 format."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn invoke(&self, _args: Value) -> Result<String> {
        Ok(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false))
    }
}

/// Fresh instances of every built-in tool.
pub fn builtin_tools() -> Vec<Box<dyn Tool>> {
    vec![Box::new(CurrentTimeTool)]
}

fn builtin_by_handler(handler: &str) -> Option<Box<dyn Tool>> {
    builtin_tools().into_iter().find(|t| t.name() == handler)
}

/// A built-in exposed under an overridden name, description or schema.
struct OverriddenTool {
    name: String,
    description: String,
    parameters: Value,
    inner: Box<dyn Tool>,
}

#[async_trait]
impl Tool for OverriddenTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn invoke(&self, args: Value) -> Result<String> {
        self.inner.invoke(args).await
    }
}

#[derive(Debug, Deserialize)]
struct OverrideFile {
    #[serde(default)]
    tools: Vec<Value>,
}

/// Parse override file content into tools. Invalid entries are dropped.
pub fn parse_overrides(content: &str) -> Result<Vec<Box<dyn Tool>>> {
    let file: OverrideFile =
        serde_json::from_str(content).context("Invalid tools override file")?;

    let mut tools: Vec<Box<dyn Tool>> = Vec::new();
    for entry in &file.tools {
        let name = entry.get("name").and_then(Value::as_str).unwrap_or("");
        let handler = entry.get("handler").and_then(Value::as_str).unwrap_or("");
        if name.is_empty() || handler.is_empty() {
            continue;
        }
        let Some(inner) = builtin_by_handler(handler) else {
            debug!(tool = name, handler, "skipping override with unknown handler");
            continue;
        };

        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| inner.description().to_string());
        let parameters = entry
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| inner.parameters_schema());

        tools.push(Box::new(OverriddenTool {
            name: name.to_string(),
            description,
            parameters,
            inner,
        }));
    }
    Ok(tools)
}

/// Build the registry for one request.
///
/// A missing override file means built-ins only. An unreadable or
/// malformed file is an error.
pub async fn build_registry(config: &ToolsConfig) -> Result<ToolRegistry> {
    let overrides = load_overrides(&config.config_path).await?;
    let tools = if overrides.is_empty() {
        builtin_tools()
    } else {
        overrides
    };

    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    Ok(registry)
}

async fn load_overrides(path: &Path) -> Result<Vec<Box<dyn Tool>>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Ok(Vec::new()),
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read tools file: {}", path.display()))?;
    parse_overrides(&content).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config(path: PathBuf) -> ToolsConfig {
        ToolsConfig {
            enabled: true,
            config_path: path,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_current_time_is_utc_iso8601() {
        let out = CurrentTimeTool.invoke(json!({})).await.unwrap();
        let parsed = chrono::DateTime::parse_from_rfc3339(&out).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
        assert!(out.ends_with("+00:00"));
    }

    #[tokio::test]
    async fn test_missing_file_uses_builtins() {
        let tmp = TempDir::new().unwrap();
        let registry = build_registry(&config(tmp.path().join("tools.json")))
            .await
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.find("get_current_time").is_some());
    }

    #[tokio::test]
    async fn test_override_replaces_builtins() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tools.json");
        std::fs::write(
            &path,
            r#"{"tools": [
                {"name": "now", "handler": "get_current_time", "description": "What time is it"},
                {"name": "weather", "handler": "get_weather"},
                {"handler": "get_current_time"}
            ]}"#,
        )
        .unwrap();

        let registry = build_registry(&config(path)).await.unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.find("get_current_time").is_none());

        let now = registry.find("now").unwrap();
        assert_eq!(now.description(), "What time is it");
        assert_eq!(now.parameters_schema()["type"], "object");
        assert!(now.invoke(json!({})).await.unwrap().ends_with("+00:00"));
    }

    #[tokio::test]
    async fn test_all_invalid_entries_keep_builtins() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tools.json");
        std::fs::write(&path, r#"{"tools": [{"name": "x", "handler": "nope"}]}"#).unwrap();
        let registry = build_registry(&config(path)).await.unwrap();
        assert!(registry.find("get_current_time").is_some());
    }

    #[tokio::test]
    async fn test_malformed_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tools.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(build_registry(&config(path)).await.is_err());
    }

    #[test]
    fn test_custom_parameters_kept() {
        let tools = parse_overrides(
            r#"{"tools": [{"name": "t", "handler": "get_current_time",
                "parameters": {"type": "object", "properties": {"tz": {"type": "string"}}}}]}"#,
        )
        .unwrap();
        assert_eq!(
            tools[0].parameters_schema()["properties"]["tz"]["type"],
            "string"
        );
    }
}
