//! Chat-completion wire types and the [`ChatBackend`] seam.
//!
//! Shapes follow the OpenAI-compatible `/chat/completions` API:
//!
//! ```text
//! request  = { model, messages: [{role, content, tool_calls?, tool_call_id?}],
//!              temperature, tools?, tool_choice? }
//! response = { choices: [{ message: { content?, tool_calls? } }] }
//! ```
//!
//! `model` and `temperature` are backend configuration and are added by
//! the backend implementation; the completion loop only supplies
//! [`ChatRequest`].

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::DialogueTurn;

/// Role of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message of the LLM transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(ChatRole::Assistant, content)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

impl From<&DialogueTurn> for ChatMessage {
    fn from(turn: &DialogueTurn) -> Self {
        match turn.role {
            crate::models::Role::User => Self::user(turn.content.clone()),
            crate::models::Role::Assistant => Self::assistant(turn.content.clone()),
        }
    }
}

/// Treat an explicit JSON `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A tool invocation requested by the model.
///
/// Backends sometimes send `null` for `id` or `name`; those become empty
/// strings so the call still reaches dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub function: FunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

/// Function name plus arguments, either a JSON string or a parsed object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    /// Arguments as a JSON object.
    ///
    /// Accepts a pre-parsed object or its serialized string form. Anything
    /// unparsable or not an object degrades to `{}`.
    pub fn parsed_arguments(&self) -> Value {
        let parsed = match &self.arguments {
            Value::String(raw) => serde_json::from_str::<Value>(raw).ok(),
            other => Some(other.clone()),
        };
        match parsed {
            Some(obj @ Value::Object(_)) => obj,
            _ => Value::Object(Default::default()),
        }
    }
}

/// Tool-choice directive sent alongside the tool schemas.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    /// Force a specific function by name.
    Function(String),
}

impl ToolChoice {
    /// `"auto"` and `"none"` map to themselves; anything else names a function.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "auto" | "" => Self::Auto,
            "none" => Self::None,
            name => Self::Function(name.to_string()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Auto => Value::from("auto"),
            Self::None => Value::from("none"),
            Self::Function(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        }
    }
}

/// Everything the loop sends for one round.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// OpenAI function-tool schemas; empty means tools are not offered.
    pub tools: Vec<Value>,
    pub tool_choice: Option<ToolChoice>,
}

/// The parsed `/chat/completions` response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<AssistantReply>,
}

/// The assistant message of the first choice.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AssistantReply {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatResponse {
    /// First choice's message, or an empty reply when absent.
    pub fn into_reply(self) -> AssistantReply {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .unwrap_or_default()
    }
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    /// Transcript form of this reply (role `assistant`).
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage {
            role: ChatRole::Assistant,
            content: self.content.clone(),
            tool_calls: self.tool_calls().to_vec(),
            tool_call_id: None,
        }
    }
}

/// An LLM backend able to run one chat-completion round.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<AssistantReply>;
}
