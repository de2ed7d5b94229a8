//! Bounded tool-calling completion loop.
//!
//! ```text
//! Requesting ──▶ reply has no tool calls ──▶ Done(text) | Failed(empty)
//!     ▲                 │
//!     │          tool calls present
//!     │                 ▼
//!     └──────────── ToolDispatch (append assistant msg + one tool msg per call)
//! ```
//!
//! At most `max_tool_rounds` backend round-trips are made (at least one,
//! whatever the configured value). Running out of rounds while the model
//! still asks for tools fails with [`CompletionError::LoopExhausted`].
//!
//! Rounds are strictly sequential. Tool calls within a round are dispatched
//! in the order the backend returned them.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::chat::{ChatBackend, ChatMessage, ChatRequest, ToolCall, ToolChoice};
use crate::tools::ToolRegistry;

/// Loop configuration.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Round budget; values below 1 still allow one round.
    pub max_tool_rounds: i64,
    pub tool_choice: ToolChoice,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tool_rounds: 2,
            tool_choice: ToolChoice::Auto,
        }
    }
}

impl CompletionOptions {
    pub fn rounds(&self) -> usize {
        self.max_tool_rounds.max(1) as usize
    }
}

/// Terminal failures of the loop.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("chat backend request failed: {0}")]
    Backend(String),
    #[error("backend returned empty content")]
    EmptyContent,
    #[error("tool loop exceeded after {0} rounds")]
    LoopExhausted(usize),
    #[error("tool '{name}' failed: {message}")]
    Tool { name: String, message: String },
}

/// Successful loop result.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Trimmed, non-empty final reply.
    pub reply: String,
    /// Backend round-trips performed.
    pub rounds: usize,
    /// Full transcript including tool traffic (without the final reply).
    pub transcript: Vec<ChatMessage>,
}

/// Result text for a call naming an unregistered tool.
pub fn unavailable_message(name: &str) -> String {
    format!("Tool '{}' is not available", name)
}

/// Drive the backend until it produces a final text reply.
///
/// `tools = None` disables tool offering entirely. With a registry, schemas
/// and the tool-choice directive are sent only when it is non-empty, but
/// dispatch always goes through it.
pub async fn run(
    backend: &dyn ChatBackend,
    tools: Option<&ToolRegistry>,
    mut transcript: Vec<ChatMessage>,
    opts: &CompletionOptions,
) -> Result<Completion, CompletionError> {
    let max_rounds = opts.rounds();
    let offered: Vec<Value> = tools.map(ToolRegistry::schemas).unwrap_or_default();

    for round in 1..=max_rounds {
        let request = ChatRequest {
            messages: transcript.clone(),
            tool_choice: (!offered.is_empty()).then(|| opts.tool_choice.clone()),
            tools: offered.clone(),
        };

        debug!(round, messages = request.messages.len(), "chat round");
        let reply = backend
            .complete(&request)
            .await
            .map_err(|e| CompletionError::Backend(format!("{:#}", e)))?;

        if reply.tool_calls().is_empty() {
            let content = reply.content.as_deref().unwrap_or("").trim();
            if content.is_empty() {
                return Err(CompletionError::EmptyContent);
            }
            return Ok(Completion {
                reply: content.to_string(),
                rounds: round,
                transcript,
            });
        }

        transcript.push(reply.to_message());
        for call in reply.tool_calls() {
            let result = dispatch(tools, call).await?;
            transcript.push(ChatMessage::tool_result(call.id.clone(), result));
        }
    }

    Err(CompletionError::LoopExhausted(max_rounds))
}

async fn dispatch(tools: Option<&ToolRegistry>, call: &ToolCall) -> Result<String, CompletionError> {
    let name = call.function.name.as_str();
    let Some(tool) = tools.and_then(|r| r.find(name)) else {
        info!(tool = name, "model requested unavailable tool");
        return Ok(unavailable_message(name));
    };

    let args = call.function.parsed_arguments();
    debug!(tool = name, call_id = %call.id, "invoking tool");
    tool.invoke(args)
        .await
        .map_err(|e| CompletionError::Tool {
            name: name.to_string(),
            message: format!("{:#}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{AssistantReply, ChatRole, FunctionCall};
    use crate::tools::Tool;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Backend replaying scripted replies and recording requests.
    struct Scripted {
        replies: Mutex<Vec<AssistantReply>>,
        requests: Mutex<Vec<ChatRequest>>,
        repeat_last: bool,
    }

    impl Scripted {
        fn new(replies: Vec<AssistantReply>) -> Self {
            Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
                repeat_last: false,
            }
        }

        fn always(reply: AssistantReply) -> Self {
            Self {
                repeat_last: true,
                ..Self::new(vec![reply])
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        async fn complete(&self, request: &ChatRequest) -> Result<AssistantReply> {
            self.requests.lock().unwrap().push(request.clone());
            let mut replies = self.replies.lock().unwrap();
            if self.repeat_last {
                return Ok(replies[0].clone());
            }
            if replies.is_empty() {
                anyhow::bail!("script exhausted");
            }
            Ok(replies.remove(0))
        }
    }

    fn tool_call(id: &str, name: &str, args: Value) -> AssistantReply {
        AssistantReply {
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: id.to_string(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments: args,
                },
            }]),
        }
    }

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase the text argument"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": { "text": { "type": "string" } } })
        }
        async fn invoke(&self, args: Value) -> Result<String> {
            Ok(args["text"].as_str().unwrap_or("").to_uppercase())
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Box::new(Upper));
        r
    }

    #[tokio::test]
    async fn test_plain_reply_is_trimmed() {
        let backend = Scripted::new(vec![AssistantReply::text("  hi there \n")]);
        let out = run(&backend, None, vec![ChatMessage::user("hello")], &Default::default())
            .await
            .unwrap();
        assert_eq!(out.reply, "hi there");
        assert_eq!(out.rounds, 1);
        assert!(backend.requests.lock().unwrap()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_empty_content_is_fatal() {
        let backend = Scripted::new(vec![AssistantReply::text("   ")]);
        let err = run(&backend, None, vec![], &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::EmptyContent));
    }

    #[tokio::test]
    async fn test_loop_exhausted_after_exact_rounds() {
        let backend = Scripted::always(tool_call("c", "upper", json!("{}")));
        let tools = registry();
        let opts = CompletionOptions {
            max_tool_rounds: 2,
            ..Default::default()
        };
        let err = run(&backend, Some(&tools), vec![], &opts).await.unwrap_err();
        assert!(matches!(err, CompletionError::LoopExhausted(2)));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_non_positive_rounds_still_attempt_once() {
        for max in [0, -3] {
            let backend = Scripted::always(tool_call("c", "upper", json!("{}")));
            let opts = CompletionOptions {
                max_tool_rounds: max,
                ..Default::default()
            };
            let err = run(&backend, None, vec![], &opts).await.unwrap_err();
            assert!(matches!(err, CompletionError::LoopExhausted(1)));
            assert_eq!(backend.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_unregistered_tool_then_final_reply() {
        let backend = Scripted::new(vec![
            tool_call("call_x", "X", json!("{}")),
            AssistantReply::text("OK"),
        ]);
        let tools = registry();
        let out = run(&backend, Some(&tools), vec![ChatMessage::user("q")], &Default::default())
            .await
            .unwrap();
        assert_eq!(out.reply, "OK");
        assert_eq!(out.rounds, 2);

        let tool_msg = out
            .transcript
            .iter()
            .find(|m| m.role == ChatRole::Tool)
            .expect("tool result appended");
        assert_eq!(tool_msg.content.as_deref(), Some(unavailable_message("X").as_str()));
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_x"));

        // Second round sees: user, assistant tool-call message, tool result.
        let second = &backend.requests.lock().unwrap()[1];
        let roles: Vec<ChatRole> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant, ChatRole::Tool]);
        assert_eq!(second.tool_choice, Some(ToolChoice::Auto));
        assert_eq!(second.tools.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_results_in_call_order_with_parsed_args() {
        let reply = AssistantReply {
            content: None,
            tool_calls: Some(vec![
                ToolCall {
                    id: "1".into(),
                    kind: "function".into(),
                    function: FunctionCall {
                        name: "upper".into(),
                        arguments: json!("{\"text\":\"abc\"}"),
                    },
                },
                ToolCall {
                    id: "2".into(),
                    kind: "function".into(),
                    function: FunctionCall {
                        name: "upper".into(),
                        arguments: json!({ "text": "xyz" }),
                    },
                },
                ToolCall {
                    id: "3".into(),
                    kind: "function".into(),
                    function: FunctionCall {
                        name: "upper".into(),
                        arguments: json!("not json"),
                    },
                },
            ]),
        };
        let backend = Scripted::new(vec![reply, AssistantReply::text("done")]);
        let tools = registry();
        let out = run(&backend, Some(&tools), vec![], &Default::default())
            .await
            .unwrap();

        let results: Vec<(&str, &str)> = out
            .transcript
            .iter()
            .filter(|m| m.role == ChatRole::Tool)
            .map(|m| {
                (
                    m.tool_call_id.as_deref().unwrap_or(""),
                    m.content.as_deref().unwrap_or(""),
                )
            })
            .collect();
        assert_eq!(results, vec![("1", "ABC"), ("2", "XYZ"), ("3", "")]);
    }

    #[tokio::test]
    async fn test_null_tool_name_is_not_available() {
        let reply: AssistantReply = serde_json::from_value(json!({
            "content": null,
            "tool_calls": [{ "id": "call_n", "function": { "name": null, "arguments": "{}" } }]
        }))
        .unwrap();
        let backend = Scripted::new(vec![reply, AssistantReply::text("OK")]);
        let tools = registry();
        let out = run(&backend, Some(&tools), vec![], &Default::default())
            .await
            .unwrap();

        assert_eq!(out.reply, "OK");
        let tool_msg = out
            .transcript
            .iter()
            .find(|m| m.role == ChatRole::Tool)
            .expect("tool result appended");
        assert_eq!(tool_msg.content.as_deref(), Some("Tool '' is not available"));
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let backend = Scripted::new(vec![]);
        let err = run(&backend, None, vec![], &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Backend(msg) if msg.contains("script exhausted")));
    }
}
