//! Webhook orchestration.
//!
//! ```text
//! payload ─▶ normalize ─▶ Ignored(reason)
//!               │
//!               ▼
//!        list recent messages ─▶ system prompt ─▶ [RAG context] ─▶ history turns
//!               │
//!               ▼
//!        completion loop (tools optional) ─▶ post reply
//! ```
//!
//! Collaborators are trait objects held in [`AppState`], so the HTTP layer
//! and tests can swap them freely. The tool registry and the store
//! snapshot are built per request.

use relay_core::chat::{ChatBackend, ChatMessage, ToolChoice};
use relay_core::completion::{self, CompletionOptions};
use relay_core::embedding::Embedder;
use relay_core::event::{normalize, IgnoreReason, NormalizeOptions, Normalized};
use relay_core::history::map_history;
use relay_core::models::{DialogueTurn, SourceRef};
use relay_core::store::EmbeddingStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::RelayError;
use crate::helpdesk::Helpdesk;
use crate::prompt::load_system_prompt;
use crate::retrieval::retrieve;
use crate::tools::build_registry;

/// Opens a fresh embedding-store instance for one request.
pub type StoreOpener = Arc<dyn Fn() -> Arc<dyn EmbeddingStore> + Send + Sync>;

/// Shared, read-only state for every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub helpdesk: Arc<dyn Helpdesk>,
    pub chat: Arc<dyn ChatBackend>,
    /// Required when `[rag] enabled = true`.
    pub embedder: Option<Arc<dyn Embedder>>,
    pub store: StoreOpener,
}

/// What happened to one webhook.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    Replied {
        conversation_id: i64,
        rounds: usize,
        sources: Vec<SourceRef>,
    },
}

/// Run one webhook payload through the full pipeline.
pub async fn handle_webhook(state: &AppState, payload: &Value) -> Result<Outcome, RelayError> {
    let config = state.config.as_ref();
    let opts = NormalizeOptions {
        mode: config.helpdesk.mode,
        default_inbox_identifier: config.helpdesk.inbox_identifier.clone(),
    };

    let message = match normalize(payload, &opts)? {
        Normalized::Ignored(reason) => {
            info!(reason = reason.as_str(), "webhook ignored");
            return Ok(Outcome::Ignored(reason));
        }
        Normalized::Message(m) => m,
    };
    let conversation_id = message.address.conversation_id();
    debug!(conversation_id, "actionable message");

    let history = state
        .helpdesk
        .list_messages(&message.address, config.helpdesk.history_messages)
        .await
        .map_err(RelayError::helpdesk)?;

    let system_prompt = load_system_prompt(&config.prompt).await;

    let (context, sources) = if config.rag.enabled {
        let embedder = state
            .embedder
            .as_deref()
            .ok_or_else(|| RelayError::Internal("RAG enabled without an embedder".into()))?;
        let store = (state.store)();
        let rag = retrieve(embedder, store.as_ref(), &message.content, config.rag.top_k).await?;
        info!(conversation_id, hits = rag.sources.len(), "retrieved context");
        for source in &rag.sources {
            debug!(
                conversation_id,
                id = %source.id,
                title = source.title.as_deref().unwrap_or("-"),
                source = source.source.as_deref().unwrap_or("-"),
                "context source"
            );
        }
        (rag.context, rag.sources)
    } else {
        (String::new(), Vec::new())
    };

    let turns = map_history(&history, &message.content);
    let transcript = build_transcript(&system_prompt, &context, &turns);

    let registry = if config.tools.enabled {
        Some(
            build_registry(&config.tools)
                .await
                .map_err(|e| RelayError::Internal(format!("{:#}", e)))?,
        )
    } else {
        None
    };
    let completion_opts = CompletionOptions {
        max_tool_rounds: config.tools.max_tool_rounds,
        tool_choice: ToolChoice::parse(&config.tools.tool_choice),
    };

    let completion = completion::run(
        state.chat.as_ref(),
        registry.as_ref(),
        transcript,
        &completion_opts,
    )
    .await?;

    state
        .helpdesk
        .create_message(&message.address, &completion.reply)
        .await
        .map_err(RelayError::helpdesk)?;

    info!(conversation_id, rounds = completion.rounds, "reply posted");
    Ok(Outcome::Replied {
        conversation_id,
        rounds: completion.rounds,
        sources,
    })
}

/// System prompt, then the context block when non-empty, then the turns.
pub fn build_transcript(
    system_prompt: &str,
    context: &str,
    turns: &[DialogueTurn],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    if !context.is_empty() {
        messages.push(ChatMessage::system(context));
    }
    messages.extend(turns.iter().map(ChatMessage::from));
    messages
}
