//! Webhook event normalizer.
//!
//! Classifies a raw Chatwoot webhook payload as ignorable or actionable and
//! extracts a [`CanonicalMessage`] from the actionable ones.
//!
//! Chatwoot delivers several payload shapes for the same event: fields may
//! sit at the top level or nested under `message`, and `message_type` may be
//! an integer or a string. Every field is therefore resolved through a short
//! chain of optional lookups tried in a fixed priority order.
//!
//! # Decision order
//!
//! The first matching rule wins:
//!
//! 1. `event != "message_created"` → ignored (`unsupported_event`)
//! 2. private flag at top level or under `message` → ignored (`private_message`)
//! 3. not incoming → ignored (`not_incoming`)
//! 4. sender is `agent` / `agent_bot` → ignored (`sender_is_bot`)
//! 5. blank content → ignored (`empty_content`)
//! 6. reply address incomplete → [`NormalizeError::MissingIdentifiers`]

use serde_json::Value;
use thiserror::Error;

use crate::models::{AddressMode, CanonicalMessage, ConversationAddress};

/// The only event kind the relay acts on.
pub const MESSAGE_CREATED: &str = "message_created";

/// Why a well-formed webhook was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnsupportedEvent,
    PrivateMessage,
    NotIncoming,
    SenderIsBot,
    EmptyContent,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedEvent => "unsupported_event",
            Self::PrivateMessage => "private_message",
            Self::NotIncoming => "not_incoming",
            Self::SenderIsBot => "sender_is_bot",
            Self::EmptyContent => "empty_content",
        }
    }
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of normalizing a payload that is not malformed.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Ignored(IgnoreReason),
    Message(CanonicalMessage),
}

/// Payloads the relay cannot act on and must reject as a client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("webhook payload must be a JSON object")]
    UnsupportedPayload,
    #[error("missing {0}")]
    MissingIdentifiers(String),
}

/// Deployment-dependent normalization settings.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    pub mode: AddressMode,
    /// Used in public mode when the payload carries no `inbox.identifier`.
    pub default_inbox_identifier: Option<String>,
}

/// Normalize one webhook payload.
pub fn normalize(payload: &Value, opts: &NormalizeOptions) -> Result<Normalized, NormalizeError> {
    if !payload.is_object() {
        return Err(NormalizeError::UnsupportedPayload);
    }

    let event_kind = payload.get("event").and_then(Value::as_str).unwrap_or("");
    if event_kind != MESSAGE_CREATED {
        return Ok(Normalized::Ignored(IgnoreReason::UnsupportedEvent));
    }

    if is_private(payload) {
        return Ok(Normalized::Ignored(IgnoreReason::PrivateMessage));
    }

    if !is_incoming(payload) {
        return Ok(Normalized::Ignored(IgnoreReason::NotIncoming));
    }

    if sender_is_bot(payload) {
        return Ok(Normalized::Ignored(IgnoreReason::SenderIsBot));
    }

    let content = extract_content(payload);
    if content.is_empty() {
        return Ok(Normalized::Ignored(IgnoreReason::EmptyContent));
    }

    let contact_ref = contact_identifier(payload);
    let address = extract_address(payload, opts, contact_ref.clone())?;

    Ok(Normalized::Message(CanonicalMessage {
        event_kind: event_kind.to_string(),
        is_private: false,
        is_incoming: true,
        sender_is_bot: false,
        content,
        address,
        contact_ref,
    }))
}

fn nested_message(payload: &Value) -> Option<&Value> {
    payload.get("message").filter(|m| m.is_object())
}

fn is_private(payload: &Value) -> bool {
    let flagged = |v: &Value| v.get("private").and_then(Value::as_bool) == Some(true);
    flagged(payload) || nested_message(payload).is_some_and(flagged)
}

/// `Some(true/false)` when `message_type` is present with a usable type.
///
/// A present string or integer is decisive; anything else defers to the
/// next extractor in the chain.
fn message_type_signal(container: &Value) -> Option<bool> {
    match container.get("message_type")? {
        Value::String(s) => Some(s == "incoming"),
        Value::Number(n) => n.as_i64().map(|n| n == 0),
        _ => None,
    }
}

/// Sender object: top level first, then nested under `message`.
fn sender(payload: &Value) -> Option<&Value> {
    let non_empty = |v: &&Value| v.as_object().is_some_and(|o| !o.is_empty());
    payload
        .get("sender")
        .filter(non_empty)
        .or_else(|| nested_message(payload).and_then(|m| m.get("sender").filter(non_empty)))
}

fn sender_type(payload: &Value) -> Option<&str> {
    sender(payload)?.get("type")?.as_str()
}

fn is_incoming(payload: &Value) -> bool {
    message_type_signal(payload)
        .or_else(|| nested_message(payload).and_then(message_type_signal))
        .unwrap_or_else(|| sender_type(payload) == Some("contact"))
}

fn sender_is_bot(payload: &Value) -> bool {
    matches!(sender_type(payload), Some("agent" | "agent_bot"))
}

fn extract_content(payload: &Value) -> String {
    if let Some(content) = payload.get("content").and_then(Value::as_str) {
        return content.trim().to_string();
    }
    nested_message(payload)
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Integer id from `<object>.id`, falling back to the flat `<object>_id` key.
fn nested_or_flat_id(payload: &Value, object: &str, flat: &str) -> Option<i64> {
    payload
        .get(object)
        .and_then(|o| o.get("id"))
        .and_then(Value::as_i64)
        .or_else(|| payload.get(flat).and_then(Value::as_i64))
}

fn non_empty_str(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn contact_identifier(payload: &Value) -> Option<String> {
    non_empty_str(
        payload
            .get("conversation")
            .and_then(|c| c.get("contact_inbox"))
            .and_then(|ci| ci.get("source_id")),
    )
    .or_else(|| non_empty_str(payload.get("contact_inbox").and_then(|ci| ci.get("source_id"))))
    .or_else(|| non_empty_str(sender(payload).and_then(|s| s.get("identifier"))))
}

fn inbox_identifier(payload: &Value, opts: &NormalizeOptions) -> Option<String> {
    non_empty_str(payload.get("inbox").and_then(|i| i.get("identifier"))).or_else(|| {
        opts.default_inbox_identifier
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn extract_address(
    payload: &Value,
    opts: &NormalizeOptions,
    contact_ref: Option<String>,
) -> Result<ConversationAddress, NormalizeError> {
    let conversation_id = nested_or_flat_id(payload, "conversation", "conversation_id");

    match opts.mode {
        AddressMode::Account => {
            let account_id = nested_or_flat_id(payload, "account", "account_id");
            match (account_id, conversation_id) {
                (Some(account_id), Some(conversation_id)) => Ok(ConversationAddress::Account {
                    account_id,
                    conversation_id,
                }),
                _ => Err(NormalizeError::MissingIdentifiers(
                    "account_id or conversation_id".to_string(),
                )),
            }
        }
        AddressMode::Public => {
            let inbox = inbox_identifier(payload, opts);
            match (inbox, contact_ref, conversation_id) {
                (Some(inbox_identifier), Some(contact_identifier), Some(conversation_id)) => {
                    Ok(ConversationAddress::Public {
                        inbox_identifier,
                        contact_identifier,
                        conversation_id,
                    })
                }
                _ => Err(NormalizeError::MissingIdentifiers(
                    "inbox_identifier, contact_identifier or conversation_id".to_string(),
                )),
            }
        }
    }
}
