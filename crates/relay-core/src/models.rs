//! Core data models shared by the normalizer, history mapper, store and
//! completion loop.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a reply is addressed back to the helpdesk.
///
/// Chatwoot exposes two APIs: the agent API keyed by account id, and the
/// public client API keyed by inbox and contact identifiers. Which one a
/// deployment uses decides which references the normalizer requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    #[default]
    Account,
    Public,
}

/// Identifiers needed to list and post messages for one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationAddress {
    Account {
        account_id: i64,
        conversation_id: i64,
    },
    Public {
        inbox_identifier: String,
        contact_identifier: String,
        conversation_id: i64,
    },
}

impl ConversationAddress {
    pub fn conversation_id(&self) -> i64 {
        match self {
            Self::Account {
                conversation_id, ..
            }
            | Self::Public {
                conversation_id, ..
            } => *conversation_id,
        }
    }
}

/// An actionable inbound message extracted from a webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalMessage {
    pub event_kind: String,
    pub is_private: bool,
    pub is_incoming: bool,
    pub sender_is_bot: bool,
    /// Trimmed, never empty.
    pub content: String,
    pub address: ConversationAddress,
    pub contact_ref: Option<String>,
}

/// Speaker of a [`DialogueTurn`].
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

/// One turn of the reconstructed conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueTurn {
    pub role: Role,
    pub content: String,
}

impl DialogueTurn {
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

/// A prior message as returned by the helpdesk "list messages" call.
///
/// Fields are kept loosely typed: Chatwoot reports `message_type` either as
/// an integer (`0` = incoming) or as a string depending on the endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub sender_type: Option<String>,
    #[serde(default)]
    pub message_type: Option<Value>,
}

impl HistoryRecord {
    /// Lenient conversion from an arbitrary JSON object.
    ///
    /// Fields with an unexpected type are treated as absent instead of
    /// failing the whole history fetch.
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: value.get("id").and_then(Value::as_i64),
            content: value
                .get("content")
                .and_then(Value::as_str)
                .map(str::to_string),
            private: value.get("private").and_then(Value::as_bool),
            sender_type: value
                .get("sender_type")
                .and_then(Value::as_str)
                .map(str::to_string),
            message_type: value.get("message_type").cloned(),
        }
    }
}

/// Source attribution stored with every [`RagDocument`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Unknown keys survive a load/append cycle untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One embedded chunk, as persisted one-per-line in the store file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagDocument {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: RagMetadata,
    pub embedding: Vec<f32>,
}

/// Citation entry mirroring the order of retrieved documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub id: String,
    pub title: Option<String>,
    pub source: Option<String>,
}

impl From<&RagDocument> for SourceRef {
    fn from(doc: &RagDocument) -> Self {
        Self {
            id: doc.id.clone(),
            title: doc.metadata.title.clone(),
            source: doc.metadata.source.clone(),
        }
    }
}
