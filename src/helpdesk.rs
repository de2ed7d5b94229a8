//! Chatwoot helpdesk client.
//!
//! Two addressing modes share one client:
//!
//! | Mode | Messages URL |
//! |------|--------------|
//! | `account` | `{base}/api/v1/accounts/{account_id}/conversations/{id}/messages` |
//! | `public` | `{base}/public/api/v1/inboxes/{inbox}/contacts/{contact}/conversations/{id}/messages` |
//!
//! Both list with `GET` (body `{payload: [...]}`) and post with `POST`.
//! The token is sent in the `api_access_token` header when configured.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use relay_core::history::last_n;
use relay_core::models::{ConversationAddress, HistoryRecord};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;

/// The helpdesk operations the relay depends on.
#[async_trait]
pub trait Helpdesk: Send + Sync {
    /// The most recent `limit` messages of a conversation, in any order.
    /// `limit <= 0` returns an empty list without contacting the helpdesk.
    async fn list_messages(
        &self,
        address: &ConversationAddress,
        limit: i64,
    ) -> Result<Vec<HistoryRecord>>;

    /// Post an outgoing, public text reply.
    async fn create_message(&self, address: &ConversationAddress, content: &str) -> Result<()>;
}

pub struct ChatwootClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<SecretString>,
}

impl ChatwootClient {
    pub fn new(base_url: &str, api_token: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build helpdesk HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.helpdesk.base_url,
            config.secrets.helpdesk_api_token.clone(),
            Duration::from_secs(config.helpdesk.timeout_secs),
        )
    }

    pub fn messages_url(&self, address: &ConversationAddress) -> String {
        match address {
            ConversationAddress::Account {
                account_id,
                conversation_id,
            } => format!(
                "{}/api/v1/accounts/{}/conversations/{}/messages",
                self.base_url, account_id, conversation_id
            ),
            ConversationAddress::Public {
                inbox_identifier,
                contact_identifier,
                conversation_id,
            } => format!(
                "{}/public/api/v1/inboxes/{}/contacts/{}/conversations/{}/messages",
                self.base_url, inbox_identifier, contact_identifier, conversation_id
            ),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.header("api_access_token", token.expose_secret()),
            None => request,
        }
    }
}

#[async_trait]
impl Helpdesk for ChatwootClient {
    async fn list_messages(
        &self,
        address: &ConversationAddress,
        limit: i64,
    ) -> Result<Vec<HistoryRecord>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let url = self.messages_url(address);
        let response = self
            .authorize(self.client.get(&url))
            .query(&[("limit", limit)])
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Helpdesk API error {}: {}", status, body_text);
        }

        let json: Value = response
            .json()
            .await
            .context("Invalid helpdesk messages response")?;
        Ok(last_n(parse_messages(&json), limit as usize))
    }

    async fn create_message(&self, address: &ConversationAddress, content: &str) -> Result<()> {
        let url = self.messages_url(address);
        let body = serde_json::json!({
            "content": content,
            "message_type": "outgoing",
            "private": false,
            "content_type": "text",
        });

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Helpdesk API error {}: {}", status, body_text);
        }
        Ok(())
    }
}

/// Extract history records from a `{payload: [...]}` body.
///
/// A bare array is accepted too. `sender_type` falls back to `sender.type`
/// and is lowercased, since the account API reports `"Contact"`/`"User"`.
pub fn parse_messages(json: &Value) -> Vec<HistoryRecord> {
    let items = json
        .get("payload")
        .and_then(Value::as_array)
        .or_else(|| json.as_array());

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| {
            let mut record = HistoryRecord::from_value(item);
            if record.sender_type.is_none() {
                record.sender_type = item
                    .get("sender")
                    .and_then(|s| s.get("type"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            record.sender_type = record.sender_type.map(|s| s.to_ascii_lowercase());
            record
        })
        .collect()
}
