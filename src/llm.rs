//! OpenAI-compatible chat-completion backend (OpenRouter by default).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use relay_core::chat::{AssistantReply, ChatBackend, ChatRequest, ChatResponse};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::Config;

pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: SecretString,
}

impl OpenAiChat {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        temperature: f32,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build LLM HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            temperature,
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .secrets
            .llm_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
        Self::new(
            &config.llm.base_url,
            config.llm.model.clone(),
            config.llm.temperature,
            api_key,
            Duration::from_secs(config.llm.timeout_secs),
        )
    }

    /// Full request body for one round.
    pub fn request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": self.temperature,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
            if let Some(choice) = &request.tool_choice {
                body["tool_choice"] = choice.to_value();
            }
        }
        body
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn complete(&self, request: &ChatRequest) -> Result<AssistantReply> {
        let body = self.request_body(request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Chat API error {}: {}", status, body_text);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Invalid chat completion response body")?;
        Ok(parsed.into_reply())
    }
}
