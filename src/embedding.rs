//! OpenAI-compatible embedding client.
//!
//! Posts `{model, input}` to `{base_url}/embeddings` and expects
//! `{data: [{index, embedding}]}`. Results are re-sorted by `index`; a
//! response that leaves any input without an embedding is an error.
//!
//! Inputs larger than `batch_size` are split into sequential requests.
//! There is no retry: a transport error, timeout or non-2xx status fails
//! the whole call.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use relay_core::embedding::Embedder;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::config::Config;

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: SecretString,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build embedding HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
            batch_size: batch_size.max(1),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .embedding_api_key()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
        Self::new(
            config.embedding_base_url(),
            config.embedding.model.clone(),
            api_key,
            config.embedding.batch_size,
            Duration::from_secs(config.llm.timeout_secs),
        )
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

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
            bail!("Embedding API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("Invalid embedding response body")?;
        parse_embedding_response(&json, texts.len())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

/// Parse an `/embeddings` response for `expected` inputs.
///
/// Items without an `index` take their array position.
pub fn parse_embedding_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let parsed: EmbeddingResponse = serde_json::from_value(json.clone())
        .context("Invalid embedding response: missing data array")?;

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for (position, item) in parsed.data.into_iter().enumerate() {
        let index = item.index.unwrap_or(position);
        if index >= expected {
            bail!(
                "Invalid embedding response: index {} out of range for {} inputs",
                index,
                expected
            );
        }
        slots[index] = item.embedding;
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embedding {}", i))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resorted_by_index() {
        let json = json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let out = parse_embedding_response(&json, 2).unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_missing_embedding_is_error() {
        let json = json!({ "data": [ { "index": 0, "embedding": [1.0] } ] });
        let err = parse_embedding_response(&json, 2).unwrap_err();
        assert!(err.to_string().contains("missing embedding 1"));

        let null = json!({ "data": [ { "index": 0, "embedding": null } ] });
        assert!(parse_embedding_response(&null, 1).is_err());
    }

    #[test]
    fn test_missing_data_array_is_error() {
        assert!(parse_embedding_response(&json!({ "error": "nope" }), 1).is_err());
    }

    #[test]
    fn test_out_of_range_index_is_error() {
        let json = json!({ "data": [ { "index": 4, "embedding": [1.0] } ] });
        assert!(parse_embedding_response(&json, 1).is_err());
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let embedder = OpenAiEmbedder::new(
            "https://example.test/v1/",
            "m",
            "k".to_string().into(),
            0,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(embedder.endpoint, "https://example.test/v1/embeddings");
        assert_eq!(embedder.batch_size, 1);
        assert_eq!(embedder.model_name(), "m");
    }
}
