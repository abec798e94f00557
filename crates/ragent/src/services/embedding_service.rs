use crate::config::EmbeddingConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed each text in turn
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    content: &'a str,
    input: &'a str,
}

/// Client for a llama.cpp style `/embedding` endpoint
#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    base_url: String,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create embedding HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    async fn embed_internal(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        // Send both field names for compatibility
        let request = EmbeddingRequest {
            content: text,
            input: text,
        };

        let response = self
            .client
            .post(format!("{}/embedding", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = parse_embedding(&json_value)?;
        if embedding.is_empty() {
            anyhow::bail!("Generated embedding is empty");
        }
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_internal(text).await
    }
}

/// Accepts `{"embedding": [..]}`, `[{"embedding": [..]}]`, `[..]` and `{"data": [{"embedding": [..]}]}`
fn parse_embedding(value: &Value) -> Result<Vec<f32>> {
    let floats = |arr: &[Value]| -> Vec<f32> {
        arr.iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    };

    if let Some(arr) = value.as_array() {
        let first = arr.first().context("Empty array returned from embedding server")?;
        return Ok(match first.get("embedding").and_then(Value::as_array) {
            Some(inner) => floats(inner),
            None => floats(arr),
        });
    }

    if let Some(inner) = value.get("embedding").and_then(Value::as_array) {
        return Ok(floats(inner));
    }

    if let Some(inner) = value
        .get("data")
        .and_then(Value::as_array)
        .and_then(|data| data.first())
        .and_then(|item| item.get("embedding"))
        .and_then(Value::as_array)
    {
        return Ok(floats(inner));
    }

    anyhow::bail!("Unrecognized embedding response format: {}", value)
}
