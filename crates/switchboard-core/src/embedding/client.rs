//! HTTP client for an Ollama-compatible embedding service
//!
//! Sends `POST {host}/api/embeddings` with `{"model", "prompt"}` and expects
//! `{"embedding": [...]}` in return.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Anything that can turn text into a vector
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Model identifier, part of every cache key
    fn model(&self) -> &str;

    /// Produce one embedding; a single attempt with no retries
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Ollama embedding client
#[derive(Clone)]
pub struct OllamaEmbeddingClient {
    http_client: HttpClient,
    host: String,
    model: String,
    timeout_secs: u64,
}

impl std::fmt::Debug for OllamaEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaEmbeddingClient")
            .field("host", &self.host)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Builder for creating an OllamaEmbeddingClient
#[derive(Default)]
pub struct OllamaEmbeddingClientBuilder {
    config: Option<EmbeddingConfig>,
    host: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

impl OllamaEmbeddingClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the embedding configuration
    pub fn config(mut self, config: EmbeddingConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the host (otherwise the configured or `OLLAMA_HOST` host)
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> Result<OllamaEmbeddingClient> {
        let config = self.config.unwrap_or_default();
        let timeout_secs = self.timeout_secs.unwrap_or(config.timeout_secs);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        let host = self
            .host
            .map(|h| h.trim_end_matches('/').to_string())
            .unwrap_or_else(|| config.resolved_host());

        Ok(OllamaEmbeddingClient {
            http_client,
            host,
            model: self.model.unwrap_or(config.model),
            timeout_secs,
        })
    }
}

impl OllamaEmbeddingClient {
    /// Create a client from configuration
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        OllamaEmbeddingClientBuilder::new().config(config).build()
    }

    pub fn builder() -> OllamaEmbeddingClientBuilder {
        OllamaEmbeddingClientBuilder::new()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn map_send_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::EmbeddingTimeout(self.timeout_secs)
        } else {
            Error::NetworkError(error)
        }
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.host);

        debug!(model = %self.model, chars = text.len(), "Requesting embedding");

        let response = self
            .http_client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::EmbeddingUnavailable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                Error::EmbeddingTimeout(self.timeout_secs)
            } else {
                Error::EmbeddingUnavailable(format!("Malformed embedding response: {}", e))
            }
        })?;

        if parsed.embedding.is_empty() {
            return Err(Error::EmbeddingUnavailable(
                "Response contained no embedding".to_string(),
            ));
        }

        Ok(parsed.embedding)
    }
}
