//! Text embeddings for semantic routing
//!
//! [`CachedEmbedder`] wraps an [`EmbeddingBackend`] with:
//! - A bounded cache keyed by model and text
//! - A per-attempt timeout
//! - Retries with exponential backoff for transient failures
//! - Dimension checking against the configured embedding size

mod cache;
mod client;

pub use cache::{CacheStats, EmbeddingCache};
pub use client::{EmbeddingBackend, OllamaEmbeddingClient, OllamaEmbeddingClientBuilder};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// How embedding requests are retried
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each time
    pub backoff_base: Duration,
    /// Upper bound on a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            backoff_base: config.backoff_base(),
            attempt_timeout: config.timeout(),
        }
    }

    /// Delay before the attempt following `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Embedding backend with caching, retries and dimension checks
pub struct CachedEmbedder {
    backend: Arc<dyn EmbeddingBackend>,
    cache: Arc<EmbeddingCache>,
    policy: RetryPolicy,
    dimension: usize,
}

impl std::fmt::Debug for CachedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedEmbedder")
            .field("model", &self.backend.model())
            .field("dimension", &self.dimension)
            .field("policy", &self.policy)
            .field("cache", &self.cache)
            .finish()
    }
}

impl CachedEmbedder {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        cache: Arc<EmbeddingCache>,
        policy: RetryPolicy,
        dimension: usize,
    ) -> Self {
        Self {
            backend,
            cache,
            policy,
            dimension,
        }
    }

    /// Build an Ollama-backed embedder from configuration
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        config.validate()?;
        let client = OllamaEmbeddingClient::new(config.clone())?;
        Ok(Self::with_backend(Arc::new(client), config))
    }

    /// Wrap any backend using the cache and retry settings from configuration
    pub fn with_backend(backend: Arc<dyn EmbeddingBackend>, config: &EmbeddingConfig) -> Self {
        Self::new(
            backend,
            Arc::new(EmbeddingCache::new(
                config.cache_capacity,
                config.cache_ttl(),
            )),
            RetryPolicy::from_config(config),
            config.dimension,
        )
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Embed `text`, serving from cache when possible
    ///
    /// Transient failures are retried up to `max_attempts` times with a
    /// `base * 2^attempt` pause between attempts. A vector of the wrong
    /// dimension fails immediately.
    pub async fn embed(&self, text: &str) -> Result<Arc<[f32]>> {
        let model = self.backend.model();
        if let Some(hit) = self.cache.get(model, text) {
            debug!(model = %model, "Embedding cache hit");
            return Ok(hit);
        }

        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts {
            let outcome = tokio::time::timeout(self.policy.attempt_timeout, self.backend.embed(text))
                .await
                .unwrap_or_else(|_| Err(Error::EmbeddingTimeout(self.policy.attempt_timeout.as_secs())));

            match outcome {
                Ok(vector) => {
                    if vector.len() != self.dimension {
                        return Err(Error::EmbeddingDimensionMismatch {
                            expected: self.dimension,
                            actual: vector.len(),
                        });
                    }
                    let vector: Arc<[f32]> = Arc::from(vector);
                    self.cache.insert(model, text, Arc::clone(&vector));
                    return Ok(vector);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        model = %model,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "Embedding attempt failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    error!(model = %model, error = %e, "Embedding failed");
                    return Err(e);
                }
            }

            if attempt + 1 < self.policy.max_attempts {
                tokio::time::sleep(self.policy.delay_for(attempt)).await;
            }
        }

        let e = last_error.unwrap_or_else(|| {
            Error::EmbeddingUnavailable("no embedding attempts were made".to_string())
        });
        error!(
            model = %model,
            attempts = self.policy.max_attempts,
            error = %e,
            "Embedding failed after retries"
        );
        Err(e)
    }
}
