//! Semantic routing by embedding similarity
//!
//! Each expert is described by a static profile (keywords, a description and
//! example queries). Profiles are embedded once at initialization; each prompt
//! is embedded on demand and routed to the most similar profile.
//!
//! Prompts whose best similarity falls below the configured threshold are sent
//! to [`ExpertKind::Orchestrator`]. If the prompt cannot be embedded at all the
//! strategy still answers, with a zero-confidence orchestrator decision.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::strategy::RoutingStrategy;
use super::types::{ExpertKind, FALLBACK_REASON_KEY, RequestContext, RoutingDecision};
use crate::embedding::CachedEmbedder;
use crate::error::{Error, Result};

/// Number of candidates reported in decision metadata
const TOP_SCORES: usize = 5;

/// Settings for the vector strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Minimum similarity for a specialist to be selected
    pub similarity_threshold: f64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.5,
        }
    }
}

impl VectorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.similarity_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.similarity_threshold)
        {
            return Err(Error::config(format!(
                "vector.similarity_threshold must be between 0.0 and 1.0, got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Static description of an expert used to derive its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertProfile {
    pub expert: ExpertKind,
    pub keywords: Vec<String>,
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl ExpertProfile {
    pub fn new(
        expert: ExpertKind,
        keywords: &[&str],
        description: impl Into<String>,
        examples: &[&str],
    ) -> Self {
        Self {
            expert,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            description: description.into(),
            examples: examples.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Text submitted to the embedding service for this profile
    pub fn embedding_text(&self) -> String {
        let examples = self
            .examples
            .iter()
            .map(|e| format!("- {}", e))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Expert Type: {}\nDescription: {}\nKeywords: {}\nExample Queries:\n{}",
            self.expert,
            self.description,
            self.keywords.join(", "),
            examples
        )
    }

    /// Built-in profiles, one per expert
    pub fn defaults() -> Vec<ExpertProfile> {
        vec![
            Self::new(
                ExpertKind::MarketRegime,
                &["market regime", "regime", "market state", "regime change", "market environment"],
                "Specializes in identifying and analyzing different market regimes \
                 such as trending, ranging, volatile, or stable markets.",
                &[
                    "What's the current market regime?",
                    "Has the market regime changed recently?",
                    "Is this a high volatility environment?",
                ],
            ),
            Self::new(
                ExpertKind::OptionsFlow,
                &["options flow", "unusual options activity", "options order flow", "block trades"],
                "Analyzes options market data to identify unusual activity, \
                 large trades, and potential smart money flows.",
                &[
                    "Show me unusual options activity in tech stocks",
                    "What are the largest options trades today?",
                    "Is there any unusual put buying in SPY?",
                ],
            ),
            Self::new(
                ExpertKind::Sentiment,
                &["sentiment", "market sentiment", "investor sentiment", "fear and greed"],
                "Analyzes market sentiment using news, social media, and other \
                 alternative data sources to gauge market psychology.",
                &[
                    "What's the current market sentiment?",
                    "Is there excessive bullishness in tech stocks?",
                    "Show me the fear and greed index",
                ],
            ),
            Self::new(
                ExpertKind::Orchestrator,
                &["orchestrator", "general", "multi-expert", "complex query"],
                "Coordinates complex queries that require input from multiple \
                 specialized experts and synthesizes the results.",
                &[
                    "Analyze the current market environment",
                    "Provide a comprehensive market analysis",
                    "What's happening in the markets today?",
                ],
            ),
            Self::new(
                ExpertKind::Volatility,
                &["volatility", "VIX", "implied volatility", "vol surface", "volatility analysis"],
                "Specializes in volatility analysis, implied volatility surfaces, \
                 and volatility-based trading strategies.",
                &[
                    "What's the current VIX level telling us?",
                    "Analyze the implied volatility surface for SPY",
                    "Is volatility elevated in tech stocks?",
                ],
            ),
            Self::new(
                ExpertKind::Liquidity,
                &["liquidity", "bid-ask spread", "volume", "market depth", "liquidity analysis"],
                "Analyzes market liquidity conditions, bid-ask spreads, \
                 and volume patterns for optimal execution.",
                &[
                    "What's the liquidity like in SPY options?",
                    "Analyze the bid-ask spreads for AAPL",
                    "Is there sufficient volume for this trade?",
                ],
            ),
            Self::new(
                ExpertKind::Risk,
                &["risk", "risk management", "position sizing", "portfolio risk", "VaR"],
                "Focuses on risk assessment, position sizing, portfolio risk, \
                 and risk management strategies.",
                &[
                    "What's the portfolio risk for this position?",
                    "Calculate optimal position size for 1% risk",
                    "What's the Value at Risk for my portfolio?",
                ],
            ),
            Self::new(
                ExpertKind::Execution,
                &["execution", "order execution", "slippage", "timing", "execution analysis"],
                "Specializes in trade execution analysis, slippage minimization, \
                 and optimal execution timing strategies.",
                &[
                    "What's the best execution strategy for this order?",
                    "Analyze the slippage on my recent trades",
                    "When is the optimal time to execute this trade?",
                ],
            ),
        ]
    }
}

/// Calculate cosine similarity between two vectors
///
/// Returns 0 when the lengths differ or either vector has zero magnitude.
/// Rounding is clamped so the result stays within `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Routes prompts to the expert whose profile is semantically closest
pub struct VectorStrategy {
    embedder: Arc<CachedEmbedder>,
    config: VectorConfig,
    profiles: Vec<ExpertProfile>,
    init_concurrency: usize,
    /// Profile vectors in profile order
    embeddings: RwLock<Vec<(ExpertKind, Arc<[f32]>)>>,
    initialized: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
    zero_vectors: AtomicUsize,
}

impl std::fmt::Debug for VectorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStrategy")
            .field("model", &self.embedder.model())
            .field("config", &self.config)
            .field("profiles", &self.profiles.len())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl VectorStrategy {
    pub fn new(embedder: Arc<CachedEmbedder>, config: VectorConfig) -> Self {
        Self {
            embedder,
            config,
            profiles: ExpertProfile::defaults(),
            init_concurrency: 4,
            embeddings: RwLock::new(Vec::new()),
            initialized: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
            zero_vectors: AtomicUsize::new(0),
        }
    }

    /// Replace the built-in profiles
    pub fn with_profiles(mut self, profiles: Vec<ExpertProfile>) -> Self {
        self.profiles = profiles;
        self
    }

    /// Maximum concurrent embedding requests during initialization
    pub fn with_init_concurrency(mut self, limit: usize) -> Self {
        self.init_concurrency = limit.max(1);
        self
    }

    pub fn profiles(&self) -> &[ExpertProfile] {
        &self.profiles
    }

    pub fn config(&self) -> &VectorConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Profiles whose embedding failed and were replaced by a zero vector
    pub fn zero_vector_profiles(&self) -> usize {
        self.zero_vectors.load(Ordering::Relaxed)
    }

    async fn compute_profile_embeddings(&self) -> Vec<(ExpertKind, Arc<[f32]>)> {
        let dimension = self.embedder.dimension();

        let jobs: Vec<(usize, ExpertKind, String)> = self
            .profiles
            .iter()
            .enumerate()
            .map(|(index, profile)| (index, profile.expert, profile.embedding_text()))
            .collect();

        let mut results: Vec<(usize, ExpertKind, Result<Arc<[f32]>>)> = stream::iter(jobs)
            .map(|(index, expert, text)| {
                let embedder = Arc::clone(&self.embedder);
                async move {
                    let result = embedder.embed(&text).await;
                    (index, expert, result)
                }
            })
            .buffer_unordered(self.init_concurrency)
            .collect()
            .await;

        results.sort_by_key(|(index, _, _)| *index);

        let mut zero_vectors = 0;
        let embeddings = results
            .into_iter()
            .map(|(_, expert, result)| match result {
                Ok(vector) => {
                    debug!(expert = %expert, "Computed profile embedding");
                    (expert, vector)
                }
                Err(e) => {
                    warn!(
                        expert = %expert,
                        error = %e,
                        "Profile embedding failed, using zero vector"
                    );
                    zero_vectors += 1;
                    (expert, Arc::from(vec![0.0f32; dimension]))
                }
            })
            .collect();

        self.zero_vectors.store(zero_vectors, Ordering::Relaxed);
        embeddings
    }

    /// Similarity to every profile, best first; ties keep profile order
    fn rank(&self, prompt_vector: &[f32]) -> Result<Vec<(ExpertKind, f64)>> {
        let embeddings = self
            .embeddings
            .read()
            .map_err(|_| Error::Other("vector strategy state poisoned".to_string()))?;

        let mut similarities: Vec<(ExpertKind, f64)> = embeddings
            .iter()
            .map(|(expert, vector)| (*expert, cosine_similarity(prompt_vector, vector)))
            .collect();
        similarities.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(similarities)
    }
}

#[async_trait]
impl RoutingStrategy for VectorStrategy {
    fn name(&self) -> &str {
        "vector"
    }

    async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        info!(
            profiles = self.profiles.len(),
            concurrency = self.init_concurrency,
            model = %self.embedder.model(),
            "Initializing vector routing"
        );

        let embeddings = self.compute_profile_embeddings().await;
        {
            let mut slot = self
                .embeddings
                .write()
                .map_err(|_| Error::Other("vector strategy state poisoned".to_string()))?;
            *slot = embeddings;
        }
        self.initialized.store(true, Ordering::Release);

        info!(
            zero_vectors = self.zero_vector_profiles(),
            "Vector routing initialized"
        );
        Ok(())
    }

    async fn select_expert(
        &self,
        prompt: &str,
        _context: Option<&RequestContext>,
    ) -> Result<RoutingDecision> {
        self.initialize().await?;

        let prompt_vector = match self.embedder.embed(prompt).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "Prompt embedding failed, falling back to orchestrator");
                return Ok(
                    RoutingDecision::fallback(ExpertKind::Orchestrator, "embedding_failed")
                        .with_metadata("error", e.to_string()),
                );
            }
        };

        let similarities = self.rank(&prompt_vector)?;
        let (best_expert, best_score) = similarities
            .first()
            .copied()
            .unwrap_or((ExpertKind::Orchestrator, 0.0));

        let threshold = self.config.similarity_threshold;
        let (selected, fallback_reason) = if best_score < threshold {
            (
                ExpertKind::Orchestrator,
                Some(format!(
                    "similarity_below_threshold ({:.2} < {})",
                    best_score, threshold
                )),
            )
        } else {
            (best_expert, None)
        };

        let top_scores: Map<String, Value> = similarities
            .iter()
            .take(TOP_SCORES)
            .map(|(expert, score)| (expert.to_string(), json!(score)))
            .collect();

        let mut decision = RoutingDecision::new(selected, best_score, self.name())
            .with_metadata("similarity_scores", top_scores)
            .with_metadata("selected_expert", selected.as_str())
            .with_metadata("confidence_score", best_score)
            .with_metadata(
                "best_match_before_fallback",
                json!({ "expert": best_expert, "score": best_score }),
            );
        if let Some(reason) = fallback_reason {
            decision = decision.with_metadata(FALLBACK_REASON_KEY, reason);
        }

        debug!(
            expert = %selected,
            confidence = decision.confidence,
            best_match = %best_expert,
            "Vector routing decision"
        );

        Ok(decision)
    }

    fn strategy_state(&self) -> Value {
        json!({
            "strategy_name": self.name(),
            "model": self.embedder.model(),
            "dimension": self.embedder.dimension(),
            "similarity_threshold": self.config.similarity_threshold,
            "experts_initialized": self.is_initialized(),
            "num_experts": self.profiles.len(),
            "zero_vector_profiles": self.zero_vector_profiles(),
            "cache_stats": self.embedder.cache().stats(),
        })
    }

    async fn shutdown(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if let Ok(mut slot) = self.embeddings.write() {
            slot.clear();
        }
        self.zero_vectors.store(0, Ordering::Relaxed);
        self.initialized.store(false, Ordering::Release);
        debug!("Vector routing shut down");
        Ok(())
    }
}
