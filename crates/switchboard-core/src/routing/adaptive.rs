//! Adaptive combination of routing strategies
//!
//! The adaptive router fans a prompt out to every configured sub-strategy,
//! combines their proposals by weighted vote and learns which strategies to
//! trust from outcome feedback.
//!
//! ## Voting
//!
//! Each vote counts `prior_weight * learned_performance * confidence`. The
//! winner's total is normalized by the summed adjusted weight of every
//! strategy that voted. Ties go to the expert whose first vote came from the
//! earliest configured strategy.
//!
//! ## Learning
//!
//! After feedback, every strategy that voted in the referenced decision moves
//! its learned performance toward `reward * vote_confidence` with rate 0.1,
//! clamped to `[0.1, 2.0]`. Feedback without a decision id applies to the
//! most recent decision.
//!
//! ## Exploration
//!
//! With probability `exploration_rate` (learning enabled only) the vote is
//! skipped and a uniformly random expert is returned.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures_util::FutureExt;
use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::history::{DecisionHistory, DecisionRecord, StrategyVote};
use super::performance::{PerformanceConfig, PerformanceStrategy};
use super::simple::{FallbackStrategy, RandomStrategy};
use super::strategy::RoutingStrategy;
use super::types::{
    DECISION_ID_KEY, ExpertKind, Feedback, RequestContext, RoutingDecision, StrategyKind,
    StrategyWeight,
};
use super::vector::{VectorConfig, VectorStrategy};
use crate::config::{Config, EmbeddingConfig};
use crate::embedding::CachedEmbedder;
use crate::error::{Error, Result};

/// Step size of the learned-performance moving average
pub const LEARNING_RATE: f64 = 0.1;

/// Bounds of learned performance
pub const MIN_LEARNED_PERFORMANCE: f64 = 0.1;
pub const MAX_LEARNED_PERFORMANCE: f64 = 2.0;

/// Confidence reported for exploration decisions
pub const EXPLORATION_CONFIDENCE: f64 = 0.1;

/// Response time at which the latency penalty saturates, in seconds
const LATENCY_PENALTY_SECS: f64 = 10.0;

/// Settings for the adaptive router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Sub-strategies in voting order
    pub strategies: Vec<StrategyWeight>,
    pub fallback_expert: ExpertKind,
    pub exploration_rate: f64,
    pub enable_learning: bool,
    pub max_history: usize,
    /// Fixed seed for exploration and random strategies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            strategies: vec![
                StrategyWeight::new(StrategyKind::Vector, 0.7),
                StrategyWeight::new(StrategyKind::Performance, 0.3),
            ],
            fallback_expert: ExpertKind::Orchestrator,
            exploration_rate: 0.1,
            enable_learning: true,
            max_history: 1000,
            seed: None,
        }
    }
}

impl AdaptiveConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.exploration_rate.is_finite() || !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(Error::config(format!(
                "adaptive.exploration_rate must be between 0.0 and 1.0, got {}",
                self.exploration_rate
            )));
        }
        if self.max_history == 0 {
            return Err(Error::config("adaptive.max_history must be positive"));
        }

        let mut seen = Vec::with_capacity(self.strategies.len());
        for entry in &self.strategies {
            if !entry.weight.is_finite() || entry.weight < 0.0 {
                return Err(Error::config(format!(
                    "weight for strategy '{}' must be a non-negative number, got {}",
                    entry.kind, entry.weight
                )));
            }
            if seen.contains(&entry.kind) {
                return Err(Error::config(format!(
                    "strategy '{}' is configured more than once",
                    entry.kind
                )));
            }
            seen.push(entry.kind);
            validate_strategy_settings(entry)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RandomSettings {
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FallbackSettings {
    expert: Option<ExpertKind>,
    confidence: Option<f64>,
}

fn settings<T: DeserializeOwned>(entry: &StrategyWeight) -> Result<Option<T>> {
    entry
        .config
        .clone()
        .map(serde_json::from_value::<T>)
        .transpose()
        .map_err(|e| {
            Error::config(format!(
                "invalid settings for strategy '{}': {}",
                entry.kind, e
            ))
        })
}

fn validate_strategy_settings(entry: &StrategyWeight) -> Result<()> {
    match entry.kind {
        StrategyKind::Vector => {
            if let Some(config) = settings::<VectorConfig>(entry)? {
                config.validate()?;
            }
        }
        StrategyKind::Performance => {
            if let Some(config) = settings::<PerformanceConfig>(entry)? {
                config.validate()?;
            }
        }
        StrategyKind::Random => {
            settings::<RandomSettings>(entry)?;
        }
        StrategyKind::Fallback => {
            if let Some(FallbackSettings {
                confidence: Some(c),
                ..
            }) = settings::<FallbackSettings>(entry)?
            {
                if !(0.0..=1.0).contains(&c) {
                    return Err(Error::config(
                        "fallback strategy confidence must be between 0.0 and 1.0",
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Initialization state of the adaptive router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initializing,
            2 => Self::Ready,
            _ => Self::Uninitialized,
        }
    }
}

struct StrategySlot {
    name: String,
    weight: f64,
    strategy: Arc<dyn RoutingStrategy>,
}

/// Outcome of one sub-strategy call
enum Ballot {
    Vote(RoutingDecision),
    Abstain(String),
}

/// Combines sub-strategies by weighted vote and learns from feedback
pub struct AdaptiveStrategy {
    config: AdaptiveConfig,
    slots: Vec<StrategySlot>,
    learned: DashMap<String, f64>,
    history: Mutex<DecisionHistory>,
    rng: Mutex<StdRng>,
    state: AtomicU8,
    init_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for AdaptiveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveStrategy")
            .field("strategies", &self.strategy_names())
            .field("fallback_expert", &self.config.fallback_expert)
            .field("exploration_rate", &self.config.exploration_rate)
            .field("enable_learning", &self.config.enable_learning)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

/// Builder for creating an AdaptiveStrategy
pub struct AdaptiveStrategyBuilder {
    config: AdaptiveConfig,
    embedding: EmbeddingConfig,
    vector: VectorConfig,
    performance: PerformanceConfig,
    embedder: Option<Arc<CachedEmbedder>>,
    custom: Vec<(Arc<dyn RoutingStrategy>, f64)>,
}

impl Default for AdaptiveStrategyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveStrategyBuilder {
    pub fn new() -> Self {
        Self {
            config: AdaptiveConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector: VectorConfig::default(),
            performance: PerformanceConfig::default(),
            embedder: None,
            custom: Vec::new(),
        }
    }

    /// Set the adaptive configuration
    pub fn config(mut self, config: AdaptiveConfig) -> Self {
        self.config = config;
        self
    }

    /// Embedding settings used when the vector strategy builds its own client
    pub fn embedding_config(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Default vector settings, overridden by a strategy entry's own settings
    pub fn vector_config(mut self, config: VectorConfig) -> Self {
        self.vector = config;
        self
    }

    /// Default performance settings, overridden by a strategy entry's own settings
    pub fn performance_config(mut self, config: PerformanceConfig) -> Self {
        self.performance = config;
        self
    }

    /// Share an existing embedder with the vector strategy
    pub fn embedder(mut self, embedder: Arc<CachedEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Replace the configured strategy list
    pub fn strategies(mut self, strategies: Vec<StrategyWeight>) -> Self {
        self.config.strategies = strategies;
        self
    }

    /// Add a host-provided strategy, voting after the configured ones
    pub fn strategy(mut self, strategy: Arc<dyn RoutingStrategy>, weight: f64) -> Self {
        self.custom.push((strategy, weight));
        self
    }

    pub fn fallback_expert(mut self, expert: ExpertKind) -> Self {
        self.config.fallback_expert = expert;
        self
    }

    pub fn exploration_rate(mut self, rate: f64) -> Self {
        self.config.exploration_rate = rate;
        self
    }

    pub fn enable_learning(mut self, enabled: bool) -> Self {
        self.config.enable_learning = enabled;
        self
    }

    pub fn max_history(mut self, max_history: usize) -> Self {
        self.config.max_history = max_history;
        self
    }

    /// Fix the random seed (for reproducibility in tests)
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build the AdaptiveStrategy
    pub fn build(self) -> Result<AdaptiveStrategy> {
        self.config.validate()?;

        let mut embedder = self.embedder;
        let mut slots = Vec::with_capacity(self.config.strategies.len() + self.custom.len());

        for entry in &self.config.strategies {
            let strategy: Arc<dyn RoutingStrategy> = match entry.kind {
                StrategyKind::Vector => {
                    let vector = settings::<VectorConfig>(entry)?.unwrap_or_else(|| self.vector.clone());
                    vector.validate()?;
                    let shared = match &embedder {
                        Some(e) => Arc::clone(e),
                        None => {
                            let created = Arc::new(CachedEmbedder::from_config(&self.embedding)?);
                            embedder = Some(Arc::clone(&created));
                            created
                        }
                    };
                    Arc::new(
                        VectorStrategy::new(shared, vector)
                            .with_init_concurrency(self.embedding.init_concurrency),
                    )
                }
                StrategyKind::Performance => {
                    let performance = settings::<PerformanceConfig>(entry)?
                        .unwrap_or_else(|| self.performance.clone());
                    performance.validate()?;
                    Arc::new(PerformanceStrategy::new(performance))
                }
                StrategyKind::Random => {
                    let seed = settings::<RandomSettings>(entry)?
                        .and_then(|s| s.seed)
                        .or_else(|| self.config.seed.map(|s| s.wrapping_add(1)));
                    match seed {
                        Some(seed) => Arc::new(RandomStrategy::with_seed(seed)),
                        None => Arc::new(RandomStrategy::new()),
                    }
                }
                StrategyKind::Fallback => {
                    let s = settings::<FallbackSettings>(entry)?.unwrap_or_default();
                    let mut fallback =
                        FallbackStrategy::new(s.expert.unwrap_or(self.config.fallback_expert));
                    if let Some(confidence) = s.confidence {
                        fallback = fallback.with_confidence(confidence);
                    }
                    Arc::new(fallback)
                }
            };

            slots.push(StrategySlot {
                name: entry.strategy_name().to_string(),
                weight: entry.weight,
                strategy,
            });
        }

        for (strategy, weight) in self.custom {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::config(format!(
                    "weight for strategy '{}' must be a non-negative number, got {}",
                    strategy.name(),
                    weight
                )));
            }
            slots.push(StrategySlot {
                name: strategy.name().to_string(),
                weight,
                strategy,
            });
        }

        if slots.is_empty() {
            return Err(Error::config(
                "at least one routing strategy must be configured",
            ));
        }
        for (i, slot) in slots.iter().enumerate() {
            if slots[..i].iter().any(|s| s.name == slot.name) {
                return Err(Error::config(format!(
                    "strategy name '{}' is used more than once",
                    slot.name
                )));
            }
        }

        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let learned = slots.iter().map(|s| (s.name.clone(), 1.0)).collect();

        Ok(AdaptiveStrategy {
            history: Mutex::new(DecisionHistory::new(self.config.max_history)),
            config: self.config,
            slots,
            learned,
            rng: Mutex::new(rng),
            state: AtomicU8::new(Lifecycle::Uninitialized as u8),
            init_lock: tokio::sync::Mutex::new(()),
        })
    }
}

impl AdaptiveStrategy {
    pub fn builder() -> AdaptiveStrategyBuilder {
        AdaptiveStrategyBuilder::new()
    }

    /// Build from a full configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        AdaptiveStrategyBuilder::new()
            .config(config.adaptive.clone())
            .embedding_config(config.embedding.clone())
            .vector_config(config.vector.clone())
            .performance_config(config.performance.clone())
            .build()
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Sub-strategy names in voting order
    pub fn strategy_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }

    /// Current learned performance per sub-strategy
    pub fn learned_performance(&self) -> BTreeMap<String, f64> {
        self.learned
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.lock_history().map(|h| h.len()).unwrap_or(0)
    }

    /// Copy of a recorded decision
    pub fn decision(&self, id: Uuid) -> Option<DecisionRecord> {
        self.lock_history().ok()?.find(id).cloned()
    }

    /// Route with an upper bound on total time
    ///
    /// Outstanding sub-strategy calls are aborted when the deadline passes.
    pub async fn select_expert_with_deadline(
        &self,
        prompt: &str,
        context: Option<&RequestContext>,
        deadline: Duration,
    ) -> Result<RoutingDecision> {
        match tokio::time::timeout(deadline, self.decide(prompt, context)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline_ms = deadline.as_millis() as u64, "Routing deadline exceeded");
                Ok(self.interrupted("deadline_exceeded"))
            }
        }
    }

    /// Route until `token` is cancelled
    pub async fn select_expert_cancellable(
        &self,
        prompt: &str,
        context: Option<&RequestContext>,
        token: CancellationToken,
    ) -> Result<RoutingDecision> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Routing cancelled");
                Ok(self.interrupted("cancelled"))
            }
            result = self.decide(prompt, context) => result,
        }
    }

    fn interrupted(&self, reason: &str) -> RoutingDecision {
        RoutingDecision::fallback(self.config.fallback_expert, reason)
            .with_metadata(DECISION_ID_KEY, Uuid::new_v4().to_string())
    }

    fn lock_history(&self) -> Result<MutexGuard<'_, DecisionHistory>> {
        self.history
            .lock()
            .map_err(|_| Error::Other("decision history lock poisoned".to_string()))
    }

    fn learned_for(&self, name: &str) -> f64 {
        self.learned.get(name).map(|v| *v).unwrap_or(1.0)
    }

    fn record(&self, record: DecisionRecord) {
        if !self.config.enable_learning {
            return;
        }
        match self.lock_history() {
            Ok(mut history) => {
                let evicted = history.push(record);
                if evicted > 0 {
                    debug!(evicted, "Decision history full, dropped oldest record");
                }
            }
            Err(e) => warn!(error = %e, "Could not record decision"),
        }
    }

    /// Exploration draw; `None` means vote normally
    fn explore(&self) -> Option<ExpertKind> {
        if !self.config.enable_learning || self.config.exploration_rate <= 0.0 {
            return None;
        }
        let mut rng = self.rng.lock().ok()?;
        if rng.gen_bool(self.config.exploration_rate) {
            ExpertKind::ALL.choose(&mut *rng).copied()
        } else {
            None
        }
    }

    /// Run every sub-strategy concurrently, returning ballots in slot order
    async fn collect_ballots(&self, prompt: &str, context: Option<&RequestContext>) -> Vec<Ballot> {
        let prompt: Arc<str> = Arc::from(prompt);
        let context: Option<Arc<RequestContext>> = context.map(|c| Arc::new(c.clone()));

        let mut tasks = JoinSet::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let strategy = Arc::clone(&slot.strategy);
            let prompt = Arc::clone(&prompt);
            let context = context.clone();
            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(strategy.select_expert(&prompt, context.as_deref()))
                    .catch_unwind()
                    .await;
                (index, outcome)
            });
        }

        let mut ballots: Vec<Option<Ballot>> = (0..self.slots.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "Sub-strategy task failed to complete");
                    continue;
                }
            };
            let reason = match outcome {
                Ok(Ok(decision)) => {
                    ballots[index] = Some(Ballot::Vote(decision));
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "strategy panicked".to_string(),
            };
            let abstention = Error::StrategyAbstained {
                strategy: self.slots[index].name.clone(),
                reason,
            };
            warn!(error = %abstention, "Treating failed strategy as abstention");
            ballots[index] = Some(Ballot::Abstain(abstention.to_string()));
        }

        ballots
            .into_iter()
            .map(|b| b.unwrap_or_else(|| Ballot::Abstain("task did not complete".to_string())))
            .collect()
    }

    async fn decide(
        &self,
        prompt: &str,
        context: Option<&RequestContext>,
    ) -> Result<RoutingDecision> {
        self.initialize().await?;

        let decision_id = Uuid::new_v4();

        if let Some(expert) = self.explore() {
            debug!(expert = %expert, "Exploring random expert");
            self.record(DecisionRecord {
                id: decision_id,
                timestamp: Utc::now(),
                prompt: prompt.to_string(),
                selected_expert: expert,
                confidence: EXPLORATION_CONFIDENCE,
                strategy_used: "exploration".to_string(),
                votes: Vec::new(),
            });
            return Ok(
                RoutingDecision::new(expert, EXPLORATION_CONFIDENCE, "exploration")
                    .with_metadata("exploration", true)
                    .with_metadata(DECISION_ID_KEY, decision_id.to_string()),
            );
        }

        let ballots = self.collect_ballots(prompt, context).await;

        let mut tally: Vec<(ExpertKind, f64)> = Vec::new();
        let mut total_weight = 0.0;
        let mut votes = Vec::new();
        let mut strategies = Map::new();
        let mut abstentions = Map::new();

        for (slot, ballot) in self.slots.iter().zip(ballots) {
            let decision = match ballot {
                Ballot::Vote(decision) => decision,
                Ballot::Abstain(reason) => {
                    abstentions.insert(slot.name.clone(), Value::String(reason));
                    continue;
                }
            };

            let performance = self.learned_for(&slot.name);
            let adjusted = slot.weight * performance;
            total_weight += adjusted;

            let contribution = adjusted * decision.confidence;
            match tally.iter_mut().find(|(e, _)| *e == decision.expert) {
                Some((_, total)) => *total += contribution,
                None => tally.push((decision.expert, contribution)),
            }

            strategies.insert(
                slot.name.clone(),
                json!({
                    "expert": decision.expert,
                    "confidence": decision.confidence,
                    "weight": slot.weight,
                    "performance": performance,
                    "adjusted_weight": adjusted,
                }),
            );
            votes.push(StrategyVote {
                strategy: slot.name.clone(),
                expert: decision.expert,
                confidence: decision.confidence,
            });
        }

        if votes.is_empty() {
            warn!("All strategies failed, using fallback expert");
            return Ok(
                RoutingDecision::fallback(self.config.fallback_expert, "all_strategies_failed")
                    .with_metadata("abstentions", abstentions)
                    .with_metadata(DECISION_ID_KEY, decision_id.to_string()),
            );
        }

        let mut winner = tally[0];
        for candidate in &tally[1..] {
            if candidate.1 > winner.1 {
                winner = *candidate;
            }
        }
        let (expert, vote_total) = winner;
        let confidence = if total_weight > 0.0 {
            (vote_total / total_weight).min(1.0)
        } else {
            0.0
        };

        let decision = RoutingDecision::new(expert, confidence, self.name())
            .with_metadata("strategies", strategies)
            .with_metadata("selected_expert", expert.as_str())
            .with_metadata("confidence", confidence)
            .with_metadata("exploration_rate", self.config.exploration_rate)
            .with_metadata(DECISION_ID_KEY, decision_id.to_string());
        let decision = if abstentions.is_empty() {
            decision
        } else {
            decision.with_metadata("abstentions", abstentions)
        };

        self.record(DecisionRecord {
            id: decision_id,
            timestamp: Utc::now(),
            prompt: prompt.to_string(),
            selected_expert: expert,
            confidence: decision.confidence,
            strategy_used: decision.strategy_used.clone(),
            votes,
        });

        debug!(
            expert = %expert,
            confidence = decision.confidence,
            votes = tally.len(),
            "Adaptive routing decision"
        );

        Ok(decision)
    }

    /// Move learned performance toward the observed reward
    fn learn(&self, success: bool, response_time: f64, decision_id: Option<Uuid>) -> Result<()> {
        let votes = {
            let history = self.lock_history()?;
            let record = match decision_id {
                Some(id) => history.find(id),
                None => history.latest(),
            };
            match record {
                Some(record) => record.votes.clone(),
                None => {
                    debug!(?decision_id, "No recorded decision for feedback");
                    return Ok(());
                }
            }
        };

        let reward = reward(success, response_time);
        for vote in &votes {
            if let Some(mut performance) = self.learned.get_mut(&vote.strategy) {
                let updated = (1.0 - LEARNING_RATE) * *performance
                    + LEARNING_RATE * (reward * vote.confidence);
                *performance = updated.clamp(MIN_LEARNED_PERFORMANCE, MAX_LEARNED_PERFORMANCE);
            }
        }

        debug!(
            reward,
            strategies = votes.len(),
            "Updated learned strategy performance"
        );
        Ok(())
    }
}

/// Reward for one outcome: +1 or -1, minus a latency penalty capped at 1
pub fn reward(success: bool, response_time: f64) -> f64 {
    let base = if success { 1.0 } else { -1.0 };
    base - (response_time / LATENCY_PENALTY_SECS).min(1.0)
}

#[async_trait]
impl RoutingStrategy for AdaptiveStrategy {
    fn name(&self) -> &str {
        "adaptive"
    }

    async fn initialize(&self) -> Result<()> {
        if self.lifecycle() == Lifecycle::Ready {
            return Ok(());
        }

        let _guard = self.init_lock.lock().await;
        if self.lifecycle() == Lifecycle::Ready {
            return Ok(());
        }
        self.state
            .store(Lifecycle::Initializing as u8, Ordering::Release);

        let results = join_all(self.slots.iter().map(|slot| async move {
            let outcome = AssertUnwindSafe(slot.strategy.initialize())
                .catch_unwind()
                .await;
            (slot.name.as_str(), outcome)
        }))
        .await;

        for (name, outcome) in results {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(strategy = %name, error = %e, "Strategy failed to initialize"),
                Err(_) => warn!(strategy = %name, "Strategy panicked during initialization"),
            }
        }

        for slot in &self.slots {
            self.learned.entry(slot.name.clone()).or_insert(1.0);
        }

        self.state.store(Lifecycle::Ready as u8, Ordering::Release);
        info!(
            strategies = self.slots.len(),
            "Initialized adaptive routing"
        );
        Ok(())
    }

    async fn select_expert(
        &self,
        prompt: &str,
        context: Option<&RequestContext>,
    ) -> Result<RoutingDecision> {
        self.decide(prompt, context).await
    }

    async fn update_performance(
        &self,
        expert: ExpertKind,
        success: bool,
        response_time: f64,
        feedback: &Feedback,
    ) -> Result<()> {
        if !self.config.enable_learning {
            return Ok(());
        }
        self.initialize().await?;

        let response_time = if response_time.is_finite() && response_time >= 0.0 {
            response_time
        } else {
            warn!(expert = %expert, response_time, "Invalid response time, using 0");
            0.0
        };

        let results = join_all(self.slots.iter().map(|slot| async move {
            let outcome = AssertUnwindSafe(slot.strategy.update_performance(
                expert,
                success,
                response_time,
                feedback,
            ))
            .catch_unwind()
            .await;
            (slot.name.as_str(), outcome)
        }))
        .await;

        for (name, outcome) in results {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(strategy = %name, error = %e, "Strategy failed to record outcome"),
                Err(_) => warn!(strategy = %name, "Strategy panicked while recording outcome"),
            }
        }

        self.learn(success, response_time, feedback.decision_id)
    }

    fn strategy_state(&self) -> Value {
        let strategies: Map<String, Value> = self
            .slots
            .iter()
            .map(|slot| (slot.name.clone(), slot.strategy.strategy_state()))
            .collect();
        let weights: Map<String, Value> = self
            .slots
            .iter()
            .map(|slot| (slot.name.clone(), json!(slot.weight)))
            .collect();
        let (history_size, history_capacity, evicted) = self
            .lock_history()
            .map(|h| (h.len(), h.capacity(), h.evicted_total()))
            .unwrap_or((0, self.config.max_history, 0));

        json!({
            "strategy_name": self.name(),
            "lifecycle": self.lifecycle(),
            "strategies": strategies,
            "strategy_weights": weights,
            "strategy_performance": self.learned_performance(),
            "fallback_expert": self.config.fallback_expert,
            "enable_learning": self.config.enable_learning,
            "exploration_rate": self.config.exploration_rate,
            "decision_history_size": history_size,
            "decision_history_capacity": history_capacity,
            "decision_history_evicted": evicted,
        })
    }

    async fn shutdown(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;

        for slot in &self.slots {
            if let Err(e) = slot.strategy.shutdown().await {
                warn!(strategy = %slot.name, error = %e, "Strategy failed to shut down");
            }
        }

        self.state
            .store(Lifecycle::Uninitialized as u8, Ordering::Release);
        info!("Adaptive routing shut down");
        Ok(())
    }
}
