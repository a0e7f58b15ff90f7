//! Routing by observed expert performance
//!
//! Each expert gets a score in `[0, 1]` built from three weighted parts:
//!
//! - **Success rate**: the empirical rate once an expert has enough queries,
//!   otherwise a configured default
//! - **Latency**: `1 - min(avg, max_allowed) / max_allowed`
//! - **Freshness**: penalizes experts taking a large share of recent traffic
//!
//! The weighted sum is decayed by `decay_factor ^ days_since_last_use` and
//! clamped. The highest score wins; ties go to the expert with fewer queries.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::strategy::RoutingStrategy;
use super::types::{ExpertKind, FALLBACK_REASON_KEY, Feedback, RequestContext, RoutingDecision};
use crate::error::{Error, Result};

/// Tunable weights and defaults for performance scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub success_rate_weight: f64,
    pub response_time_weight: f64,
    pub recent_usage_weight: f64,
    /// Window for counting recent usage, in seconds
    pub recent_usage_window_secs: u64,
    /// Queries needed before the empirical success rate is trusted
    pub min_queries_for_confidence: u64,
    pub default_success_rate: f64,
    /// Seconds, used until an expert has a successful query
    pub default_response_time: f64,
    /// Seconds at which the latency score reaches zero
    pub max_allowed_response_time: f64,
    /// Per-day multiplier applied since last use
    pub decay_factor: f64,
    /// Cap on retained usage timestamps per expert
    pub max_recent_usage: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            success_rate_weight: 0.6,
            response_time_weight: 0.3,
            recent_usage_weight: 0.1,
            recent_usage_window_secs: 3600,
            min_queries_for_confidence: 5,
            default_success_rate: 0.8,
            default_response_time: 2.0,
            max_allowed_response_time: 10.0,
            decay_factor: 0.95,
            max_recent_usage: 10_000,
        }
    }
}

impl PerformanceConfig {
    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("success_rate_weight", self.success_rate_weight),
            ("response_time_weight", self.response_time_weight),
            ("recent_usage_weight", self.recent_usage_weight),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(Error::config(format!(
                    "performance.{} must be between 0.0 and 1.0, got {}",
                    name, weight
                )));
            }
        }
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total > 1.0 + 1e-9 {
            return Err(Error::config(format!(
                "performance weights must sum to at most 1.0, got {}",
                total
            )));
        }
        if !(0.0..=1.0).contains(&self.default_success_rate) {
            return Err(Error::config(
                "performance.default_success_rate must be between 0.0 and 1.0",
            ));
        }
        if !self.default_response_time.is_finite() || self.default_response_time < 0.0 {
            return Err(Error::config(
                "performance.default_response_time must be non-negative",
            ));
        }
        if !self.max_allowed_response_time.is_finite() || self.max_allowed_response_time <= 0.0 {
            return Err(Error::config(
                "performance.max_allowed_response_time must be positive",
            ));
        }
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(Error::config(
                "performance.decay_factor must be in (0.0, 1.0]",
            ));
        }
        if self.recent_usage_window_secs == 0 {
            return Err(Error::config(
                "performance.recent_usage_window_secs must be positive",
            ));
        }
        if self.max_recent_usage == 0 {
            return Err(Error::config("performance.max_recent_usage must be positive"));
        }
        Ok(())
    }

    fn window(&self) -> ChronoDuration {
        // Capped at about a century so `now - window` cannot overflow
        ChronoDuration::seconds(self.recent_usage_window_secs.min(3_153_600_000) as i64)
    }
}

/// Outcome statistics for one expert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_queries: u64,
    pub successful_queries: u64,
    /// Running mean over successful queries only, in seconds
    pub average_response_time: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl PerformanceMetrics {
    /// Empirical success rate, or `default` before any queries
    pub fn success_rate_or(&self, default: f64) -> f64 {
        if self.total_queries == 0 {
            default
        } else {
            self.successful_queries as f64 / self.total_queries as f64
        }
    }

    /// Record one outcome
    pub fn record(&mut self, success: bool, response_time: f64, now: DateTime<Utc>) {
        self.total_queries += 1;
        if success {
            self.successful_queries += 1;
            let n = self.successful_queries as f64;
            self.average_response_time += (response_time - self.average_response_time) / n;
        }
        self.last_used = Some(now);
    }
}

#[derive(Debug, Default)]
struct ExpertPerformance {
    metrics: PerformanceMetrics,
    recent_uses: VecDeque<DateTime<Utc>>,
}

impl ExpertPerformance {
    fn prune(&mut self, cutoff: DateTime<Utc>, cap: usize) {
        while self.recent_uses.front().is_some_and(|t| *t < cutoff) {
            self.recent_uses.pop_front();
        }
        while self.recent_uses.len() > cap {
            self.recent_uses.pop_front();
        }
    }

    fn recent_count(&self, cutoff: DateTime<Utc>) -> usize {
        self.recent_uses.iter().filter(|t| **t >= cutoff).count()
    }
}

/// Score one expert
///
/// `recent` is this expert's usage count within the window and `total_recent`
/// the count across all experts (zero is treated as one).
pub fn score_expert(
    config: &PerformanceConfig,
    metrics: &PerformanceMetrics,
    recent: usize,
    total_recent: usize,
    now: DateTime<Utc>,
) -> f64 {
    let success_rate = if metrics.total_queries >= config.min_queries_for_confidence {
        metrics.success_rate_or(config.default_success_rate)
    } else {
        config.default_success_rate
    };

    let response_time = if metrics.successful_queries > 0 {
        metrics.average_response_time
    } else {
        config.default_response_time
    };
    let max_allowed = config.max_allowed_response_time;
    let latency_score = 1.0 - response_time.min(max_allowed) / max_allowed;

    let total_recent = total_recent.max(1) as f64;
    let usage_ratio = recent as f64 / total_recent;
    let usage_score = 1.0 - (usage_ratio * 2.0).min(1.0);

    let mut score = config.success_rate_weight * success_rate
        + config.response_time_weight * latency_score
        + config.recent_usage_weight * usage_score;

    if let Some(last_used) = metrics.last_used {
        let days = (now - last_used).num_days().max(0);
        score *= config.decay_factor.powi(days.min(i32::MAX as i64) as i32);
    }

    score.clamp(0.0, 1.0)
}

/// Routes to the expert with the best observed track record
pub struct PerformanceStrategy {
    config: PerformanceConfig,
    registry: Vec<ExpertKind>,
    data: DashMap<ExpertKind, ExpertPerformance>,
    initialized: AtomicBool,
}

impl std::fmt::Debug for PerformanceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceStrategy")
            .field("config", &self.config)
            .field("experts", &self.data.len())
            .finish()
    }
}

impl Default for PerformanceStrategy {
    fn default() -> Self {
        Self::new(PerformanceConfig::default())
    }
}

impl PerformanceStrategy {
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            config,
            registry: ExpertKind::ALL.to_vec(),
            data: DashMap::new(),
            initialized: AtomicBool::new(false),
        }
    }

    /// Limit scoring to the given experts
    pub fn with_experts(mut self, experts: Vec<ExpertKind>) -> Self {
        self.registry = experts;
        self
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    /// Copy of every expert's metrics
    pub fn snapshot(&self) -> BTreeMap<ExpertKind, PerformanceMetrics> {
        self.data
            .iter()
            .map(|entry| (*entry.key(), entry.value().metrics.clone()))
            .collect()
    }

    /// Seed metrics, e.g. from a snapshot the host persisted
    pub fn restore(&self, metrics: BTreeMap<ExpertKind, PerformanceMetrics>) {
        for (expert, m) in metrics {
            self.data.entry(expert).or_default().metrics = m;
        }
        self.initialized.store(true, Ordering::Release);
        self.ensure_registered();
    }

    fn ensure_registered(&self) {
        for expert in &self.registry {
            self.data.entry(*expert).or_default();
        }
    }

    /// Scores for every known expert, in declaration order
    pub fn scores(&self) -> Vec<(ExpertKind, f64, u64)> {
        let now = Utc::now();
        let cutoff = now - self.config.window();

        let mut rows: Vec<(ExpertKind, PerformanceMetrics, usize)> = self
            .data
            .iter()
            .map(|entry| {
                (
                    *entry.key(),
                    entry.value().metrics.clone(),
                    entry.value().recent_count(cutoff),
                )
            })
            .collect();
        rows.sort_by_key(|(expert, _, _)| *expert);

        let total_recent: usize = rows.iter().map(|(_, _, recent)| recent).sum();

        rows.into_iter()
            .map(|(expert, metrics, recent)| {
                let score = score_expert(&self.config, &metrics, recent, total_recent, now);
                (expert, score, metrics.total_queries)
            })
            .collect()
    }
}

#[async_trait]
impl RoutingStrategy for PerformanceStrategy {
    fn name(&self) -> &str {
        "performance"
    }

    async fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        // Registration is idempotent, so racing callers may both run it
        self.ensure_registered();
        if !self.initialized.swap(true, Ordering::AcqRel) {
            info!(experts = self.data.len(), "Initialized performance routing");
        }
        Ok(())
    }

    async fn select_expert(
        &self,
        _prompt: &str,
        _context: Option<&RequestContext>,
    ) -> Result<RoutingDecision> {
        self.initialize().await?;

        let scores = self.scores();

        let mut best: Option<(ExpertKind, f64, u64)> = None;
        for candidate in &scores {
            let better = match best {
                None => true,
                Some((_, score, queries)) => {
                    candidate.1 > score || (candidate.1 == score && candidate.2 < queries)
                }
            };
            if better {
                best = Some(*candidate);
            }
        }

        let Some((expert, score, _)) = best else {
            warn!(error = %Error::NoExpertsAvailable, "Performance routing has no experts");
            return Ok(RoutingDecision::new(ExpertKind::Orchestrator, 0.0, self.name())
                .with_metadata(FALLBACK_REASON_KEY, "no_experts_available"));
        };

        let score_map: Map<String, Value> = scores
            .iter()
            .map(|(e, s, _)| (e.to_string(), json!(s)))
            .collect();

        debug!(expert = %expert, score, "Performance routing decision");

        Ok(RoutingDecision::new(expert, score, self.name())
            .with_metadata("scores", score_map)
            .with_metadata("selected_expert", expert.as_str())
            .with_metadata("selected_score", score))
    }

    async fn update_performance(
        &self,
        expert: ExpertKind,
        success: bool,
        response_time: f64,
        _feedback: &Feedback,
    ) -> Result<()> {
        let response_time = if response_time.is_finite() && response_time >= 0.0 {
            response_time
        } else {
            warn!(expert = %expert, response_time, "Invalid response time, recording as 0");
            0.0
        };

        let now = Utc::now();
        let cutoff = now - self.config.window();
        {
            let mut entry = self.data.entry(expert).or_default();
            entry.metrics.record(success, response_time, now);
            entry.recent_uses.push_back(now);
            entry.prune(cutoff, self.config.max_recent_usage);
        }

        debug!(expert = %expert, success, response_time, "Updated expert performance");
        Ok(())
    }

    fn strategy_state(&self) -> Value {
        let cutoff = Utc::now() - self.config.window();
        let expert_stats: BTreeMap<String, Value> = self
            .data
            .iter()
            .map(|entry| {
                let m = &entry.value().metrics;
                (
                    entry.key().to_string(),
                    json!({
                        "total_queries": m.total_queries,
                        "successful_queries": m.successful_queries,
                        "success_rate": m.success_rate_or(self.config.default_success_rate),
                        "avg_response_time": m.average_response_time,
                        "last_used": m.last_used,
                        "recent_uses": entry.value().recent_count(cutoff),
                    }),
                )
            })
            .collect();

        json!({
            "strategy_name": self.name(),
            "num_experts": self.data.len(),
            "config": self.config,
            "expert_stats": expert_stats,
        })
    }
}
