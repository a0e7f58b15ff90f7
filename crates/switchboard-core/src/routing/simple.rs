//! Baseline strategies: uniform random and fixed fallback

use std::sync::Mutex;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};

use super::strategy::RoutingStrategy;
use super::types::{ExpertKind, RequestContext, RoutingDecision};
use crate::error::{Error, Result};

/// Confidence reported for random proposals
pub const RANDOM_CONFIDENCE: f64 = 0.1;

/// Proposes a uniformly random expert
pub struct RandomStrategy {
    rng: Mutex<StdRng>,
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomStrategy {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create with a fixed seed (for reproducibility in tests)
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl RoutingStrategy for RandomStrategy {
    fn name(&self) -> &str {
        "random"
    }

    async fn select_expert(
        &self,
        _prompt: &str,
        _context: Option<&RequestContext>,
    ) -> Result<RoutingDecision> {
        let expert = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| Error::Other("random strategy rng poisoned".to_string()))?;
            ExpertKind::ALL
                .choose(&mut *rng)
                .copied()
                .ok_or(Error::NoExpertsAvailable)?
        };

        Ok(RoutingDecision::new(expert, RANDOM_CONFIDENCE, self.name()))
    }
}

/// Always proposes the same expert
#[derive(Debug, Clone)]
pub struct FallbackStrategy {
    expert: ExpertKind,
    confidence: f64,
}

impl Default for FallbackStrategy {
    fn default() -> Self {
        Self::new(ExpertKind::Orchestrator)
    }
}

impl FallbackStrategy {
    pub fn new(expert: ExpertKind) -> Self {
        Self {
            expert,
            confidence: 0.5,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

#[async_trait]
impl RoutingStrategy for FallbackStrategy {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn select_expert(
        &self,
        _prompt: &str,
        _context: Option<&RequestContext>,
    ) -> Result<RoutingDecision> {
        Ok(RoutingDecision::new(self.expert, self.confidence, self.name()))
    }

    fn strategy_state(&self) -> Value {
        json!({
            "strategy_name": self.name(),
            "expert": self.expert,
            "confidence": self.confidence,
        })
    }
}
