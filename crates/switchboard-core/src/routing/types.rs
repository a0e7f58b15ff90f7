//! Types shared by every routing strategy
//!
//! This module defines the closed set of experts, the decision record every
//! strategy returns, and the configuration entries used to assemble the
//! adaptive router.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;

/// Free-form request context passed alongside a prompt
pub type RequestContext = Map<String, Value>;

/// Diagnostic metadata attached to a routing decision
pub type Metadata = Map<String, Value>;

/// Metadata key under which adaptive decisions carry their identifier
pub const DECISION_ID_KEY: &str = "decision_id";

/// Metadata key describing why a fallback expert was chosen
pub const FALLBACK_REASON_KEY: &str = "fallback_reason";

/// The closed set of expert handlers a request can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertKind {
    /// Market regime detection and classification
    MarketRegime,
    /// Options order flow and unusual activity
    OptionsFlow,
    /// Market and investor sentiment
    Sentiment,
    /// Multi-expert coordination for broad requests
    Orchestrator,
    /// Volatility surfaces and volatility regimes
    Volatility,
    /// Liquidity, spreads, and market depth
    Liquidity,
    /// Risk assessment and position sizing
    Risk,
    /// Trade execution quality and timing
    Execution,
}

impl ExpertKind {
    /// Every expert, in declaration order
    pub const ALL: [ExpertKind; 8] = [
        Self::MarketRegime,
        Self::OptionsFlow,
        Self::Sentiment,
        Self::Orchestrator,
        Self::Volatility,
        Self::Liquidity,
        Self::Risk,
        Self::Execution,
    ];

    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketRegime => "market_regime",
            Self::OptionsFlow => "options_flow",
            Self::Sentiment => "sentiment",
            Self::Orchestrator => "orchestrator",
            Self::Volatility => "volatility",
            Self::Liquidity => "liquidity",
            Self::Risk => "risk",
            Self::Execution => "execution",
        }
    }
}

impl std::fmt::Display for ExpertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExpertKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == normalized)
            .ok_or_else(|| Error::UnknownExpert(s.to_string()))
    }
}

/// Result of a routing decision
///
/// Confidence is a relative score, not a probability, but always lies in
/// `[0, 1]`. Degraded decisions have the same shape as normal ones and are
/// only distinguishable through their metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected expert
    pub expert: ExpertKind,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f64,
    /// Name of the strategy (or mode) that produced this decision
    pub strategy_used: String,
    /// Diagnostic values for observability
    pub metadata: Metadata,
}

impl RoutingDecision {
    /// Create a new routing decision, clamping confidence into `[0, 1]`
    pub fn new(expert: ExpertKind, confidence: f64, strategy_used: impl Into<String>) -> Self {
        Self {
            expert,
            confidence: clamp_unit(confidence),
            strategy_used: strategy_used.into(),
            metadata: Metadata::new(),
        }
    }

    /// A zero-confidence fallback decision with a recorded reason
    pub fn fallback(expert: ExpertKind, reason: impl Into<String>) -> Self {
        Self::new(expert, 0.0, "fallback").with_metadata(FALLBACK_REASON_KEY, reason.into())
    }

    /// Attach a metadata value
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a metadata value
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Identifier of the adaptive decision, if one was assigned
    pub fn decision_id(&self) -> Option<Uuid> {
        self.metadata
            .get(DECISION_ID_KEY)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Why a fallback expert was chosen, if it was
    pub fn fallback_reason(&self) -> Option<&str> {
        self.metadata.get(FALLBACK_REASON_KEY).and_then(Value::as_str)
    }

    /// Whether this decision came from random exploration
    pub fn is_exploration(&self) -> bool {
        self.metadata
            .get("exploration")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Clamp a score into `[0, 1]`, mapping NaN to 0
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Kinds of routing strategies the adaptive router can combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Semantic similarity against expert profile embeddings
    Vector,
    /// Decayed historical success and latency statistics
    Performance,
    /// Uniformly random proposals
    Random,
    /// Always proposes the fallback expert
    Fallback,
}

impl StrategyKind {
    /// Stable lowercase name, also used as the strategy's key in the router
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Performance => "performance",
            Self::Random => "random",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vector" => Ok(Self::Vector),
            "performance" => Ok(Self::Performance),
            "random" => Ok(Self::Random),
            "fallback" => Ok(Self::Fallback),
            _ => Err(Error::config(format!("Unknown strategy kind: {}", s))),
        }
    }
}

/// Prior weight and settings for one strategy in the adaptive router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeight {
    /// Which strategy to build
    pub kind: StrategyKind,
    /// Prior influence of the strategy's votes (must be >= 0)
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Strategy-specific settings, interpreted by the strategy factory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

fn default_weight() -> f64 {
    1.0
}

impl StrategyWeight {
    /// Create a weight entry without extra settings
    pub fn new(kind: StrategyKind, weight: f64) -> Self {
        Self {
            kind,
            weight,
            config: None,
        }
    }

    /// Attach strategy-specific settings
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Name the strategy is registered under
    pub fn strategy_name(&self) -> &'static str {
        self.kind.as_str()
    }
}

/// Extra information accompanying an outcome report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// The adaptive decision this outcome belongs to, if the host tracked it
    pub decision_id: Option<Uuid>,
    /// Any additional host-defined values
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl Feedback {
    /// Feedback tied to a specific decision
    pub fn for_decision(decision: &RoutingDecision) -> Self {
        Self {
            decision_id: decision.decision_id(),
            extra: Map::new(),
        }
    }

    /// Attach an extra value
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expert_kind_round_trip_names() {
        for expert in ExpertKind::ALL {
            let parsed: ExpertKind = expert.as_str().parse().unwrap();
            assert_eq!(parsed, expert);
        }
        assert_eq!(
            "Options Flow".parse::<ExpertKind>().unwrap(),
            ExpertKind::OptionsFlow
        );
        assert_eq!(
            "market-regime".parse::<ExpertKind>().unwrap(),
            ExpertKind::MarketRegime
        );
        assert!("weather".parse::<ExpertKind>().is_err());
    }

    #[test]
    fn test_expert_kind_serde_snake_case() {
        let json = serde_json::to_string(&ExpertKind::OptionsFlow).unwrap();
        assert_eq!(json, "\"options_flow\"");
    }

    #[test]
    fn test_decision_confidence_is_clamped() {
        assert_eq!(
            RoutingDecision::new(ExpertKind::Risk, 1.7, "test").confidence,
            1.0
        );
        assert_eq!(
            RoutingDecision::new(ExpertKind::Risk, -0.3, "test").confidence,
            0.0
        );
        assert_eq!(
            RoutingDecision::new(ExpertKind::Risk, f64::NAN, "test").confidence,
            0.0
        );
    }

    #[test]
    fn test_fallback_decision_shape() {
        let decision = RoutingDecision::fallback(ExpertKind::Orchestrator, "all_strategies_failed");
        assert_eq!(decision.expert, ExpertKind::Orchestrator);
        assert_eq!(decision.confidence, 0.0);
        assert_eq!(decision.strategy_used, "fallback");
        assert_eq!(decision.fallback_reason(), Some("all_strategies_failed"));
        assert!(!decision.is_exploration());
    }

    #[test]
    fn test_decision_id_from_metadata() {
        let id = Uuid::new_v4();
        let decision = RoutingDecision::new(ExpertKind::Sentiment, 0.5, "adaptive")
            .with_metadata(DECISION_ID_KEY, id.to_string());
        assert_eq!(decision.decision_id(), Some(id));

        let feedback = Feedback::for_decision(&decision).with_extra("source", "test");
        assert_eq!(feedback.decision_id, Some(id));
        assert_eq!(feedback.extra["source"], "test");
    }

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!(
            "VECTOR".parse::<StrategyKind>().unwrap(),
            StrategyKind::Vector
        );
        assert_eq!(
            "performance".parse::<StrategyKind>().unwrap(),
            StrategyKind::Performance
        );
        assert!("neural".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_strategy_weight_deserialize_defaults() {
        let weight: StrategyWeight = serde_json::from_str(r#"{"kind": "random"}"#).unwrap();
        assert_eq!(weight.kind, StrategyKind::Random);
        assert_eq!(weight.weight, 1.0);
        assert!(weight.config.is_none());
        assert_eq!(weight.strategy_name(), "random");
    }
}
