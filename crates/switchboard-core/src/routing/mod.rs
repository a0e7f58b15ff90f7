//! Expert routing with adaptive strategy combination
//!
//! This module decides which expert handler should answer a request.
//! The key components are:
//!
//! - **Vector strategy**: embeds the prompt and picks the expert whose profile
//!   is semantically closest, falling back to the orchestrator below a
//!   similarity threshold.
//!
//! - **Performance strategy**: scores experts from decayed success, latency
//!   and recent-usage statistics.
//!
//! - **Adaptive strategy**: runs the others concurrently, combines their votes
//!   with learned per-strategy weights and occasionally explores.
//!
//! ## How It Works
//!
//! 1. The host calls `select_expert` with a prompt
//! 2. Sub-strategies vote concurrently; failures abstain
//! 3. The weighted vote picks an expert, tagged with a `decision_id`
//! 4. After the expert answers, the host reports the outcome and the router
//!    adjusts how much it trusts each strategy
//!
//! ## Example
//!
//! ```rust,ignore
//! use switchboard_core::config::Config;
//! use switchboard_core::routing::{AdaptiveStrategy, Feedback, RoutingStrategy};
//!
//! let router = AdaptiveStrategy::from_config(&Config::load()?)?;
//!
//! let decision = router.select_expert("Is there unusual put buying in SPY?", None).await?;
//!
//! // Dispatch to decision.expert...
//!
//! router
//!     .update_performance(decision.expert, true, 1.4, &Feedback::for_decision(&decision))
//!     .await?;
//! ```

mod adaptive;
mod history;
mod performance;
mod simple;
mod strategy;
mod types;
mod vector;

pub use adaptive::{
    AdaptiveConfig, AdaptiveStrategy, AdaptiveStrategyBuilder, EXPLORATION_CONFIDENCE,
    LEARNING_RATE, Lifecycle, MAX_LEARNED_PERFORMANCE, MIN_LEARNED_PERFORMANCE, reward,
};
pub use history::{DecisionHistory, DecisionRecord, StrategyVote};
pub use performance::{PerformanceConfig, PerformanceMetrics, PerformanceStrategy, score_expert};
pub use simple::{FallbackStrategy, RANDOM_CONFIDENCE, RandomStrategy};
pub use strategy::RoutingStrategy;
pub use types::{
    DECISION_ID_KEY, ExpertKind, FALLBACK_REASON_KEY, Feedback, Metadata, RequestContext,
    RoutingDecision, StrategyKind, StrategyWeight,
};
pub use vector::{ExpertProfile, VectorConfig, VectorStrategy, cosine_similarity};
