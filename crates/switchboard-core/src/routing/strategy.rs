//! The contract shared by every routing strategy

use async_trait::async_trait;
use serde_json::Value;

use super::types::{ExpertKind, Feedback, RequestContext, RoutingDecision};
use crate::error::Result;

/// A strategy that proposes an expert for a prompt
///
/// Implementations must be safe to call concurrently once `initialize` has
/// completed. The adaptive router treats any `Err` (or panic) from
/// `select_expert` as an abstention for that request.
#[async_trait]
pub trait RoutingStrategy: Send + Sync {
    /// Name used in logs, metadata, and as the key for learned weights
    fn name(&self) -> &str;

    /// Prepare any resources the strategy needs; repeated calls are no-ops
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Select the best expert for the given prompt
    async fn select_expert(
        &self,
        prompt: &str,
        context: Option<&RequestContext>,
    ) -> Result<RoutingDecision>;

    /// Record the observed outcome of routing to `expert`
    async fn update_performance(
        &self,
        _expert: ExpertKind,
        _success: bool,
        _response_time: f64,
        _feedback: &Feedback,
    ) -> Result<()> {
        Ok(())
    }

    /// Read-only diagnostic snapshot
    fn strategy_state(&self) -> Value {
        serde_json::json!({ "strategy_name": self.name() })
    }

    /// Release resources; the strategy may be initialized again afterwards
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
