use async_trait::async_trait;

use crate::decision::types::TradingDecision;
use crate::execution::types::OrderExecutionResult;

/// Downstream order placement. Failures are reported through the result's
/// status rather than as an `Err`, so the relay loop never stops on them.
#[async_trait]
pub trait OrderExecutor: Send {
    async fn execute(&mut self, decision: &TradingDecision) -> OrderExecutionResult;
}
