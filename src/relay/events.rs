use crate::decision::types::TradingDecision;
use crate::decision::wire::StatusPayload;
use crate::execution::types::OrderExecutionResult;
use crate::relay::connection::ConnectionState;

/// Everything the relay reports to the outside world, in processing order.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    StateChanged(ConnectionState),
    StatusReceived(StatusPayload),
    DecisionReceived(TradingDecision),
    DecisionRejected { id: String, reason: String },
    OrderExecuted(OrderExecutionResult),
    UpstreamError(String),
    ReconnectExhausted { attempts: u32 },
}
