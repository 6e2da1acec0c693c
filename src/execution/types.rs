use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::decision::types::{TradingAction, TradingDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Filled,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Filled => write!(f, "FILLED"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Outcome of a single order placement. Built once by the executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderExecutionResult {
    pub order_id: String,
    pub symbol: String,
    pub action: TradingAction,
    pub execution_price: f64,
    pub position_size: f64,
    pub execution_time: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
}

impl OrderExecutionResult {
    pub fn failed(order_id: String, decision: &TradingDecision, reason: &str) -> Self {
        Self {
            order_id,
            symbol: decision.symbol.clone(),
            action: decision.action,
            execution_price: 0.0,
            position_size: decision.position_fraction,
            execution_time: Utc::now(),
            status: ExecutionStatus::Failed,
            error_message: Some(reason.to_string()),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.status == ExecutionStatus::Filled
    }
}
