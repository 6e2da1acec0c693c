use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::decision::types::TradingAction;
use crate::decision::wire::StatusPayload;
use crate::monitoring::logger::CsvLogger;
use crate::relay::{ConnectionState, RelayEvent};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayStats {
    pub decisions_received: u64,
    pub buy_decisions: u64,
    pub sell_decisions: u64,
    pub flat_decisions: u64,
    pub decisions_rejected: u64,
    pub last_rejection: Option<(String, String)>,
    pub orders_executed: u64,
    pub orders_filled: u64,
    pub orders_failed: u64,
    pub upstream_errors: u64,
    pub connections: u64,
    pub connection_state: Option<ConnectionState>,
    pub last_status: Option<StatusPayload>,
    pub reconnect_exhausted: bool,
}

impl RelayStats {
    pub fn record(&mut self, event: &RelayEvent) {
        match event {
            RelayEvent::StateChanged(state) => {
                if *state == ConnectionState::Connected {
                    self.connections += 1;
                }
                self.connection_state = Some(*state);
            }
            RelayEvent::StatusReceived(status) => self.last_status = Some(status.clone()),
            RelayEvent::DecisionReceived(decision) => {
                self.decisions_received += 1;
                match decision.action {
                    TradingAction::Buy => self.buy_decisions += 1,
                    TradingAction::Sell => self.sell_decisions += 1,
                    TradingAction::Flat => self.flat_decisions += 1,
                }
            }
            RelayEvent::DecisionRejected { id, reason } => {
                self.decisions_rejected += 1;
                self.last_rejection = Some((id.clone(), reason.clone()));
            }
            RelayEvent::OrderExecuted(result) => {
                self.orders_executed += 1;
                if result.is_filled() {
                    self.orders_filled += 1;
                } else {
                    self.orders_failed += 1;
                }
            }
            RelayEvent::UpstreamError(_) => self.upstream_errors += 1,
            RelayEvent::ReconnectExhausted { .. } => self.reconnect_exhausted = true,
        }
    }

    pub fn fill_rate(&self) -> Option<f64> {
        if self.orders_executed == 0 {
            return None;
        }
        Some(self.orders_filled as f64 / self.orders_executed as f64)
    }

    pub fn log_summary(&self) {
        info!(
            "📊 Decisions: {} received ({} BUY / {} SELL / {} FLAT), {} rejected",
            self.decisions_received,
            self.buy_decisions,
            self.sell_decisions,
            self.flat_decisions,
            self.decisions_rejected
        );
        if let Some((id, reason)) = &self.last_rejection {
            let id = if id.is_empty() { "<unparsed>" } else { id.as_str() };
            info!("📊 Last rejection: {} ({})", id, reason);
        }
        info!(
            "📊 Orders: {} executed, {} filled, {} failed (fill rate {})",
            self.orders_executed,
            self.orders_filled,
            self.orders_failed,
            self.fill_rate()
                .map(|r| format!("{:.1}%", r * 100.0))
                .unwrap_or_else(|| "n/a".to_string())
        );
        info!(
            "📊 Connections: {}, upstream errors: {}, last state: {}",
            self.connections,
            self.upstream_errors,
            self.connection_state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "never connected".to_string())
        );
        if let Some(status) = &self.last_status {
            info!(
                "📊 Last source status: trading={:?}, total decisions={:?}",
                status.is_trading, status.total_decisions
            );
        }
        if self.reconnect_exhausted {
            warn!("Relay gave up reconnecting during this run");
        }
    }
}

/// Consume relay events until every sender is dropped, then log a summary.
pub async fn run_monitor(
    mut events: mpsc::UnboundedReceiver<RelayEvent>,
    csv: Option<CsvLogger>,
) -> RelayStats {
    let mut stats = RelayStats::default();

    while let Some(event) = events.recv().await {
        if let (Some(csv), RelayEvent::OrderExecuted(result)) = (&csv, &event) {
            if let Err(e) = csv.log_execution(result) {
                warn!("Failed to write execution log: {}", e);
            }
        }
        stats.record(&event);
    }

    stats.log_summary();
    stats
}
