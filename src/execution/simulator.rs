use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tracing::info;

use crate::config::PaperTradingConfig;
use crate::decision::types::{TradingAction, TradingDecision};
use crate::execution::executor::OrderExecutor;
use crate::execution::types::{ExecutionStatus, OrderExecutionResult};

pub struct PaperTradingSimulator {
    config: PaperTradingConfig,
    sequence: u64,
}

impl PaperTradingSimulator {
    pub fn new(config: PaperTradingConfig) -> Self {
        info!(
            "Paper trading simulator initialized with ${:.2} (fill rate {:.0}%)",
            config.initial_balance_usd,
            config.fill_rate * 100.0
        );

        Self { config, sequence: 0 }
    }

    fn next_order_id(&mut self) -> String {
        self.sequence += 1;
        format!("SIM-{}-{:06}", Utc::now().timestamp_millis(), self.sequence)
    }

    /// Simulate order execution
    pub fn simulate(&mut self, decision: &TradingDecision) -> OrderExecutionResult {
        let order_id = self.next_order_id();

        if decision.current_price <= 0.0 || !decision.current_price.is_finite() {
            return OrderExecutionResult::failed(order_id, decision, "invalid price");
        }

        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() >= self.config.fill_rate {
            info!("Order {} not filled (simulated rejection)", order_id);
            return OrderExecutionResult::failed(order_id, decision, "simulated rejection");
        }

        // Slippage always works against the order
        let slippage = rng.gen::<f64>() * self.config.slippage_pct;
        let execution_price = match decision.action {
            TradingAction::Sell => decision.current_price * (1.0 - slippage),
            _ => decision.current_price * (1.0 + slippage),
        };

        let notional = self.config.initial_balance_usd * decision.position_fraction;

        info!(
            "Order filled: {} {} ${:.2} notional @ ${:.4} (slippage: {:.3}%)",
            decision.action,
            decision.symbol,
            notional,
            execution_price,
            slippage * 100.0
        );

        OrderExecutionResult {
            order_id,
            symbol: decision.symbol.clone(),
            action: decision.action,
            execution_price,
            position_size: decision.position_fraction,
            execution_time: Utc::now(),
            status: ExecutionStatus::Filled,
            error_message: None,
        }
    }
}

#[async_trait]
impl OrderExecutor for PaperTradingSimulator {
    async fn execute(&mut self, decision: &TradingDecision) -> OrderExecutionResult {
        self.simulate(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::types::sample_decision;

    fn simulator(fill_rate: f64) -> PaperTradingSimulator {
        PaperTradingSimulator::new(PaperTradingConfig {
            fill_rate,
            slippage_pct: 0.01,
            initial_balance_usd: 10_000.0,
        })
    }

    #[test]
    fn test_fill_with_slippage_against_buyer() {
        let mut sim = simulator(1.0);
        let decision = sample_decision(TradingAction::Buy, 0.8, 0.2, 0.02);

        let result = sim.simulate(&decision);

        assert!(result.is_filled());
        assert_eq!(result.symbol, "BTC/USDT");
        assert_eq!(result.position_size, 0.02);
        assert!(result.execution_price >= 65_000.0);
        assert!(result.execution_price <= 65_000.0 * 1.01);
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_sell_fill_price_not_above_market() {
        let mut sim = simulator(1.0);
        let decision = sample_decision(TradingAction::Sell, 0.2, 0.8, 0.02);

        let result = sim.simulate(&decision);
        assert!(result.execution_price <= 65_000.0);
    }

    #[test]
    fn test_zero_fill_rate_always_fails() {
        let mut sim = simulator(0.0);
        let decision = sample_decision(TradingAction::Buy, 0.8, 0.2, 0.02);

        let result = sim.simulate(&decision);

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error_message.as_deref(), Some("simulated rejection"));
    }

    #[test]
    fn test_invalid_price_fails() {
        let mut sim = simulator(1.0);
        let mut decision = sample_decision(TradingAction::Buy, 0.8, 0.2, 0.02);
        decision.current_price = 0.0;

        let result = sim.simulate(&decision);
        assert_eq!(result.error_message.as_deref(), Some("invalid price"));
    }

    #[test]
    fn test_order_ids_are_unique() {
        let mut sim = simulator(1.0);
        let decision = sample_decision(TradingAction::Buy, 0.8, 0.2, 0.02);

        let first = sim.simulate(&decision).order_id;
        let second = sim.simulate(&decision).order_id;
        assert_ne!(first, second);
        assert!(first.starts_with("SIM-"));
    }
}
