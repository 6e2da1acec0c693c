use crate::config::RiskConfig;
use crate::decision::types::TradingDecision;
use tracing::debug;

/// Position-size and confidence policy applied to every inbound decision.
#[derive(Debug, Clone)]
pub struct RiskPolicy {
    config: RiskConfig,
}

impl RiskPolicy {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Clamp, scale by confidence, then floor the position fraction.
    ///
    /// 1. clamp to `max_position_size`
    /// 2. scale by `min(confidence / min_confidence_threshold, 1)`
    /// 3. floor at `min_position_size`
    ///
    /// With risk management disabled the decision comes back unchanged.
    pub fn apply(&self, decision: &TradingDecision) -> TradingDecision {
        if !self.config.enabled {
            return decision.clone();
        }

        let clamped = decision.position_fraction.min(self.config.max_position_size);
        let scale = (decision.confidence() / self.config.min_confidence_threshold).min(1.0);
        let adjusted = (clamped * scale).max(self.config.min_position_size);

        debug!(
            "Risk adjustment for {}: {:.4} -> {:.4} (scale {:.3})",
            decision.id, decision.position_fraction, adjusted, scale
        );

        decision.with_position_fraction(adjusted)
    }

    /// Check an adjusted decision against the confidence and size limits.
    pub fn validate(&self, decision: &TradingDecision) -> Result<(), RiskRejection> {
        let confidence = decision.confidence();
        if confidence < self.config.min_confidence_threshold {
            return Err(RiskRejection::LowConfidence {
                confidence,
                threshold: self.config.min_confidence_threshold,
            });
        }

        if decision.position_fraction > self.config.max_position_size {
            return Err(RiskRejection::PositionTooLarge {
                fraction: decision.position_fraction,
                max: self.config.max_position_size,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskRejection {
    #[error("Confidence {confidence:.3} below threshold {threshold:.3}")]
    LowConfidence { confidence: f64, threshold: f64 },

    #[error("Position fraction {fraction:.4} exceeds maximum {max:.4}")]
    PositionTooLarge { fraction: f64, max: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::types::{sample_decision, TradingAction};

    fn risk_config() -> RiskConfig {
        RiskConfig {
            enabled: true,
            max_position_size: 0.02,
            min_position_size: 0.001,
            min_confidence_threshold: 0.6,
        }
    }

    fn policy() -> RiskPolicy {
        RiskPolicy::new(risk_config())
    }

    #[test]
    fn test_confident_buy_is_clamped_and_valid() {
        // 0.5 clamps to 0.02, scale = min(0.8 / 0.6, 1) = 1
        let policy = policy();
        let decision = sample_decision(TradingAction::Buy, 0.8, 0.2, 0.5);

        let adjusted = policy.apply(&decision);

        assert!((adjusted.position_fraction - 0.02).abs() < 1e-12);
        assert!(policy.validate(&adjusted).is_ok());
    }

    #[test]
    fn test_weak_confidence_scales_down() {
        // 0.02 * (0.45 / 0.6) = 0.015
        let policy = policy();
        let decision = sample_decision(TradingAction::Sell, 0.3, 0.45, 0.3);

        let adjusted = policy.apply(&decision);

        assert!((adjusted.position_fraction - 0.015).abs() < 1e-9);
        assert_eq!(
            policy.validate(&adjusted),
            Err(RiskRejection::LowConfidence { confidence: 0.45, threshold: 0.6 })
        );
    }

    #[test]
    fn test_small_fraction_floored_at_minimum() {
        let policy = policy();
        let decision = sample_decision(TradingAction::Buy, 0.9, 0.1, 0.0001);

        assert_eq!(policy.apply(&decision).position_fraction, 0.001);
    }

    #[test]
    fn test_low_confidence_never_valid() {
        let policy = policy();
        for confidence in [0.0, 0.2, 0.45, 0.5999] {
            for fraction in [0.0, 0.01, 0.02] {
                let decision = sample_decision(TradingAction::Buy, confidence, confidence / 2.0, fraction);
                assert!(policy.validate(&decision).is_err());
                assert!(policy.validate(&policy.apply(&decision)).is_err());
            }
        }
    }

    #[test]
    fn test_adjusted_fraction_never_exceeds_maximum() {
        let policy = policy();
        for fraction in [0.0, 0.001, 0.019, 0.02, 0.021, 0.5, 1.0] {
            for buy in [0.1, 0.6, 0.99] {
                let decision = sample_decision(TradingAction::Buy, buy, 1.0 - buy, fraction);
                assert!(policy.apply(&decision).position_fraction <= 0.02);
            }
        }
    }

    #[test]
    fn test_disabled_policy_passes_through() {
        let mut config = risk_config();
        config.enabled = false;
        let policy = RiskPolicy::new(config);
        let decision = sample_decision(TradingAction::Buy, 0.8, 0.2, 0.5);

        let adjusted = policy.apply(&decision);

        assert_eq!(adjusted, decision);
        assert!(matches!(
            policy.validate(&adjusted),
            Err(RiskRejection::PositionTooLarge { .. })
        ));
    }
}
