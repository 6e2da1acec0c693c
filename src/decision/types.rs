use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingAction {
    Buy,
    Sell,
    Flat,
}

impl FromStr for TradingAction {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradingAction::Buy),
            "SELL" => Ok(TradingAction::Sell),
            "FLAT" => Ok(TradingAction::Flat),
            _ => Err(DecisionError::UnknownAction(s.to_string())),
        }
    }
}

impl fmt::Display for TradingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingAction::Buy => write!(f, "BUY"),
            TradingAction::Sell => write!(f, "SELL"),
            TradingAction::Flat => write!(f, "FLAT"),
        }
    }
}

/// A trading signal as received from the decision source.
///
/// Values are never mutated after construction; the risk policy builds a
/// new decision with an adjusted position fraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingDecision {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: TradingAction,
    pub probability_buy: f64,
    pub probability_sell: f64,
    pub current_price: f64,
    pub position_fraction: f64,
    pub atr_percent: f64,
    pub timeframe: Option<String>,
}

impl TradingDecision {
    pub fn confidence(&self) -> f64 {
        self.probability_buy.max(self.probability_sell)
    }

    pub fn is_flat(&self) -> bool {
        self.action == TradingAction::Flat
    }

    pub fn with_position_fraction(&self, position_fraction: f64) -> Self {
        Self {
            position_fraction,
            ..self.clone()
        }
    }

    pub fn ensure_valid(&self) -> Result<(), DecisionError> {
        if self.id.trim().is_empty() {
            return Err(DecisionError::MissingId);
        }
        if self.symbol.trim().is_empty() {
            return Err(DecisionError::MissingSymbol);
        }

        let unit = 0.0..=1.0;
        for (field, value) in [
            ("proba_buy", self.probability_buy),
            ("proba_sell", self.probability_sell),
            ("position_fraction", self.position_fraction),
        ] {
            if !unit.contains(&value) {
                return Err(DecisionError::OutOfRange { field, value });
            }
        }
        if self.current_price.is_nan() || self.current_price <= 0.0 {
            return Err(DecisionError::OutOfRange {
                field: "price",
                value: self.current_price,
            });
        }
        if self.atr_percent.is_nan() || self.atr_percent < 0.0 {
            return Err(DecisionError::OutOfRange {
                field: "atr_pct",
                value: self.atr_percent,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Decision has no id")]
    MissingId,

    #[error("Decision has no symbol")]
    MissingSymbol,

    #[error("Unknown action: {0:?}")]
    UnknownAction(String),

    #[error("Field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

#[cfg(test)]
pub(crate) fn sample_decision(action: TradingAction, buy: f64, sell: f64, fraction: f64) -> TradingDecision {
    TradingDecision {
        id: "1718000000000".to_string(),
        timestamp: Utc::now(),
        symbol: "BTC/USDT".to_string(),
        action,
        probability_buy: buy,
        probability_sell: sell,
        current_price: 65_000.0,
        position_fraction: fraction,
        atr_percent: 0.012,
        timeframe: Some("1h".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing_is_case_insensitive() {
        assert_eq!("buy".parse::<TradingAction>().unwrap(), TradingAction::Buy);
        assert_eq!(" Sell ".parse::<TradingAction>().unwrap(), TradingAction::Sell);
        assert_eq!("FLAT".parse::<TradingAction>().unwrap(), TradingAction::Flat);
        assert!(matches!(
            "HOLD".parse::<TradingAction>(),
            Err(DecisionError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_confidence_is_max_probability() {
        let decision = sample_decision(TradingAction::Sell, 0.3, 0.65, 0.1);
        assert_eq!(decision.confidence(), 0.65);
    }

    #[test]
    fn test_validity_requires_id_and_symbol() {
        let mut decision = sample_decision(TradingAction::Buy, 0.8, 0.2, 0.5);
        assert!(decision.ensure_valid().is_ok());

        decision.symbol = "  ".to_string();
        assert!(matches!(decision.ensure_valid(), Err(DecisionError::MissingSymbol)));

        decision.id = String::new();
        assert!(matches!(decision.ensure_valid(), Err(DecisionError::MissingId)));
    }

    #[test]
    fn test_validity_requires_values_in_range() {
        let base = sample_decision(TradingAction::Buy, 0.8, 0.2, 0.5);
        let cases: Vec<(&str, TradingDecision)> = vec![
            ("proba_buy", TradingDecision { probability_buy: 7.5, ..base.clone() }),
            ("proba_sell", TradingDecision { probability_sell: -3.0, ..base.clone() }),
            ("position_fraction", base.with_position_fraction(-0.5)),
            ("position_fraction", base.with_position_fraction(1.5)),
            ("price", TradingDecision { current_price: 0.0, ..base.clone() }),
            ("price", TradingDecision { current_price: f64::NAN, ..base.clone() }),
            ("atr_pct", TradingDecision { atr_percent: -1.0, ..base.clone() }),
        ];

        for (expected, decision) in cases {
            match decision.ensure_valid() {
                Err(DecisionError::OutOfRange { field, .. }) => assert_eq!(field, expected),
                other => panic!("{} accepted: {:?}", expected, other),
            }
        }

        let edges = TradingDecision {
            probability_buy: 1.0,
            probability_sell: 0.0,
            atr_percent: 0.0,
            ..base.with_position_fraction(0.0)
        };
        assert!(edges.ensure_valid().is_ok());
    }

    #[test]
    fn test_with_position_fraction_leaves_original_untouched() {
        let decision = sample_decision(TradingAction::Buy, 0.8, 0.2, 0.5);
        let adjusted = decision.with_position_fraction(0.02);

        assert_eq!(decision.position_fraction, 0.5);
        assert_eq!(adjusted.position_fraction, 0.02);
        assert_eq!(adjusted.id, decision.id);
    }
}
