use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::decision::types::{DecisionError, TradingAction, TradingDecision};

/// Envelope shared by every frame on the decision channel.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value, // Parsed once the type is known
}

#[derive(Debug)]
pub enum InboundMessage {
    TradingDecision(DecisionPayload),
    Status(StatusPayload),
    Error(String),
    Unknown(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DecisionId {
    Number(u64),
    Text(String),
}

impl DecisionId {
    fn into_string(self) -> String {
        match self {
            DecisionId::Number(n) => n.to_string(),
            DecisionId::Text(s) => s,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionPayload {
    #[serde(default, alias = "id")]
    pub decision_id: Option<DecisionId>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    pub prediction: Prediction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(alias = "action")]
    pub decision: String,
    #[serde(alias = "probability_buy")]
    pub proba_buy: f64,
    #[serde(alias = "probability_sell")]
    pub proba_sell: f64,
    pub position_fraction: f64,
    #[serde(alias = "current_price")]
    pub price: f64,
    #[serde(default, alias = "atr_percent")]
    pub atr_pct: f64,
    #[serde(default)]
    pub ts_utc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub connected: Option<bool>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub is_trading: Option<bool>,
    #[serde(default)]
    pub total_decisions: Option<u64>,
}

pub fn parse_frame(text: &str) -> Result<InboundMessage, DecisionError> {
    let raw: RawFrame = serde_json::from_str(text)?;

    match raw.kind.as_str() {
        "trading_decision" => Ok(InboundMessage::TradingDecision(serde_json::from_value(raw.data)?)),
        "status" => Ok(InboundMessage::Status(serde_json::from_value(raw.data)?)),
        "error" => Ok(InboundMessage::Error(error_message(raw.data))),
        _ => Ok(InboundMessage::Unknown(raw.kind)),
    }
}

fn error_message(data: Value) -> String {
    if let Some(message) = data.get("message").and_then(Value::as_str) {
        return message.to_string();
    }
    match data {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Accepts RFC 3339 as well as the naive ISO form the prediction service
/// emits (`datetime.now().isoformat()`), read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl TryFrom<DecisionPayload> for TradingDecision {
    type Error = DecisionError;

    fn try_from(payload: DecisionPayload) -> Result<Self, Self::Error> {
        let prediction = payload.prediction;

        let action: TradingAction = prediction.decision.parse()?;

        let symbol = payload
            .symbol
            .filter(|s| !s.trim().is_empty())
            .or(prediction.symbol)
            .unwrap_or_default();

        let timestamp = payload
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| prediction.ts_utc.as_deref().and_then(parse_timestamp))
            .unwrap_or_else(Utc::now);

        let decision = TradingDecision {
            id: payload.decision_id.map(DecisionId::into_string).unwrap_or_default(),
            timestamp,
            symbol,
            action,
            probability_buy: prediction.proba_buy,
            probability_sell: prediction.proba_sell,
            current_price: prediction.price,
            position_fraction: prediction.position_fraction,
            atr_percent: prediction.atr_pct,
            timeframe: prediction.timeframe,
        };

        decision.ensure_valid()?;
        Ok(decision)
    }
}

#[cfg(test)]
pub(crate) const SERVICE_FRAME: &str = r#"{
    "type": "trading_decision",
    "data": {
        "timestamp": "2024-06-10T12:00:00.123456",
        "symbol": "BTC/USDT",
        "decision_id": 1718000000000,
        "prediction": {
            "symbol": "BTC/USDT",
            "timeframe": "1h",
            "decision": "BUY",
            "proba_buy": 0.8,
            "proba_sell": 0.2,
            "position_fraction": 0.5,
            "price": 65000.0,
            "atr_pct": 0.012,
            "ts_utc": "2024-06-10T12:00:00+00:00"
        }
    }
}"#;
