use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub paper_trading: PaperTradingConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    /// Upper bound on a single executor call. Unset means no timeout.
    #[serde(default)]
    pub execution_timeout_ms: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            execution_timeout_ms: None,
        }
    }
}

impl RelayConfig {
    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_position_size")]
    pub max_position_size: f64,
    #[serde(default = "default_min_position_size")]
    pub min_position_size: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_position_size: default_max_position_size(),
            min_position_size: default_min_position_size(),
            min_confidence_threshold: default_min_confidence(),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_confidence_threshold > 0.0 && self.min_confidence_threshold <= 1.0) {
            bail!(
                "risk.min_confidence_threshold must be in (0, 1], got {}",
                self.min_confidence_threshold
            );
        }
        for (name, value) in [
            ("max_position_size", self.max_position_size),
            ("min_position_size", self.min_position_size),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("risk.{} must be in [0, 1], got {}", name, value);
            }
        }
        if self.min_position_size > self.max_position_size {
            bail!(
                "risk.min_position_size ({}) exceeds risk.max_position_size ({})",
                self.min_position_size,
                self.max_position_size
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperTradingConfig {
    #[serde(default = "default_fill_rate")]
    pub fill_rate: f64,
    #[serde(default = "default_slippage")]
    pub slippage_pct: f64,
    #[serde(default = "default_balance")]
    pub initial_balance_usd: f64,
}

impl Default for PaperTradingConfig {
    fn default() -> Self {
        Self {
            fill_rate: default_fill_rate(),
            slippage_pct: default_slippage(),
            initial_balance_usd: default_balance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_logging: bool,
    #[serde(default = "default_csv_path")]
    pub csv_log_path: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            csv_logging: false,
            csv_log_path: default_csv_path(),
        }
    }
}

fn default_uri() -> String { "ws://localhost:8000/ws".to_string() }
fn default_initial_delay_ms() -> u64 { 1_000 }
fn default_max_delay_ms() -> u64 { 10_000 }
fn default_max_attempts() -> u32 { 5 }
fn default_true() -> bool { true }
fn default_max_position_size() -> f64 { 0.02 }
fn default_min_position_size() -> f64 { 0.001 }
fn default_min_confidence() -> f64 { 0.6 }
fn default_fill_rate() -> f64 { 1.0 }
fn default_slippage() -> f64 { 0.0005 }
fn default_balance() -> f64 { 10_000.0 }
fn default_csv_path() -> String { "executions.csv".to_string() }

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub config_path: String,
    pub decision_ws_url: Option<String>,
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            tracing::warn!("Config file {} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.risk.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(url) = &env.decision_ws_url {
            self.relay.uri = url.clone();
        }
    }
}

impl EnvConfig {
    pub fn load() -> Self {
        dotenv::dotenv().ok();

        Self {
            config_path: std::env::var("RELAY_CONFIG")
                .unwrap_or_else(|_| "config.toml".to_string()),
            decision_ws_url: std::env::var("DECISION_WS_URL").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.relay.uri, "ws://localhost:8000/ws");
        assert_eq!(config.reconnect.initial_delay_ms, 1_000);
        assert_eq!(config.reconnect.max_delay_ms, 10_000);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert!(config.risk.enabled);
        assert!(config.relay.execution_timeout().is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [relay]
            uri = "ws://10.0.0.5:9000/ws"
            execution_timeout_ms = 250

            [risk]
            max_position_size = 0.05
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.uri, "ws://10.0.0.5:9000/ws");
        assert_eq!(config.relay.execution_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.risk.max_position_size, 0.05);
        assert_eq!(config.risk.min_confidence_threshold, 0.6);
    }

    #[test]
    fn test_rejects_zero_confidence_threshold() {
        let err = Config::parse("[risk]\nmin_confidence_threshold = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("min_confidence_threshold"));
    }

    #[test]
    fn test_rejects_inverted_position_bounds() {
        let result = Config::parse(
            "[risk]\nmax_position_size = 0.01\nmin_position_size = 0.05\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_uri() {
        let mut config = Config::default();
        config.apply_env(&EnvConfig {
            config_path: "config.toml".to_string(),
            decision_ws_url: Some("wss://signals.example/ws".to_string()),
        });

        assert_eq!(config.relay.uri, "wss://signals.example/ws");
    }
}
