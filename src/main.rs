mod config;
mod decision;
mod execution;
mod monitoring;
mod relay;

use anyhow::Result;
use config::{Config, EnvConfig};
use execution::simulator::PaperTradingSimulator;
use monitoring::logger::CsvLogger;
use relay::{shutdown_requested, DecisionRelay, RelayError};
use std::future::Future;
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() -> Result<()> {
    monitoring::logger::init_tracing();

    tracing::info!("🚀 Decision relay starting...");

    // Load configuration
    let env_config = EnvConfig::load();
    tracing::info!("Loading configuration from {}", env_config.config_path);
    let mut config = Config::load(&env_config.config_path)?;
    config.apply_env(&env_config);

    tracing::info!("Decision source: {}", config.relay.uri);
    tracing::info!(
        "Risk management: {} (max position {:.3}, min position {:.3}, min confidence {:.2})",
        if config.risk.enabled { "enabled" } else { "disabled" },
        config.risk.max_position_size,
        config.risk.min_position_size,
        config.risk.min_confidence_threshold
    );
    tracing::info!(
        "Reconnect: {}ms initial, {}ms cap, {} attempts",
        config.reconnect.initial_delay_ms,
        config.reconnect.max_delay_ms,
        config.reconnect.max_attempts
    );

    let csv = if config.monitoring.csv_logging {
        tracing::info!("Execution log: {}", config.monitoring.csv_log_path);
        Some(CsvLogger::new(config.monitoring.csv_log_path.clone())?)
    } else {
        None
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let monitor = tokio::spawn(monitoring::stats::run_monitor(events_rx, csv));

    let executor = PaperTradingSimulator::new(config.paper_trading.clone());
    let mut relay = DecisionRelay::from_config(&config, Box::new(executor), events_tx);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut idle_rx = shutdown_rx.clone();
    tokio::spawn(forward_shutdown(tokio::signal::ctrl_c(), shutdown_tx));

    match relay.run(shutdown_rx).await {
        Ok(()) => {}
        Err(RelayError::ReconnectExhausted { attempts }) => {
            tracing::error!(
                "Decision source unreachable after {} attempts; restart the relay to reconnect",
                attempts
            );
            shutdown_requested(&mut idle_rx).await;
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!("Connection {}", relay.state());

    // Dropping the relay closes the event channel and ends the monitor
    drop(relay);
    monitor.await?;

    tracing::info!("Relay stopped");
    Ok(())
}

/// Raise the shutdown flag once `signal` fires. If the signal handler cannot
/// be installed the sender is kept alive, so the relay keeps running.
async fn forward_shutdown<F>(signal: F, shutdown_tx: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!("Failed to listen for Ctrl-C, relay keeps running until killed: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(true);
}
