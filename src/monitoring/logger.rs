use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use crate::execution::types::OrderExecutionResult;

const CSV_HEADER: &str =
    "execution_time,order_id,symbol,action,status,execution_price,position_size,error_message";

/// Install the global subscriber. `RUST_LOG` wins over the default level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tungstenite=warn"));

    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .compact()
        .with_env_filter(filter)
        .init();
}

pub struct CsvLogger {
    log_path: String,
}

impl CsvLogger {
    pub fn new(log_path: String) -> Result<Self> {
        // Create CSV file with headers if it doesn't exist
        if !Path::new(&log_path).exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)?;

            writeln!(file, "{}", CSV_HEADER)?;
        }

        Ok(Self { log_path })
    }

    /// Append one execution result
    pub fn log_execution(&self, result: &OrderExecutionResult) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)?;

        let error_str = result
            .error_message
            .as_deref()
            .map(|m| m.replace([',', '\n'], ";"))
            .unwrap_or_default();

        writeln!(
            file,
            "{},{},{},{},{},{:.4},{:.6},{}",
            result.execution_time.to_rfc3339(),
            result.order_id,
            result.symbol,
            result.action,
            result.status,
            result.execution_price,
            result.position_size,
            error_str
        )?;

        Ok(())
    }
}
