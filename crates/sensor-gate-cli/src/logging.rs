// crates/sensor-gate-cli/src/logging.rs
// ============================================================================
// Module: Logging Setup
// Description: Global tracing subscriber initialization.
// Purpose: Emit structured logs in the configured format and level.
// Dependencies: sensor-gate-config, tracing-subscriber
// ============================================================================

//! ## Overview
//! `RUST_LOG` takes precedence over `[logging].level`. Output is plain text
//! or JSON lines on stdout.

use sensor_gate_config::LogFormat;
use sensor_gate_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Builds the log filter from `RUST_LOG` or the configured level.
pub(crate) fn filter(config: &LoggingConfig) -> Result<EnvFilter, String> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.trim()))
        .map_err(|err| format!("invalid log filter: {err}"))
}

/// Installs the global subscriber.
pub(crate) fn init(config: &LoggingConfig) -> Result<(), String> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter(config)?).with_target(true);
    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|err| format!("logging init failed: {err}"))
}
