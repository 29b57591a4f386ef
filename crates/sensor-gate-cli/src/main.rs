// crates/sensor-gate-cli/src/main.rs
// ============================================================================
// Module: Sensor Gate CLI Entry Point
// Description: Command dispatcher for serving and config validation.
// Purpose: Wire configuration, logging, broker, and HTTP server together.
// Dependencies: clap, sensor-gate-broker, sensor-gate-config, sensor-gate-server, tokio
// ============================================================================

//! ## Overview
//! `sensor-gate serve` loads configuration, starts the broker session
//! (fatal on failure), and serves HTTP until Ctrl-C or until the broker
//! supervisor gives up reconnecting. `sensor-gate config validate` checks a
//! configuration without connecting anywhere; `config example` prints a
//! canonical config file.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod logging;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use sensor_gate_broker::AmqpConnector;
use sensor_gate_broker::BrokerSupervisor;
use sensor_gate_broker::ReconnectPolicy;
use sensor_gate_broker::Topology;
use sensor_gate_config::GatewayConfig;
use sensor_gate_config::ReconnectConfig;
use sensor_gate_config::config_toml_example;
use sensor_gate_server::GatewaySettings;
use sensor_gate_server::GatewayState;
use sensor_gate_server::ServerError;
use sensor_gate_server::build_router;
use sensor_gate_server::identity_provider_from_config;
use sensor_gate_server::serve;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::error;
use tracing::info;
use tracing::warn;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "sensor-gate", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ingestion gateway.
    Serve(ConfigArgs),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a configuration file.
    Validate(ConfigArgs),
    /// Print a canonical example configuration.
    Example,
}

/// Config file selection shared by commands.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Config file path (defaults to `SENSOR_GATE_CONFIG`, then config.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the selected command.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Serve(args) => command_serve(&args).await,
        Commands::Config {
            command: ConfigCommand::Validate(args),
        } => command_config_validate(&args),
        Commands::Config {
            command: ConfigCommand::Example,
        } => {
            write_stdout(&config_toml_example())
                .map_err(|err| CliError::new(format!("stdout write failed: {err}")))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Loads configuration for a command.
fn load_config(args: &ConfigArgs) -> CliResult<GatewayConfig> {
    GatewayConfig::load(args.config.as_deref())
        .map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Validates configuration and reports the source.
fn command_config_validate(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    let source = describe_source(&config);
    write_stdout(&format!("config valid ({source})\n"))
        .map_err(|err| CliError::new(format!("stdout write failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Runs the gateway until shutdown or fatal broker loss.
async fn command_serve(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    logging::init(&config.logging).map_err(CliError::new)?;
    if config.source_path.is_none() {
        warn!("no config file found; using defaults and environment");
    }
    info!(source = %describe_source(&config), "configuration loaded");

    let topology = Topology::new(
        &config.broker.exchange,
        &config.broker.queue,
        &config.broker.binding_pattern,
    );
    let mut supervisor = BrokerSupervisor::new(
        Arc::new(AmqpConnector::new(config.broker.uri.clone())),
        topology,
        reconnect_policy(&config.broker.reconnect),
    );
    supervisor
        .start()
        .await
        .map_err(|err| CliError::new(format!("broker startup failed: {err}")))?;
    let publisher = supervisor.publisher();

    let identity = identity_provider_from_config(&config.auth)
        .map_err(|err| CliError::new(format!("identity provider setup failed: {err}")))?;
    let gateway = Arc::new(GatewayState::new(
        publisher.clone(),
        GatewaySettings::from_config(&config.server),
    ));
    let router = build_router(gateway, identity);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_config = config.server.clone();
    let mut server = tokio::spawn(async move {
        serve(router, &server_config, async move {
            let _ = shutdown_rx.await;
        })
        .await
    });
    let mut broker = tokio::spawn(supervisor.run());

    let outcome = tokio::select! {
        joined = &mut server => server_outcome(joined),
        joined = &mut broker => {
            let _ = shutdown_tx.send(());
            let _ = server.await;
            match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => {
                    error!(error = %err, "broker connection could not be restored");
                    Err(CliError::new(format!("broker connection lost: {err}")))
                }
                Err(err) => Err(CliError::new(format!("broker supervisor panicked: {err}"))),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(error = %err, "signal listener failed; shutting down");
            }
            info!("shutdown requested");
            let _ = shutdown_tx.send(());
            server_outcome(server.await)
        }
    };

    broker.abort();
    if let Err(err) = publisher.close().await {
        warn!(error = %err, "broker close failed");
    }
    info!("gateway stopped");
    outcome.map(|()| ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts supervisor settings from configuration.
const fn reconnect_policy(config: &ReconnectConfig) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts: config.max_attempts,
        initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        max_backoff: Duration::from_millis(config.max_backoff_ms),
    }
}

/// Flattens the server task result.
fn server_outcome(joined: Result<Result<(), ServerError>, JoinError>) -> CliResult<()> {
    match joined {
        Ok(result) => result.map_err(|err| CliError::new(err.to_string())),
        Err(err) => Err(CliError::new(format!("server task panicked: {err}"))),
    }
}

/// Describes where configuration came from.
fn describe_source(config: &GatewayConfig) -> String {
    config
        .source_path
        .as_ref()
        .map_or_else(|| "defaults".to_string(), |path| path.display().to_string())
}

/// Writes to stdout.
fn write_stdout(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(message.as_bytes())
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
