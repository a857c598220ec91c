// crates/opensearch-mcp-cli/src/main.rs
// ============================================================================
// Module: OpenSearch MCP CLI Entry Point
// Description: Command dispatcher for the OpenSearch MCP server.
// Purpose: Start the server, validate configuration, and inspect tools.
// Dependencies: clap, opensearch-mcp, opensearch-mcp-config, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! The `opensearch-mcp` binary loads configuration (file plus environment,
//! with an optional `.env` file applied first), installs logging on stderr,
//! and runs one of:
//!
//! - `serve`: run the MCP server on the configured transport. On unix,
//!   `SIGHUP` reloads tool filters, overrides, and specification fragments.
//! - `config validate`: load and validate configuration, then exit.
//! - `tools list`: print the tools visible under the configured filters.
//!
//! Stdout is reserved for protocol traffic while serving over stdio.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use opensearch_mcp::EffectiveToolSet;
use opensearch_mcp::McpServer;
use opensearch_mcp::build_catalog;
use opensearch_mcp_config::EnvSnapshot;
use opensearch_mcp_config::OpenSearchMcpConfig;
use opensearch_mcp_config::ServerTransport;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "OPENSEARCH_MCP_LOG";
/// Log filter used when [`LOG_ENV`] is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "opensearch-mcp", version, disable_help_subcommand = true)]
struct Cli {
    /// Log output format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Tool catalog utilities.
    Tools {
        /// Selected tools subcommand.
        #[command(subcommand)]
        command: ToolsCommand,
    },
}

/// Shared config path argument.
#[derive(Args, Debug, Clone)]
struct ConfigArg {
    /// Path to the configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Configuration for the `serve` command.
#[derive(Args, Debug, Clone)]
struct ServeCommand {
    /// Configuration file selection.
    #[command(flatten)]
    config: ConfigArg,
    /// Transport override.
    #[arg(long, value_enum)]
    transport: Option<TransportArg>,
    /// Bind address override for the HTTP transport.
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate configuration and exit.
    Validate(ConfigArg),
}

/// Tools subcommands.
#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// List tools visible under the configured filters.
    List(ToolsListCommand),
}

/// Configuration for `tools list`.
#[derive(Args, Debug)]
struct ToolsListCommand {
    /// Configuration file selection.
    #[command(flatten)]
    config: ConfigArg,
    /// Emit JSON instead of a table.
    #[arg(long)]
    json: bool,
}

/// Transport selector accepted on the command line.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum TransportArg {
    /// Newline-delimited JSON-RPC over stdin and stdout.
    Stdio,
    /// JSON-RPC over `POST /mcp`.
    Http,
}

impl From<TransportArg> for ServerTransport {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Stdio => Self::Stdio,
            TransportArg::Http => Self::Http,
        }
    }
}

/// Log output formats.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// One row of `tools list` output.
#[derive(Debug, Serialize)]
struct ToolSummary {
    /// Visible tool name.
    name: String,
    /// Registry name when the tool was renamed.
    #[serde(skip_serializing_if = "Option::is_none")]
    registry_name: Option<String>,
    /// Tool category.
    category: &'static str,
    /// Visible description.
    description: String,
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
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// Result alias for CLI operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    // A missing .env file is the common case.
    let _ = dotenvy::dotenv();
    init_logging(cli.log_format);

    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command: ConfigCommand::Validate(args),
        } => command_config_validate(&args),
        Commands::Tools {
            command: ToolsCommand::List(command),
        } => command_tools_list(&command),
    }
}

/// Installs the stderr tracing subscriber.
fn init_logging(format: LogFormat) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let env = EnvSnapshot::capture();
    let config = load_serve_config(&command, &env)?;
    info!(
        config = %config_source(&config),
        transport = config.server.transport.as_str(),
        clusters = config.clusters.len(),
        "starting opensearch mcp server"
    );

    let server = McpServer::from_config(&config, env)
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    let server = Arc::new(server);
    #[cfg(unix)]
    spawn_reload_on_hangup(Arc::clone(&server), command)?;

    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Loads configuration for `serve` with command-line overrides applied
/// before validation.
fn load_serve_config(command: &ServeCommand, env: &EnvSnapshot) -> CliResult<OpenSearchMcpConfig> {
    let mut config = OpenSearchMcpConfig::load_unvalidated(command.config.config.as_deref(), env)
        .map_err(|err| CliError::new(format!("config load failed: {err}")))?;
    apply_serve_overrides(&mut config, command)?;
    Ok(config)
}

/// Applies command-line transport overrides and revalidates.
fn apply_serve_overrides(config: &mut OpenSearchMcpConfig, command: &ServeCommand) -> CliResult<()> {
    if let Some(transport) = command.transport {
        config.server.transport = transport.into();
    }
    if let Some(bind) = &command.bind {
        config.server.bind = Some(bind.clone());
    }
    config.validate().map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Reloads tool configuration whenever the process receives `SIGHUP`.
#[cfg(unix)]
fn spawn_reload_on_hangup(server: Arc<McpServer>, command: ServeCommand) -> CliResult<()> {
    use tokio::signal::unix::SignalKind;
    use tokio::signal::unix::signal;

    let mut hangup = signal(SignalKind::hangup())
        .map_err(|err| CliError::new(format!("signal handler install failed: {err}")))?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            let env = EnvSnapshot::capture();
            let outcome = load_serve_config(&command, &env)
                .map_err(|err| err.to_string())
                .and_then(|config| server.reload(&config).map_err(|err| err.to_string()));
            if let Err(error) = outcome {
                tracing::warn!(%error, "reload rejected; keeping current tool catalog");
            }
        }
    });
    Ok(())
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Executes `config validate`.
fn command_config_validate(args: &ConfigArg) -> CliResult<ExitCode> {
    let config = load_config(args, &EnvSnapshot::capture())?;
    write_stdout_line(&format!(
        "config ok: {} ({} cluster profile(s), transport {})",
        config_source(&config),
        config.clusters.len(),
        config.server.transport.as_str()
    ))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Tools Command
// ============================================================================

/// Executes `tools list`.
///
/// No cluster is contacted, so version gates are not applied.
fn command_tools_list(command: &ToolsListCommand) -> CliResult<ExitCode> {
    let config = load_config(&command.config, &EnvSnapshot::capture())?;
    let catalog =
        build_catalog(&config).map_err(|err| CliError::new(format!("tool catalog failed: {err}")))?;
    let tools = catalog.policy.apply(&catalog.registry, None);
    let summaries = summarize(&tools);
    if command.json {
        let rendered = serde_json::to_string_pretty(&summaries)
            .map_err(|err| CliError::new(format!("json output failed: {err}")))?;
        write_stdout_line(&rendered)?;
    } else {
        write_stdout_line(&render_table(&summaries))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Builds output rows for an effective tool set.
fn summarize(tools: &EffectiveToolSet) -> Vec<ToolSummary> {
    tools
        .iter()
        .map(|tool| ToolSummary {
            name: tool.name.clone(),
            registry_name: (tool.name != tool.registry_name())
                .then(|| tool.registry_name().to_string()),
            category: tool.category().as_str(),
            description: tool.description.clone(),
        })
        .collect()
}

/// Renders rows as an aligned text table.
fn render_table(summaries: &[ToolSummary]) -> String {
    let width = summaries.iter().map(|summary| summary.name.len()).max().unwrap_or(0);
    let mut lines: Vec<String> = summaries
        .iter()
        .map(|summary| {
            format!("{:<width$}  {:<11}  {}", summary.name, summary.category, summary.description)
        })
        .collect();
    lines.push(format!("{} tool(s)", summaries.len()));
    lines.join("\n")
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates configuration.
fn load_config(args: &ConfigArg, env: &EnvSnapshot) -> CliResult<OpenSearchMcpConfig> {
    OpenSearchMcpConfig::load(args.config.as_deref(), env)
        .map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Describes where configuration came from.
fn config_source(config: &OpenSearchMcpConfig) -> String {
    config
        .source_path
        .as_ref()
        .map_or_else(|| "environment".to_string(), |path| path.display().to_string())
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| CliError::new(format!("stdout write failed: {err}")))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
