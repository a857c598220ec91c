// crates/opensearch-mcp-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Unit Tests
// Description: Argument parsing, serve overrides, and tool listing output.
// Purpose: Validate command wiring without starting a server.
// Dependencies: clap, opensearch-mcp, tempfile
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions favor direct unwraps for clarity."
)]

use std::io::Write;

use clap::Parser;
use opensearch_mcp::build_catalog;
use opensearch_mcp_config::EnvSnapshot;
use opensearch_mcp_config::OpenSearchMcpConfig;
use opensearch_mcp_config::ServerTransport;

use super::Cli;
use super::Commands;
use super::ConfigArg;
use super::ConfigCommand;
use super::LogFormat;
use super::TransportArg;
use super::apply_serve_overrides;
use super::load_config;
use super::load_serve_config;
use super::render_table;
use super::summarize;

fn serve_command(args: &[&str]) -> super::ServeCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    match cli.command {
        Commands::Serve(command) => command,
        other => panic!("expected serve, got {other:?}"),
    }
}

#[test]
fn serve_flags_parse() {
    let cli =
        Cli::try_parse_from(["opensearch-mcp", "--log-format", "json", "serve", "--transport", "http"])
            .unwrap();
    assert_eq!(cli.log_format, LogFormat::Json);
    let Commands::Serve(command) = cli.command else {
        panic!("expected serve");
    };
    assert_eq!(command.transport, Some(TransportArg::Http));
    assert!(command.config.config.is_none());
}

#[test]
fn config_validate_takes_a_path() {
    let cli = Cli::try_parse_from(["opensearch-mcp", "config", "validate", "--config", "a.toml"]).unwrap();
    let Commands::Config {
        command: ConfigCommand::Validate(args),
    } = cli.command
    else {
        panic!("expected config validate");
    };
    assert_eq!(args.config.unwrap().to_str(), Some("a.toml"));
}

#[test]
fn unknown_transport_is_rejected() {
    assert!(Cli::try_parse_from(["opensearch-mcp", "serve", "--transport", "grpc"]).is_err());
}

#[test]
fn http_override_requires_bind() {
    let mut config = OpenSearchMcpConfig::default();
    let command = serve_command(&["opensearch-mcp", "serve", "--transport", "http"]);
    assert!(apply_serve_overrides(&mut config, &command).is_err());

    let mut config = OpenSearchMcpConfig::default();
    let command =
        serve_command(&["opensearch-mcp", "serve", "--transport", "http", "--bind", "127.0.0.1:8080"]);
    apply_serve_overrides(&mut config, &command).unwrap();
    assert_eq!(config.server.transport, ServerTransport::Http);
    assert_eq!(config.server.bind.as_deref(), Some("127.0.0.1:8080"));
}

#[test]
fn load_config_reads_the_given_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[filter]\nexclude = [\"CountTool\"]").unwrap();
    let args = ConfigArg {
        config: Some(file.path().to_path_buf()),
    };
    let config = load_config(&args, &EnvSnapshot::from_pairs(Vec::<(String, String)>::new())).unwrap();
    assert_eq!(config.filter.unwrap().exclude, vec!["CountTool".to_string()]);
}

#[test]
fn serve_overrides_apply_before_validation() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server]\ntransport = \"http\"").unwrap();
    let path = file.path().to_str().unwrap();
    let env = EnvSnapshot::from_pairs(Vec::<(String, String)>::new());

    let args = ConfigArg {
        config: Some(file.path().to_path_buf()),
    };
    assert!(load_config(&args, &env).is_err());

    let command = serve_command(&[
        "opensearch-mcp",
        "serve",
        "--config",
        path,
        "--transport",
        "http",
        "--bind",
        "127.0.0.1:8080",
    ]);
    let config = load_serve_config(&command, &env).unwrap();
    assert_eq!(config.server.bind.as_deref(), Some("127.0.0.1:8080"));

    // Re-reading for a reload keeps the command-line bind.
    let reloaded = load_serve_config(&command, &env).unwrap();
    assert_eq!(reloaded.server.transport, ServerTransport::Http);
    assert_eq!(reloaded.server.bind.as_deref(), Some("127.0.0.1:8080"));
}

#[test]
fn listing_reflects_filters_and_renames() {
    let config = OpenSearchMcpConfig::from_toml_str(
        r#"
[filter]
exclude = ["CountTool"]

[tools.ClusterHealthTool]
display_name = "health"
"#,
    )
    .unwrap();
    let catalog = build_catalog(&config).unwrap();
    let summaries = summarize(&catalog.policy.apply(&catalog.registry, None));

    assert!(summaries.iter().all(|summary| summary.name != "CountTool"));
    let health = summaries.iter().find(|summary| summary.name == "health").unwrap();
    assert_eq!(health.registry_name.as_deref(), Some("ClusterHealthTool"));
    assert_eq!(health.category, "core");

    let table = render_table(&summaries);
    assert!(table.ends_with(&format!("{} tool(s)", summaries.len())));
    assert!(table.lines().any(|line| line.starts_with("health ")));
}
