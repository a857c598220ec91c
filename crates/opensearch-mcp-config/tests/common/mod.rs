// crates/opensearch-mcp-config/tests/common/mod.rs
// ============================================================================
// Module: Config Test Helpers
// Description: Shared fixtures for configuration integration tests.
// Purpose: Keep config construction terse across test files.
// Dependencies: opensearch-mcp-config, tempfile
// ============================================================================

#![allow(dead_code, reason = "Helpers are shared across test binaries.")]

use std::fs;
use std::path::PathBuf;

use opensearch_mcp_config::ConfigError;
use opensearch_mcp_config::EnvSnapshot;
use opensearch_mcp_config::OpenSearchMcpConfig;
use tempfile::TempDir;

/// Minimal single-cluster configuration.
pub const SINGLE_CLUSTER_TOML: &str = r#"
[[clusters]]
id = "local"
url = "https://localhost:9200"
username = "admin"
password = "admin"
"#;

/// Parses TOML text and applies an empty environment overlay.
pub fn parse(content: &str) -> Result<OpenSearchMcpConfig, ConfigError> {
    let mut config = OpenSearchMcpConfig::from_toml_str(content)?;
    config.apply_env(&EnvSnapshot::default())?;
    Ok(config)
}

/// Writes a file into a fresh temp directory and returns both.
pub fn write_temp(name: &str, content: &str) -> Result<(TempDir, PathBuf), String> {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join(name);
    fs::write(&path, content).map_err(|err| err.to_string())?;
    Ok((dir, path))
}

/// Assert that a validation result is an error containing a specific substring.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> Result<(), String> {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error '{message}' did not contain '{needle}'"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
