// crates/opensearch-mcp-config/src/env.rs
// ============================================================================
// Module: Environment Snapshot
// Description: Immutable capture of process environment variables.
// Purpose: Make env-driven configuration and auth resolution testable.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The process environment is read exactly once into an [`EnvSnapshot`].
//! Config loading and credential resolution consume the snapshot instead of
//! calling `std::env` directly, so tests construct snapshots from literal
//! pairs without mutating process state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;

// ============================================================================
// SECTION: Variable Names
// ============================================================================

/// Environment variable used to override the config path.
pub const CONFIG_PATH_VAR: &str = "OPENSEARCH_MCP_CONFIG";
/// Cluster base URL for the environment-derived profile.
pub const URL_VAR: &str = "OPENSEARCH_URL";
/// Basic-auth username.
pub const USERNAME_VAR: &str = "OPENSEARCH_USERNAME";
/// Basic-auth password.
pub const PASSWORD_VAR: &str = "OPENSEARCH_PASSWORD";
/// Explicit no-auth enable flag.
pub const NO_AUTH_VAR: &str = "OPENSEARCH_NO_AUTH";
/// TLS certificate verification toggle.
pub const SSL_VERIFY_VAR: &str = "OPENSEARCH_SSL_VERIFY";
/// Per-request timeout in seconds for the environment-derived profile.
pub const TIMEOUT_VAR: &str = "OPENSEARCH_TIMEOUT";
/// Signing region.
pub const REGION_VAR: &str = "AWS_REGION";
/// Named local credential profile.
pub const AWS_PROFILE_VAR: &str = "AWS_PROFILE";
/// Role to assume for signed requests.
pub const IAM_ARN_VAR: &str = "AWS_IAM_ARN";
/// Serverless deployment flag.
pub const SERVERLESS_VAR: &str = "AWS_OPENSEARCH_SERVERLESS";
/// Static access key id.
pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
/// Static secret access key.
pub const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
/// Optional session token paired with static keys.
pub const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";
/// Transport selector (`stdio` or `http`).
pub const TRANSPORT_VAR: &str = "OPENSEARCH_MCP_TRANSPORT";
/// Comma-separated tool names to include.
pub const ENABLED_TOOLS_VAR: &str = "OPENSEARCH_ENABLED_TOOLS";
/// Comma-separated tool names to exclude.
pub const DISABLED_TOOLS_VAR: &str = "OPENSEARCH_DISABLED_TOOLS";
/// Comma-separated categories to allow.
pub const ENABLED_CATEGORIES_VAR: &str = "OPENSEARCH_ENABLED_CATEGORIES";
/// Comma-separated categories to exclude.
pub const DISABLED_CATEGORIES_VAR: &str = "OPENSEARCH_DISABLED_CATEGORIES";
/// Comma-separated include patterns.
pub const ENABLED_TOOLS_REGEX_VAR: &str = "OPENSEARCH_ENABLED_TOOLS_REGEX";
/// Comma-separated exclude patterns.
pub const DISABLED_TOOLS_REGEX_VAR: &str = "OPENSEARCH_DISABLED_TOOLS_REGEX";
/// Write-operation toggle.
pub const ALLOW_WRITE_VAR: &str = "OPENSEARCH_SETTINGS_ALLOW_WRITE";

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Point-in-time copy of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    /// Captured variables keyed by name.
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Captures the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    /// Builds a snapshot from literal pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(key, value)| (key.into(), value.into())).collect(),
        }
    }

    /// Returns the trimmed value of a variable, treating blank values as unset.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|value| value.trim()).filter(|value| !value.is_empty())
    }

    /// Returns true when the variable is set to a non-blank value.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Interprets a variable as a boolean flag.
    ///
    /// `true`, `1`, `yes`, and `on` are truthy; `false`, `0`, `no`, and `off`
    /// are falsy; anything else is treated as unset.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<bool> {
        let value = self.get(name)?;
        match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Splits a comma-separated variable into trimmed, non-empty items.
    #[must_use]
    pub fn list(&self, name: &str) -> Vec<String> {
        self.get(name).map(split_list).unwrap_or_default()
    }
}

/// Splits a comma-separated string into trimmed, non-empty items.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
