// crates/opensearch-mcp-config/src/config.rs
// ============================================================================
// Module: OpenSearch MCP Configuration
// Description: Configuration loading, environment overlay, and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml, tracing
// ============================================================================

//! ## Overview
//! Configuration is loaded from an optional TOML file and overlaid with a
//! captured [`EnvSnapshot`]. Validation is fail-closed: any malformed startup
//! input aborts with [`ConfigError`]. Tool filter and override rules are only
//! shape-checked here; their interpretation is fail-open downstream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::env::AWS_PROFILE_VAR;
use crate::env::CONFIG_PATH_VAR;
use crate::env::EnvSnapshot;
use crate::env::IAM_ARN_VAR;
use crate::env::NO_AUTH_VAR;
use crate::env::REGION_VAR;
use crate::env::SERVERLESS_VAR;
use crate::env::SSL_VERIFY_VAR;
use crate::env::TIMEOUT_VAR;
use crate::env::TRANSPORT_VAR;
use crate::env::URL_VAR;
use crate::tools::FilterConfig;
use crate::tools::OverrideConfig;
use crate::tools::ToolOverride;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "opensearch-mcp.toml";
/// Identifier of the profile synthesized from environment variables.
pub const ENV_PROFILE_ID: &str = "default";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum specification file size in bytes.
pub(crate) const MAX_SPECIFICATION_FILE_SIZE: usize = 16 * 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of cluster profiles.
pub(crate) const MAX_CLUSTERS: usize = 64;
/// Maximum length of a cluster id.
pub(crate) const MAX_CLUSTER_ID_LENGTH: usize = 64;
/// Maximum number of specification files.
pub(crate) const MAX_SPECIFICATION_PATHS: usize = 64;
/// Minimum tool timeout in milliseconds.
pub(crate) const MIN_TIMEOUT_MS: u64 = 100;
/// Maximum tool timeout in milliseconds.
pub(crate) const MAX_TIMEOUT_MS: u64 = 600_000;
/// Minimum request body limit in bytes.
pub(crate) const MIN_BODY_BYTES: usize = 1024;
/// Maximum request body limit in bytes.
pub(crate) const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
/// Maximum total attempts per call, including the first.
pub(crate) const MAX_RETRY_ATTEMPTS: u32 = 5;
/// Maximum backoff delay in milliseconds.
pub(crate) const MAX_RETRY_DELAY_MS: u64 = 60_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// OpenSearch MCP configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenSearchMcpConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Retry policy for read-only tools.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Global auth posture.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Configured cluster profiles.
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
    /// Tool visibility rules. `None` means no filter was configured.
    #[serde(default)]
    pub filter: Option<FilterConfig>,
    /// Optional YAML or JSON override file.
    #[serde(default)]
    pub overrides_path: Option<PathBuf>,
    /// Inline per-tool overrides.
    #[serde(default)]
    pub tools: BTreeMap<String, ToolOverride>,
    /// Specification fragments used to derive additional tools.
    #[serde(default)]
    pub specification: SpecificationConfig,
    /// Path the configuration was loaded from, if any.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl OpenSearchMcpConfig {
    /// Loads configuration using the path resolution order and environment
    /// overlay.
    ///
    /// Resolution: explicit path, then `OPENSEARCH_MCP_CONFIG`, then
    /// `opensearch-mcp.toml` when present, otherwise environment only.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overlay, or validation fails.
    pub fn load(path: Option<&Path>, env: &EnvSnapshot) -> Result<Self, ConfigError> {
        let config = Self::load_unvalidated(path, env)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration like [`Self::load`] but skips validation, so
    /// callers can layer further overrides before validating.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when reading, parsing, or overlay fails.
    pub fn load_unvalidated(path: Option<&Path>, env: &EnvSnapshot) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path, env)? {
            Some(resolved) => {
                validate_path(&resolved)?;
                let content = read_limited(&resolved, MAX_CONFIG_FILE_SIZE, "config file")?;
                let mut config = Self::from_toml_str(&content)?;
                config.anchor_relative_paths(&resolved);
                config.source_path = Some(resolved);
                config
            }
            None => Self::default(),
        };
        config.apply_env(env)?;
        Ok(config)
    }

    /// Parses configuration from TOML text without overlay or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the TOML is malformed.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies environment variables on top of file configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an environment value is malformed.
    pub fn apply_env(&mut self, env: &EnvSnapshot) -> Result<(), ConfigError> {
        if let Some(value) = env.get(TRANSPORT_VAR) {
            self.server.transport = ServerTransport::parse(value).ok_or_else(|| {
                ConfigError::Invalid(format!("{TRANSPORT_VAR} must be stdio or http"))
            })?;
        }
        if env.flag(NO_AUTH_VAR) == Some(true) {
            self.auth.allow_no_auth = true;
        }
        if self.clusters.is_empty()
            && let Some(url) = env.get(URL_VAR)
        {
            self.clusters.push(ClusterConfig::from_env(url, env)?);
        }
        match (self.filter.is_some(), FilterConfig::from_env(env)) {
            (true, Some(_)) => {
                warn!("filter environment variables ignored; [filter] table takes precedence");
            }
            (false, Some(filter)) => self.filter = Some(filter),
            _ => {}
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.retry.validate()?;
        if self.clusters.len() > MAX_CLUSTERS {
            return Err(ConfigError::Invalid("too many cluster profiles".to_string()));
        }
        let mut seen = BTreeSet::new();
        for cluster in &self.clusters {
            cluster.validate(&self.auth)?;
            if !seen.insert(cluster.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate cluster id: {}", cluster.id)));
            }
        }
        if let Some(default_cluster) = &self.server.default_cluster
            && !seen.contains(default_cluster.as_str())
        {
            return Err(ConfigError::Invalid(format!(
                "server.default_cluster references unknown cluster: {default_cluster}"
            )));
        }
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        self.inline_overrides().validate()?;
        if let Some(path) = &self.overrides_path {
            validate_path_string("overrides_path", &path.to_string_lossy())?;
        }
        self.specification.validate()?;
        Ok(())
    }

    /// Returns the configured filter rules, or the unrestricted default.
    #[must_use]
    pub fn filter_config(&self) -> FilterConfig {
        self.filter.clone().unwrap_or_default()
    }

    /// Returns inline `[tools.<name>]` overrides as an override document.
    #[must_use]
    pub fn inline_overrides(&self) -> OverrideConfig {
        OverrideConfig {
            tools: self.tools.clone(),
        }
    }

    /// Resolves inline overrides merged with the override file, file on top.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the override file cannot be loaded.
    pub fn resolved_overrides(&self) -> Result<OverrideConfig, ConfigError> {
        let inline = self.inline_overrides();
        match &self.overrides_path {
            Some(path) => Ok(inline.merged_with(&OverrideConfig::load(path)?)),
            None => Ok(inline),
        }
    }

    /// Looks up a cluster profile by id.
    #[must_use]
    pub fn cluster(&self, id: &str) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|cluster| cluster.id == id)
    }

    /// Anchors relative auxiliary paths at the config file's directory.
    fn anchor_relative_paths(&mut self, config_path: &Path) {
        let Some(base) = config_path.parent() else {
            return;
        };
        if let Some(path) = &self.overrides_path
            && path.is_relative()
        {
            self.overrides_path = Some(base.join(path));
        }
        for path in &mut self.specification.paths {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Server configuration for MCP transports.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Transport type for MCP.
    #[serde(default)]
    pub transport: ServerTransport,
    /// Bind address for the HTTP transport.
    #[serde(default)]
    pub bind: Option<String>,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Default per-call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Cluster used when a request does not select one.
    #[serde(default)]
    pub default_cluster: Option<String>,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: ServerTransport::default(),
            bind: None,
            max_body_bytes: default_max_body_bytes(),
            default_timeout_ms: default_timeout_ms(),
            default_cluster: None,
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.transport == ServerTransport::Http {
            let bind = self.bind.as_deref().map(str::trim).unwrap_or_default();
            if bind.is_empty() {
                return Err(ConfigError::Invalid("http transport requires bind address".to_string()));
            }
            bind.parse::<SocketAddr>()
                .map_err(|_| ConfigError::Invalid("invalid bind address".to_string()))?;
        }
        if !(MIN_BODY_BYTES..=MAX_BODY_BYTES).contains(&self.max_body_bytes) {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between {MIN_BODY_BYTES} and {MAX_BODY_BYTES}"
            )));
        }
        validate_timeout("server.default_timeout_ms", self.default_timeout_ms)?;
        if let Some(default_cluster) = &self.default_cluster
            && default_cluster.trim().is_empty()
        {
            return Err(ConfigError::Invalid("server.default_cluster must be non-empty".to_string()));
        }
        self.audit.validate()
    }
}

/// Supported MCP transport types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerTransport {
    /// Persistent session over stdin/stdout.
    #[default]
    #[serde(alias = "persistent")]
    Stdio,
    /// Stateless JSON-RPC over HTTP.
    #[serde(alias = "stateless")]
    Http,
}

impl ServerTransport {
    /// Parses a transport selector, accepting mode aliases.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" | "persistent" => Some(Self::Stdio),
            "http" | "stateless" => Some(Self::Http),
            _ => None,
        }
    }

    /// Returns the stable label for this transport.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        }
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerAuditConfig {
    /// Enable structured audit logging.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional audit log path (JSON lines). Stderr when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl ServerAuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("server.audit.path", path)?;
        }
        Ok(())
    }
}

/// Retry policy for read-only tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Validates retry bounds.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_RETRY_ATTEMPTS).contains(&self.max_attempts) {
            return Err(ConfigError::Invalid(format!(
                "retry.max_attempts must be between 1 and {MAX_RETRY_ATTEMPTS}"
            )));
        }
        if self.max_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::Invalid(format!(
                "retry.max_delay_ms must be at most {MAX_RETRY_DELAY_MS}"
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Global auth posture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Permit unauthenticated access when no credential source resolves.
    #[serde(default)]
    pub allow_no_auth: bool,
}

/// Auth mode declared on a cluster profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterAuthMode {
    /// No credentials are sent.
    None,
    /// HTTP basic authentication.
    Basic,
    /// AWS SigV4 request signing.
    #[serde(alias = "signed-request", alias = "aws_iam")]
    SignedRequest,
}

impl ClusterAuthMode {
    /// Returns the stable label for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::SignedRequest => "signed_request",
        }
    }
}

/// A configured cluster endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Unique profile identifier.
    pub id: String,
    /// Base URL of the cluster.
    pub url: String,
    /// Declared auth mode. Inferred from available credentials when unset.
    #[serde(default)]
    pub auth: Option<ClusterAuthMode>,
    /// Basic-auth username.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// Named local AWS credential profile.
    #[serde(default)]
    pub aws_profile: Option<String>,
    /// Role assumed on top of the resolved base credentials.
    #[serde(default)]
    pub iam_role_arn: Option<String>,
    /// Signing region.
    #[serde(default)]
    pub region: Option<String>,
    /// Verify TLS certificates.
    #[serde(default = "default_ssl_verify")]
    pub ssl_verify: bool,
    /// Explicit serverless flag. Detected lazily when unset.
    #[serde(default)]
    pub serverless: Option<bool>,
    /// Per-request HTTP timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ClusterConfig {
    /// Synthesizes the environment-derived profile.
    ///
    /// Basic-auth credentials are not copied onto the profile; they are
    /// picked up from the environment during auth resolution.
    fn from_env(url: &str, env: &EnvSnapshot) -> Result<Self, ConfigError> {
        let timeout_ms = match env.get(TIMEOUT_VAR) {
            Some(value) => {
                let seconds = value.parse::<u64>().map_err(|_| {
                    ConfigError::Invalid(format!("{TIMEOUT_VAR} must be whole seconds"))
                })?;
                Some(seconds.saturating_mul(1000))
            }
            None => None,
        };
        Ok(Self {
            id: ENV_PROFILE_ID.to_string(),
            url: url.to_string(),
            auth: None,
            username: None,
            password: None,
            aws_profile: env.get(AWS_PROFILE_VAR).map(ToString::to_string),
            iam_role_arn: env.get(IAM_ARN_VAR).map(ToString::to_string),
            region: env.get(REGION_VAR).map(ToString::to_string),
            ssl_verify: env.flag(SSL_VERIFY_VAR).unwrap_or(true),
            serverless: env.flag(SERVERLESS_VAR),
            timeout_ms,
        })
    }

    /// Validates a single cluster profile.
    fn validate(&self, auth: &AuthConfig) -> Result<(), ConfigError> {
        let id = self.id.trim();
        if id.is_empty() || id.len() > MAX_CLUSTER_ID_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "cluster id must be 1..={MAX_CLUSTER_ID_LENGTH} characters"
            )));
        }
        if !id.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.')) {
            return Err(ConfigError::Invalid(format!(
                "cluster id {id} may only contain letters, digits, '_', '-' and '.'"
            )));
        }
        validate_url(id, &self.url)?;
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::Invalid(format!(
                "cluster {id}: basic auth requires both username and password"
            )));
        }
        if self.auth == Some(ClusterAuthMode::None) && !auth.allow_no_auth {
            return Err(ConfigError::Invalid(format!(
                "cluster {id}: auth = \"none\" requires auth.allow_no_auth"
            )));
        }
        if let Some(timeout_ms) = self.timeout_ms {
            validate_timeout(&format!("cluster {id} timeout_ms"), timeout_ms)?;
        }
        for (field, value) in [
            ("aws_profile", &self.aws_profile),
            ("iam_role_arn", &self.iam_role_arn),
            ("region", &self.region),
        ] {
            if value.as_deref().is_some_and(|value| value.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("cluster {id}: {field} must be non-empty")));
            }
        }
        Ok(())
    }
}

/// Specification fragments used to derive tools.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpecificationConfig {
    /// Files holding one JSON document or newline-delimited JSON documents.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

/// Raw text of one specification file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecificationSource {
    /// File the text was read from.
    pub path: PathBuf,
    /// File contents.
    pub text: String,
}

impl SpecificationConfig {
    /// Reads every configured specification file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a file cannot be read.
    pub fn read_sources(&self) -> Result<Vec<SpecificationSource>, ConfigError> {
        self.paths
            .iter()
            .map(|path| {
                let text = read_limited(path, MAX_SPECIFICATION_FILE_SIZE, "specification file")?;
                Ok(SpecificationSource {
                    path: path.clone(),
                    text,
                })
            })
            .collect()
    }

    /// Validates specification paths.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.len() > MAX_SPECIFICATION_PATHS {
            return Err(ConfigError::Invalid("too many specification paths".to_string()));
        }
        for path in &self.paths {
            validate_path_string("specification.paths", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// Parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller, environment, or default file.
fn resolve_path(path: Option<&Path>, env: &EnvSnapshot) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    if let Some(env_path) = env.get(CONFIG_PATH_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(Some(PathBuf::from(env_path)));
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_NAME);
    Ok(fallback.is_file().then_some(fallback))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if let Component::Normal(value) = component
            && value.len() > MAX_PATH_COMPONENT_LENGTH
        {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    Ok(())
}

/// Reads a UTF-8 file with a size ceiling.
fn read_limited(path: &Path, limit: usize, label: &str) -> Result<String, ConfigError> {
    let bytes =
        fs::read(path).map_err(|err| ConfigError::Io(format!("{label} {}: {err}", path.display())))?;
    if bytes.len() > limit {
        return Err(ConfigError::Invalid(format!("{label} exceeds size limit")));
    }
    String::from_utf8(bytes).map_err(|_| ConfigError::Invalid(format!("{label} must be utf-8")))
}

/// Validates a cluster base URL.
fn validate_url(id: &str, url: &str) -> Result<(), ConfigError> {
    let trimmed = url.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| {
            ConfigError::Invalid(format!("cluster {id}: url must include http:// or https://"))
        })?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(ConfigError::Invalid(format!("cluster {id}: url must include a host")));
    }
    Ok(())
}

/// Validates a timeout value against global bounds.
fn validate_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}"
        )));
    }
    Ok(())
}

/// Default maximum request body size.
pub(crate) const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default per-call timeout.
pub(crate) const fn default_timeout_ms() -> u64 {
    30_000
}

/// Audit logging is on unless disabled.
pub(crate) const fn default_audit_enabled() -> bool {
    true
}

/// Default total attempts for read-only tools.
pub(crate) const fn default_retry_attempts() -> u32 {
    3
}

/// Default initial backoff.
pub(crate) const fn default_retry_base_delay_ms() -> u64 {
    100
}

/// Default backoff ceiling.
pub(crate) const fn default_retry_max_delay_ms() -> u64 {
    2_000
}

/// TLS verification is on unless disabled.
pub(crate) const fn default_ssl_verify() -> bool {
    true
}
