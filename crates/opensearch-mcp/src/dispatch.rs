// crates/opensearch-mcp/src/dispatch.rs
// ============================================================================
// Module: Tool Dispatcher
// Description: Invocation pipeline from tool name to classified result.
// Purpose: Validate, route, bound, and retry tool calls against clusters.
// Dependencies: opensearch-mcp-config, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! [`Dispatcher::dispatch`] runs one invocation:
//!
//! 1. Look the tool up in the session's effective tool set.
//! 2. Validate arguments against the tool's input schema.
//! 3. Resolve the target cluster: explicit selector, then session default,
//!    then the single configured profile.
//! 4. Obtain the pooled connection and re-check version bounds against it.
//! 5. Reject mutating calls while write protection is on.
//! 6. Invoke the handler. Only read-only calls failing with server or
//!    network errors are retried.
//!
//! One timeout bounds all six steps, retries included.
//!
//! Every failure becomes a [`DispatchError`] with a stable `kind()` label;
//! nothing here is fatal to the process.
//!
//! The registry and filter policy live together in one [`ToolCatalog`]
//! snapshot, so a reload swaps both at once. A dispatch loads that snapshot
//! once and uses it for both lookup and write protection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use opensearch_mcp_config::RetryConfig;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::auth::AuthResolutionError;
use crate::connection::ClusterConnection;
use crate::connection::ConnectError;
use crate::connection::ConnectionManager;
use crate::connection::UpstreamError;
use crate::definition::HandlerError;
use crate::definition::ToolAccess;
use crate::definition::ToolOutput;
use crate::filter::CLUSTER_SELECTOR_ARGUMENT;
use crate::filter::EffectiveTool;
use crate::filter::EffectiveToolSet;
use crate::filter::FilterPolicy;
use crate::registry::SnapshotCell;
use crate::registry::ToolRegistry;
use crate::validation::ArgumentError;
use crate::version::ClusterVersion;
use crate::version::VersionRange;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Registry and filter policy installed together.
#[derive(Debug)]
pub struct ToolCatalog {
    /// Registry snapshot.
    pub registry: ToolRegistry,
    /// Compiled filter and override policy.
    pub policy: FilterPolicy,
}

impl ToolCatalog {
    /// Pairs a registry with a policy.
    #[must_use]
    pub const fn new(registry: ToolRegistry, policy: FilterPolicy) -> Self {
        Self {
            registry,
            policy,
        }
    }
}

/// Catalog stamped with the install generation.
#[derive(Debug)]
struct InstalledCatalog {
    /// Monotonic install counter.
    generation: u64,
    /// Installed catalog.
    catalog: ToolCatalog,
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Transport delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// One long-lived sequential session.
    Persistent,
    /// Self-contained requests.
    Stateless,
}

impl TransportMode {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Stateless => "stateless",
        }
    }
}

/// Per-client dispatch context.
#[derive(Debug, Clone)]
pub struct Session {
    /// Delivery mode.
    mode: TransportMode,
    /// Cluster used when a request does not select one.
    default_cluster: Option<String>,
    /// Negotiated tool set and the catalog generation it was computed from.
    negotiated: Option<(u64, Arc<EffectiveToolSet>)>,
}

impl Session {
    /// Creates a persistent session.
    #[must_use]
    pub const fn persistent(default_cluster: Option<String>) -> Self {
        Self {
            mode: TransportMode::Persistent,
            default_cluster,
            negotiated: None,
        }
    }

    /// Creates a single-request stateless session.
    #[must_use]
    pub const fn stateless(default_cluster: Option<String>) -> Self {
        Self {
            mode: TransportMode::Stateless,
            default_cluster,
            negotiated: None,
        }
    }

    /// Delivery mode.
    #[must_use]
    pub const fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Session default cluster.
    #[must_use]
    pub fn default_cluster(&self) -> Option<&str> {
        self.default_cluster.as_deref()
    }
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// One tool invocation.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Visible tool name.
    pub tool_name: String,
    /// Raw arguments.
    pub arguments: Value,
    /// Explicit target cluster.
    pub cluster_selector: Option<String>,
    /// Timeout override.
    pub timeout: Option<Duration>,
}

impl InvocationRequest {
    /// Creates a request with no selector or timeout override.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            cluster_selector: None,
            timeout: None,
        }
    }
}

/// Result of one invocation with routing facts for auditing.
#[derive(Debug)]
pub struct DispatchReport {
    /// Success payload or classified failure.
    pub outcome: Result<ToolOutput, DispatchError>,
    /// Cluster the call was routed to, once resolved.
    pub cluster: Option<String>,
    /// Handler attempts made.
    pub attempts: u32,
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Builds a policy from configuration.
    #[must_use]
    pub const fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Timeout when a request does not override it.
    pub default_timeout: Duration,
    /// Retry policy for read-only calls.
    pub retry: RetryPolicy,
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Routes invocations to tool handlers.
pub struct Dispatcher {
    /// Current catalog.
    catalog: SnapshotCell<InstalledCatalog>,
    /// Install counter.
    generation: AtomicU64,
    /// Connection pool.
    connections: Arc<ConnectionManager>,
    /// Tuning.
    settings: DispatchSettings,
}

impl Dispatcher {
    /// Creates a dispatcher over an initial catalog.
    #[must_use]
    pub fn new(
        catalog: ToolCatalog,
        connections: Arc<ConnectionManager>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            catalog: SnapshotCell::new(InstalledCatalog {
                generation: 0,
                catalog,
            }),
            generation: AtomicU64::new(0),
            connections,
            settings,
        }
    }

    /// Installs a new catalog. In-flight calls keep the snapshot they
    /// started with.
    pub fn install(&self, catalog: ToolCatalog) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.catalog.store(InstalledCatalog {
            generation,
            catalog,
        });
    }

    /// Connection pool.
    #[must_use]
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Returns true when more than one cluster profile is configured.
    #[must_use]
    pub fn is_multi_cluster(&self) -> bool {
        self.connections.profiles().len() > 1
    }

    /// Returns the tool set visible to a session.
    ///
    /// Persistent sessions keep the set negotiated on first use until a new
    /// catalog is installed. Stateless sessions recompute on every call.
    pub async fn effective_tools(&self, session: &mut Session) -> Arc<EffectiveToolSet> {
        let installed = self.catalog.load();
        self.negotiate(&installed, session).await
    }

    /// Effective set for `session` computed from one installed catalog.
    async fn negotiate(
        &self,
        installed: &InstalledCatalog,
        session: &mut Session,
    ) -> Arc<EffectiveToolSet> {
        if session.mode == TransportMode::Persistent
            && let Some((generation, tools)) = &session.negotiated
            && *generation == installed.generation
        {
            return Arc::clone(tools);
        }
        let version = self.session_version(session).await;
        let tools =
            Arc::new(installed.catalog.policy.apply(&installed.catalog.registry, version));
        if session.mode == TransportMode::Persistent {
            session.negotiated = Some((installed.generation, Arc::clone(&tools)));
        }
        tools
    }

    /// Version of the session's default cluster, when one resolves.
    async fn session_version(&self, session: &Session) -> Option<ClusterVersion> {
        let profile_id = self.resolve_cluster(None, session).ok()?;
        match self.connections.get_connection(&profile_id).await {
            Ok(connection) => self.connections.cluster_version(&connection).await,
            Err(err) => {
                debug!(cluster = %profile_id, error = %err, "version gate disabled for tool listing");
                None
            }
        }
    }

    /// Runs one invocation.
    ///
    /// The timeout covers negotiation, connection setup, version probes, and
    /// every handler attempt.
    pub async fn dispatch(&self, request: InvocationRequest, session: &mut Session) -> DispatchReport {
        let timeout = request.timeout.unwrap_or(self.settings.default_timeout);
        let tool_name = request.tool_name.clone();
        let mut cluster = None;
        let mut attempts = 0;
        let call = self.run(request, session, &mut cluster, &mut attempts);
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                tool: tool_name,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        DispatchReport {
            outcome,
            cluster,
            attempts,
        }
    }

    /// Steps 1 through 6 against a single catalog snapshot.
    async fn run(
        &self,
        request: InvocationRequest,
        session: &mut Session,
        cluster: &mut Option<String>,
        attempts: &mut u32,
    ) -> Result<ToolOutput, DispatchError> {
        let installed = self.catalog.load();
        let tools = self.negotiate(&installed, session).await;
        let Some(tool) = tools.get(&request.tool_name) else {
            return Err(DispatchError::ToolNotFound(request.tool_name));
        };

        let (arguments, embedded_selector) = split_selector(request.arguments);
        tool.tool.validator.validate(&arguments).map_err(DispatchError::Validation)?;

        let selector = request.cluster_selector.or(embedded_selector);
        let profile_id = self.resolve_cluster(selector, session)?;
        cluster.replace(profile_id.clone());
        let connection = self.connections.get_connection(&profile_id).await?;

        let definition = tool.definition();
        if !definition.versions.is_unbounded()
            && let Some(version) = self.connections.cluster_version(&connection).await
            && !definition.versions.contains(&version)
        {
            return Err(DispatchError::Incompatible {
                name: tool.name.clone(),
                cluster: profile_id,
                version,
                supported: definition.versions,
            });
        }

        let access = definition.access_for(&arguments);
        if !installed.catalog.policy.allow_write() && access == ToolAccess::Mutating {
            return Err(DispatchError::WriteDisabled {
                tool: tool.name.clone(),
            });
        }

        self.invoke_with_retry(tool, arguments, access, &connection, attempts).await
    }

    /// Invokes the handler, retrying retryable read-only failures.
    async fn invoke_with_retry(
        &self,
        tool: &EffectiveTool,
        arguments: Value,
        access: ToolAccess,
        connection: &ClusterConnection,
        attempts: &mut u32,
    ) -> Result<ToolOutput, DispatchError> {
        let retry = self.settings.retry;
        let handler = &tool.definition().handler;
        loop {
            *attempts += 1;
            match handler.invoke(arguments.clone(), connection).await {
                Ok(output) => return Ok(output),
                Err(HandlerError::Upstream(err))
                    if err.is_retryable()
                        && access == ToolAccess::ReadOnly
                        && *attempts < retry.max_attempts =>
                {
                    let delay = retry.delay_after(*attempts);
                    warn!(
                        tool = %tool.name,
                        cluster = %connection.profile().id,
                        attempt = *attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying tool call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Resolves the target profile id.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ClusterResolution`] when the selector names
    /// no profile or no unambiguous default exists.
    pub fn resolve_cluster(
        &self,
        selector: Option<String>,
        session: &Session,
    ) -> Result<String, DispatchError> {
        let profiles = self.connections.profiles();
        let requested = selector
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| session.default_cluster.clone());
        if let Some(id) = requested {
            return match profiles.get(&id) {
                Some(_) => Ok(id),
                None => Err(DispatchError::ClusterResolution {
                    message: format!("unknown cluster: {id}"),
                    available: profiles.ids(),
                }),
            };
        }
        if let Some(profile) = profiles.single() {
            return Ok(profile.id.clone());
        }
        let message = if profiles.is_empty() {
            "no cluster profiles are configured".to_string()
        } else {
            format!("{} clusters are configured and none was selected", profiles.len())
        };
        Err(DispatchError::ClusterResolution {
            message,
            available: profiles.ids(),
        })
    }
}

/// Separates the embedded cluster selector from tool arguments.
fn split_selector(arguments: Value) -> (Value, Option<String>) {
    match arguments {
        Value::Object(mut map) => {
            let selector = match map.remove(CLUSTER_SELECTOR_ARGUMENT) {
                Some(Value::String(value)) => Some(value),
                Some(other) => {
                    map.insert(CLUSTER_SELECTOR_ARGUMENT.to_string(), other);
                    None
                }
                None => None,
            };
            (Value::Object(map), selector)
        }
        other => (other, None),
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Per-invocation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The tool is not visible to the session.
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    /// The target cluster's version is outside the tool's bounds.
    #[error("tool {name} is not available on cluster {cluster} (version {version}); supported: {supported}")]
    Incompatible {
        /// Visible tool name.
        name: String,
        /// Target cluster.
        cluster: String,
        /// Target cluster version.
        version: ClusterVersion,
        /// Tool version bounds.
        supported: VersionRange,
    },
    /// Arguments do not satisfy the input schema.
    #[error("invalid arguments: {0}")]
    Validation(ArgumentError),
    /// No target cluster could be chosen.
    #[error("{message}")]
    ClusterResolution {
        /// Failure detail.
        message: String,
        /// Configured profile ids.
        available: Vec<String>,
    },
    /// Credentials could not be resolved for the target cluster.
    #[error(transparent)]
    AuthResolution(AuthResolutionError),
    /// The cluster rejected or failed the request.
    #[error(transparent)]
    Upstream(UpstreamError),
    /// The call exceeded its timeout.
    #[error("tool {tool} timed out after {timeout_ms} ms")]
    Timeout {
        /// Visible tool name.
        tool: String,
        /// Effective timeout.
        timeout_ms: u64,
    },
    /// Unexpected handler failure.
    #[error("{0}")]
    Handler(String),
    /// A mutating call was attempted under write protection.
    #[error("tool {tool} would modify the cluster and writes are disabled")]
    WriteDisabled {
        /// Visible tool name.
        tool: String,
    },
}

impl DispatchError {
    /// Stable wire label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ToolNotFound(_)
            | Self::Incompatible {
                ..
            } => "tool_not_found",
            Self::Validation(_) => "validation_error",
            Self::ClusterResolution {
                ..
            } => "cluster_resolution_error",
            Self::AuthResolution(_) => "auth_resolution_error",
            Self::Upstream(UpstreamError::Client {
                ..
            }) => "upstream_client_error",
            Self::Upstream(_) => "upstream_server_error",
            Self::Timeout {
                ..
            } => "tool_timeout",
            Self::Handler(_) => "handler_error",
            Self::WriteDisabled {
                ..
            } => "write_disabled",
        }
    }

    /// Structured detail for the wire, when any.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Incompatible {
                cluster,
                version,
                supported,
                ..
            } => Some(json!({
                "cluster": cluster,
                "cluster_version": version.to_string(),
                "supported_versions": supported.to_string(),
            })),
            Self::Validation(ArgumentError {
                field: Some(field),
                ..
            }) => Some(json!({"field": field})),
            Self::ClusterResolution {
                available,
                ..
            } => Some(json!({"available_clusters": available})),
            Self::Upstream(err) => err.status().map(|status| json!({"status": status})),
            Self::Timeout {
                timeout_ms,
                ..
            } => Some(json!({"timeout_ms": timeout_ms})),
            _ => None,
        }
    }
}

impl From<HandlerError> for DispatchError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Upstream(err) => Self::Upstream(err),
            HandlerError::InvalidArguments(message) => Self::Validation(ArgumentError {
                field: None,
                message,
            }),
            HandlerError::Internal(message) => Self::Handler(message),
        }
    }
}

impl From<ConnectError> for DispatchError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Auth(err) => Self::AuthResolution(err),
            ConnectError::UnknownProfile(id) => Self::ClusterResolution {
                message: format!("unknown cluster: {id}"),
                available: Vec::new(),
            },
            ConnectError::Client(message) => Self::Handler(message),
        }
    }
}
