// crates/opensearch-mcp/src/definition.rs
// ============================================================================
// Module: Tool Definitions
// Description: Uniform tool definition shape and the handler capability.
// Purpose: Normalize every tool source into one immutable definition type.
// Dependencies: async-trait, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`ToolDefinition`] is the single shape every tool source is normalized
//! into. Downstream components (registry, filter, dispatcher) depend only on
//! this type. Execution goes through the [`ToolHandler`] capability, which
//! receives validated arguments and a pooled [`ClusterConnection`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::connection::ClusterConnection;
use crate::connection::UpstreamError;
use crate::version::VersionRange;

// ============================================================================
// SECTION: Categories
// ============================================================================

/// Fixed tool categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Always-available essentials. Bypasses category-based exclusion.
    Core,
    /// Cluster-wide state and allocation.
    Cluster,
    /// Index-level metadata and statistics.
    Index,
    /// Query execution.
    Search,
    /// Node-level information.
    Nodes,
    /// Performance and task diagnostics.
    Diagnostics,
    /// Operations without a more specific category.
    Other,
}

impl ToolCategory {
    /// All categories in display order.
    pub const ALL: [Self; 7] = [
        Self::Core,
        Self::Cluster,
        Self::Index,
        Self::Search,
        Self::Nodes,
        Self::Diagnostics,
        Self::Other,
    ];

    /// Returns the stable label for this category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Cluster => "cluster",
            Self::Index => "index",
            Self::Search => "search",
            Self::Nodes => "nodes",
            Self::Diagnostics => "diagnostics",
            Self::Other => "other",
        }
    }

    /// Parses a category label, ignoring case.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|category| category.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a tool definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToolSource {
    /// Hand-authored tool shipped with the server.
    #[serde(rename = "builtin")]
    Builtin,
    /// Tool derived from an API specification fragment.
    #[serde(rename = "derived-from-spec")]
    DerivedFromSpec,
}

/// Whether a tool mutates cluster state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAccess {
    /// Safe to retry and allowed under write protection.
    ReadOnly,
    /// Never retried and hidden under write protection.
    Mutating,
}

// ============================================================================
// SECTION: Handler Capability
// ============================================================================

/// Successful handler output.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Structured result payload.
    pub payload: Value,
}

impl ToolOutput {
    /// Wraps a structured payload.
    #[must_use]
    pub const fn new(payload: Value) -> Self {
        Self {
            payload,
        }
    }
}

/// Executable capability behind a tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Executes the tool with validated arguments against a connection.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the call fails.
    async fn invoke(
        &self,
        arguments: Value,
        connection: &ClusterConnection,
    ) -> Result<ToolOutput, HandlerError>;

    /// Returns the access class for a specific call when it depends on the
    /// arguments. `None` defers to the definition's static access.
    fn access_for(&self, _arguments: &Value) -> Option<ToolAccess> {
        None
    }
}

/// Handler failures.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The upstream cluster rejected or failed the request.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Arguments passed schema validation but are semantically unusable.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// Unexpected handler failure.
    #[error("handler failed: {0}")]
    Internal(String),
}

// ============================================================================
// SECTION: Definition
// ============================================================================

/// Immutable, normalized tool definition.
#[derive(Clone)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema describing accepted arguments.
    pub input_schema: Value,
    /// Executable capability.
    pub handler: Arc<dyn ToolHandler>,
    /// Supported cluster version bounds.
    pub versions: VersionRange,
    /// Tool category.
    pub category: ToolCategory,
    /// Definition origin.
    pub source: ToolSource,
    /// Static access class.
    pub access: ToolAccess,
}

impl ToolDefinition {
    /// Resolves the access class of a specific call.
    #[must_use]
    pub fn access_for(&self, arguments: &Value) -> ToolAccess {
        self.handler.access_for(arguments).unwrap_or(self.access)
    }

    /// Returns the argument names declared in the input schema.
    #[must_use]
    pub fn argument_names(&self) -> Vec<&str> {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| properties.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("source", &self.source)
            .field("access", &self.access)
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}
