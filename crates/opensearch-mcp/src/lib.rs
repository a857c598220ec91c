// crates/opensearch-mcp/src/lib.rs
// ============================================================================
// Module: OpenSearch MCP
// Description: MCP server exposing OpenSearch cluster operations as tools.
// Purpose: Provide tool registry, filtering, dispatch, and transports.
// Dependencies: opensearch-mcp-config, axum, reqwest, tokio
// ============================================================================

//! ## Overview
//! OpenSearch MCP turns cluster operations into Model Context Protocol tools.
//! Tool definitions come from the built-in set and from API specification
//! fragments; a [`FilterPolicy`] decides which of them each session sees and
//! the [`Dispatcher`] validates, routes, bounds, and retries every call
//! against the selected cluster profile.
//!
//! Security posture: cluster credentials are resolved per profile and never
//! logged; write operations can be disabled globally.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod connection;
pub mod definition;
pub mod dispatch;
pub mod filter;
pub mod handlers;
pub mod loader;
pub mod ndjson;
pub mod profile;
pub mod registry;
pub mod server;
pub mod sigv4;
pub mod validation;
pub mod version;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::McpAuditEvent;
pub use audit::McpAuditSink;
pub use audit::McpFileAuditSink;
pub use audit::McpMethod;
pub use audit::McpNoopAuditSink;
pub use audit::McpOutcome;
pub use audit::McpStderrAuditSink;
pub use connection::ClusterConnection;
pub use connection::ConnectionManager;
pub use connection::HttpConnectionFactory;
pub use connection::UpstreamError;
pub use definition::ToolAccess;
pub use definition::ToolCategory;
pub use definition::ToolDefinition;
pub use definition::ToolHandler;
pub use dispatch::DispatchError;
pub use dispatch::Dispatcher;
pub use dispatch::InvocationRequest;
pub use dispatch::Session;
pub use dispatch::ToolCatalog;
pub use filter::EffectiveToolSet;
pub use filter::FilterPolicy;
pub use filter::compute;
pub use profile::ClusterProfile;
pub use profile::ProfileStore;
pub use registry::ToolRegistry;
pub use server::McpServer;
pub use server::McpServerError;
pub use server::build_catalog;
pub use version::ClusterVersion;
pub use version::VersionRange;
