// crates/opensearch-mcp-config/src/lib.rs
// ============================================================================
// Module: OpenSearch MCP Config Library
// Description: Canonical config model, environment overlay, and validation.
// Purpose: Single source of truth for opensearch-mcp.toml semantics.
// Dependencies: serde, serde_yaml, toml, tracing
// ============================================================================

//! ## Overview
//! `opensearch-mcp-config` defines the configuration model for the OpenSearch
//! MCP server: cluster profiles, transport selection, retry and timeout
//! bounds, tool filter rules, and per-tool overrides. Startup configuration is
//! validated fail-closed; filter and override rules are data only and are
//! interpreted fail-open by the tool filter.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod env;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use env::EnvSnapshot;
pub use tools::FilterConfig;
pub use tools::OverrideConfig;
pub use tools::ToolOverride;
