// crates/opensearch-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: MCP server implementations for stdio and HTTP transports.
// Purpose: Expose OpenSearch tools via JSON-RPC 2.0.
// Dependencies: opensearch-mcp-config, axum, tokio
// ============================================================================

//! ## Overview
//! The MCP server exposes cluster tools using JSON-RPC 2.0 over one of two
//! transports, both routed through one [`Dispatcher`]:
//!
//! - **stdio** (persistent): newline-delimited JSON on stdin and stdout. One
//!   session per process; requests are handled strictly in order.
//! - **http** (stateless): `POST /mcp` on axum. Every request builds a fresh
//!   session; the `x-opensearch-cluster` header selects its default cluster.
//!
//! Per-invocation failures are returned as JSON-RPC errors whose `data`
//! carries `{error_kind, message, details}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use opensearch_mcp_config::EnvSnapshot;
use opensearch_mcp_config::OpenSearchMcpConfig;
use opensearch_mcp_config::ServerTransport;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing::warn;

use crate::audit::McpAuditEvent;
use crate::audit::McpAuditEventParams;
use crate::audit::McpAuditSink;
use crate::audit::McpMethod;
use crate::audit::audit_sink_from_config;
use crate::auth::AwsCredentialSources;
use crate::connection::ConnectionManager;
use crate::connection::HttpConnectionFactory;
use crate::definition::ToolCategory;
use crate::dispatch::DispatchError;
use crate::dispatch::DispatchSettings;
use crate::dispatch::Dispatcher;
use crate::dispatch::InvocationRequest;
use crate::dispatch::RetryPolicy;
use crate::dispatch::Session;
use crate::dispatch::ToolCatalog;
use crate::filter::FilterPolicy;
use crate::loader::SpecFragment;
use crate::loader::load_builtin;
use crate::loader::load_from_specification;
use crate::loader::merge;
use crate::profile::ProfileStore;
use crate::registry::ToolRegistry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header selecting the request-scoped default cluster.
pub const CLUSTER_HEADER: &str = "x-opensearch-cluster";
/// Protocol version reported when the client does not propose one.
const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";
/// Server name reported during initialization.
const SERVER_NAME: &str = "opensearch-mcp";

// ============================================================================
// SECTION: MCP Server
// ============================================================================

/// MCP server instance.
pub struct McpServer {
    /// Shared request handling state.
    state: Arc<ServerState>,
    /// Bind address for the HTTP transport.
    bind: Option<String>,
}

impl McpServer {
    /// Builds a new MCP server from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when initialization fails.
    pub fn from_config(config: &OpenSearchMcpConfig, env: EnvSnapshot) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let profiles = Arc::new(ProfileStore::from_config(config));
        let factory = Arc::new(HttpConnectionFactory::new(
            env,
            Arc::new(AwsCredentialSources),
            config.auth.allow_no_auth,
        ));
        let connections = Arc::new(ConnectionManager::new(profiles, factory));
        let audit = audit_sink_from_config(&config.server.audit)
            .map_err(|err| McpServerError::Init(format!("audit log: {err}")))?;
        Self::from_parts(config, connections, audit)
    }

    /// Builds a server over prepared connections and audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the tool catalog cannot be built.
    pub fn from_parts(
        config: &OpenSearchMcpConfig,
        connections: Arc<ConnectionManager>,
        audit: Arc<dyn McpAuditSink>,
    ) -> Result<Self, McpServerError> {
        let catalog = build_catalog(config)?;
        info!(
            transport = config.server.transport.as_str(),
            clusters = connections.profiles().len(),
            tools = catalog.registry.len(),
            allow_write = catalog.policy.allow_write(),
            "mcp server initialized"
        );
        let settings = DispatchSettings {
            default_timeout: Duration::from_millis(config.server.default_timeout_ms),
            retry: RetryPolicy::from_config(&config.retry),
        };
        let state = ServerState {
            dispatcher: Dispatcher::new(catalog, connections, settings),
            audit,
            transport: config.server.transport,
            max_body_bytes: config.server.max_body_bytes,
        };
        Ok(Self {
            state: Arc::new(state),
            bind: config.server.bind.clone(),
        })
    }

    /// Rebuilds the tool registry and filter policy and installs both.
    /// Cluster profiles and transport settings are not reloaded.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the new configuration is invalid; the
    /// previous catalog stays installed.
    pub fn reload(&self, config: &OpenSearchMcpConfig) -> Result<(), McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let catalog = build_catalog(config)?;
        let tools = catalog.registry.len();
        self.state.dispatcher.install(catalog);
        info!(tools, "tool catalog reloaded");
        Ok(())
    }

    /// Serves requests using the configured transport.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the server fails.
    pub async fn serve(&self) -> Result<(), McpServerError> {
        match self.state.transport {
            ServerTransport::Stdio => {
                let reader = tokio::io::BufReader::new(tokio::io::stdin());
                serve_lines(&self.state, reader, tokio::io::stdout()).await
            }
            ServerTransport::Http => serve_http(Arc::clone(&self.state), self.bind.as_deref()).await,
        }
    }
}

/// Builds the tool catalog: built-ins, derived tools, and filter policy.
///
/// # Errors
///
/// Returns [`McpServerError`] when specification files or override files
/// cannot be read or the registry cannot be built.
pub fn build_catalog(config: &OpenSearchMcpConfig) -> Result<ToolCatalog, McpServerError> {
    let sources = config
        .specification
        .read_sources()
        .map_err(|err| McpServerError::Config(err.to_string()))?;
    let fragments: Vec<SpecFragment> = sources.into_iter().map(SpecFragment::from).collect();
    let derived = load_from_specification(&fragments).definitions;
    let registry = ToolRegistry::build(merge(load_builtin(), derived))
        .map_err(|err| McpServerError::Init(err.to_string()))?;
    let overrides =
        config.resolved_overrides().map_err(|err| McpServerError::Config(err.to_string()))?;
    let policy = FilterPolicy::compile(&config.filter_config(), &overrides);
    policy.log_warnings();
    Ok(ToolCatalog::new(registry, policy))
}

// ============================================================================
// SECTION: Stdio Transport
// ============================================================================

/// Serves newline-delimited JSON-RPC until the reader is exhausted.
async fn serve_lines<R, W>(state: &ServerState, reader: R, mut writer: W) -> Result<(), McpServerError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut session = Session::persistent(state.dispatcher.connections().profiles().default_id().map(str::to_string));
    let mut lines = reader.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|err| McpServerError::Transport(format!("stdio read failed: {err}")))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let Some((_, response)) = parse_request(state, &mut session, line.as_bytes()).await else {
            continue;
        };
        let mut payload = serde_json::to_vec(&response)
            .map_err(|_| McpServerError::Transport("json-rpc serialization failed".to_string()))?;
        payload.push(b'\n');
        writer
            .write_all(&payload)
            .await
            .map_err(|err| McpServerError::Transport(format!("stdio write failed: {err}")))?;
        writer
            .flush()
            .await
            .map_err(|err| McpServerError::Transport(format!("stdio write failed: {err}")))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Serves JSON-RPC requests over HTTP.
async fn serve_http(state: Arc<ServerState>, bind: Option<&str>) -> Result<(), McpServerError> {
    let bind = bind.ok_or_else(|| McpServerError::Config("bind address required".to_string()))?;
    let addr: SocketAddr =
        bind.parse().map_err(|_| McpServerError::Config("invalid bind address".to_string()))?;
    let app = http_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|_| McpServerError::Transport("http bind failed".to_string()))?;
    info!(%addr, "http transport listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|_| McpServerError::Transport("http server failed".to_string()))
}

/// Builds the axum router for the HTTP transport.
fn http_router(state: Arc<ServerState>) -> Router {
    Router::new().route("/mcp", post(handle_http)).with_state(state)
}

/// Handles HTTP JSON-RPC requests.
async fn handle_http(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let default_cluster = headers
        .get(CLUSTER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| state.dispatcher.connections().profiles().default_id().map(str::to_string));
    let mut session = Session::stateless(default_cluster);
    match parse_request(&state, &mut session, &bytes).await {
        Some((status, response)) => (status, axum::Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

// ============================================================================
// SECTION: JSON-RPC Handling
// ============================================================================

/// Shared state for both transports.
struct ServerState {
    /// Invocation pipeline.
    dispatcher: Dispatcher,
    /// Audit sink.
    audit: Arc<dyn McpAuditSink>,
    /// Configured transport.
    transport: ServerTransport,
    /// Maximum allowed request size.
    max_body_bytes: usize,
}

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier. Absent for notifications.
    #[serde(default)]
    id: Option<Value>,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    const fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response without structured data.
    fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Human-readable error message.
    message: String,
    /// Structured failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Tool call parameters for JSON-RPC requests.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    arguments: Value,
    /// Explicit target cluster.
    #[serde(default)]
    cluster: Option<String>,
    /// Timeout override in milliseconds.
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// Tool descriptor returned by `tools/list`.
#[derive(Debug, Serialize)]
struct ToolDescriptor {
    /// Visible name.
    name: String,
    /// Visible description.
    description: String,
    /// Advertised argument schema.
    #[serde(rename = "inputSchema")]
    input_schema: Value,
    /// Tool category.
    category: ToolCategory,
}

/// Tool list response payload.
#[derive(Debug, Serialize)]
struct ToolListResult {
    /// Visible tools.
    tools: Vec<ToolDescriptor>,
}

/// Tool call response payload.
#[derive(Debug, Serialize)]
struct ToolCallResult {
    /// Tool output content.
    content: Vec<ToolContent>,
    /// Structured tool output.
    #[serde(rename = "structuredContent")]
    structured_content: Value,
}

/// Tool output payloads for JSON-RPC responses.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolContent {
    /// Text tool output holding serialized JSON.
    Text {
        /// Serialized payload.
        text: String,
    },
}

/// Routing facts gathered while handling a request.
#[derive(Default)]
struct RequestFacts {
    /// Tool name for `tools/call`.
    tool: Option<String>,
    /// Target cluster.
    cluster: Option<String>,
    /// Handler attempts.
    attempts: u32,
    /// Error kind label.
    error_kind: Option<&'static str>,
}

/// Parses a raw payload and handles it. Returns `None` for notifications.
async fn parse_request(
    state: &ServerState,
    session: &mut Session,
    bytes: &[u8],
) -> Option<(StatusCode, JsonRpcResponse)> {
    let started = Instant::now();
    if bytes.len() > state.max_body_bytes {
        let response = JsonRpcResponse::failure(Value::Null, -32070, "request body too large");
        record(state, None, McpMethod::Invalid, &RequestFacts::default(), &response, started);
        return Some((StatusCode::PAYLOAD_TOO_LARGE, response));
    }
    match serde_json::from_slice::<JsonRpcRequest>(bytes) {
        Ok(request) => handle_request(state, session, request, started).await,
        Err(_) => {
            let response = JsonRpcResponse::failure(Value::Null, -32600, "invalid json-rpc request");
            record(state, None, McpMethod::Invalid, &RequestFacts::default(), &response, started);
            Some((StatusCode::BAD_REQUEST, response))
        }
    }
}

/// Dispatches a JSON-RPC request.
async fn handle_request(
    state: &ServerState,
    session: &mut Session,
    request: JsonRpcRequest,
    started: Instant,
) -> Option<(StatusCode, JsonRpcResponse)> {
    let method = McpMethod::classify(&request.method);
    let request_id = request.id.as_ref().map(Value::to_string);
    let Some(id) = request.id else {
        // Notifications never receive a reply.
        return None;
    };
    let mut facts = RequestFacts::default();
    let (status, response) = if request.jsonrpc == "2.0" {
        match method {
            McpMethod::Initialize => initialize(state, session, id, request.params.as_ref()).await,
            McpMethod::Ping => (StatusCode::OK, JsonRpcResponse::success(id, json!({}))),
            McpMethod::ToolsList => list_tools(state, session, id).await,
            McpMethod::ToolsCall => call_tool(state, session, id, request.params, &mut facts).await,
            McpMethod::Notification | McpMethod::Invalid | McpMethod::Other => {
                (StatusCode::BAD_REQUEST, JsonRpcResponse::failure(id, -32601, "method not found"))
            }
        }
    } else {
        (StatusCode::BAD_REQUEST, JsonRpcResponse::failure(id, -32600, "invalid json-rpc version"))
    };
    record(state, request_id, method, &facts, &response, started);
    Some((status, response))
}

/// Handles `initialize`.
async fn initialize(
    state: &ServerState,
    session: &mut Session,
    id: Value,
    params: Option<&Value>,
) -> (StatusCode, JsonRpcResponse) {
    let protocol_version = params
        .and_then(|params| params.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROTOCOL_VERSION)
        .to_string();
    state.dispatcher.effective_tools(session).await;
    let result = json!({
        "protocolVersion": protocol_version,
        "capabilities": {"tools": {"listChanged": false}},
        "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")}
    });
    (StatusCode::OK, JsonRpcResponse::success(id, result))
}

/// Handles `tools/list`.
async fn list_tools(state: &ServerState, session: &mut Session, id: Value) -> (StatusCode, JsonRpcResponse) {
    let tools = state.dispatcher.effective_tools(session).await;
    let multi_cluster = state.dispatcher.is_multi_cluster();
    let result = ToolListResult {
        tools: tools
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.listed_schema(multi_cluster),
                category: tool.category(),
            })
            .collect(),
    };
    match serde_json::to_value(result) {
        Ok(value) => (StatusCode::OK, JsonRpcResponse::success(id, value)),
        Err(_) => (StatusCode::OK, JsonRpcResponse::failure(id, -32060, "serialization failed")),
    }
}

/// Handles `tools/call`.
async fn call_tool(
    state: &ServerState,
    session: &mut Session,
    id: Value,
    params: Option<Value>,
    facts: &mut RequestFacts,
) -> (StatusCode, JsonRpcResponse) {
    let Ok(params) = serde_json::from_value::<ToolCallParams>(params.unwrap_or(Value::Null)) else {
        facts.error_kind = Some("validation_error");
        return (StatusCode::BAD_REQUEST, JsonRpcResponse::failure(id, -32602, "invalid tool params"));
    };
    facts.tool = Some(params.name.clone());
    let request = InvocationRequest {
        tool_name: params.name,
        arguments: params.arguments,
        cluster_selector: params.cluster,
        timeout: params.timeout_ms.map(Duration::from_millis),
    };
    let report = state.dispatcher.dispatch(request, session).await;
    facts.cluster = report.cluster;
    facts.attempts = report.attempts;
    match report.outcome {
        Ok(output) => {
            let text = serde_json::to_string(&output.payload).unwrap_or_default();
            let result = ToolCallResult {
                content: vec![ToolContent::Text {
                    text,
                }],
                structured_content: output.payload,
            };
            match serde_json::to_value(result) {
                Ok(value) => (StatusCode::OK, JsonRpcResponse::success(id, value)),
                Err(_) => (StatusCode::OK, JsonRpcResponse::failure(id, -32060, "serialization failed")),
            }
        }
        Err(err) => {
            facts.error_kind = Some(err.kind());
            jsonrpc_error(id, &err)
        }
    }
}

/// Builds a JSON-RPC error response for a dispatch failure.
fn jsonrpc_error(id: Value, error: &DispatchError) -> (StatusCode, JsonRpcResponse) {
    let (status, code) = match error {
        DispatchError::ToolNotFound(_) => (StatusCode::BAD_REQUEST, -32601),
        DispatchError::Validation(_) => (StatusCode::BAD_REQUEST, -32602),
        DispatchError::Incompatible {
            ..
        } => (StatusCode::OK, -32004),
        DispatchError::WriteDisabled {
            ..
        } => (StatusCode::OK, -32003),
        DispatchError::ClusterResolution {
            ..
        } => (StatusCode::OK, -32010),
        DispatchError::AuthResolution(_) => (StatusCode::OK, -32011),
        DispatchError::Upstream(_) => (StatusCode::OK, -32020),
        DispatchError::Timeout {
            ..
        } => (StatusCode::OK, -32030),
        DispatchError::Handler(_) => (StatusCode::OK, -32050),
    };
    let message = error.to_string();
    let mut data = json!({"error_kind": error.kind(), "message": message});
    if let Some(details) = error.details() {
        data["details"] = details;
    }
    (
        status,
        JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: Some(data),
            }),
        },
    )
}

/// Emits one audit event.
fn record(
    state: &ServerState,
    request_id: Option<String>,
    method: McpMethod,
    facts: &RequestFacts,
    response: &JsonRpcResponse,
    started: Instant,
) {
    let error_code = response.error.as_ref().map(|error| error.code);
    if error_code.is_some() && facts.error_kind.is_none() {
        warn!(method = ?method, code = ?error_code, "json-rpc request rejected");
    }
    state.audit.record(&McpAuditEvent::new(McpAuditEventParams {
        request_id,
        transport: state.transport,
        method,
        tool: facts.tool.clone(),
        cluster: facts.cluster.clone(),
        error_code,
        error_kind: facts.error_kind,
        attempts: facts.attempts,
        duration: started.elapsed(),
    }));
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// MCP server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
