// crates/opensearch-mcp/src/handlers.rs
// ============================================================================
// Module: Built-in Tools
// Description: Hand-authored tool catalog and its request handlers.
// Purpose: Map each built-in tool onto one cluster REST call.
// Dependencies: async-trait, serde_json
// ============================================================================

//! ## Overview
//! Every built-in tool is a variant of [`BuiltinTool`]. A variant knows its
//! name, description, category, version bounds, input schema, and how to turn
//! validated arguments into an [`ApiRequest`]. Responses are decoded (merging
//! newline-delimited documents) and lightly shaped where a tool promises a
//! narrower result.
//!
//! Path arguments are inserted as single segments: values containing `/` or
//! consisting only of dots are rejected so a tool cannot reach an endpoint
//! other than its own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;

use crate::connection::ApiRequest;
use crate::connection::ClusterConnection;
use crate::connection::HttpMethod;
use crate::connection::RequestBody;
use crate::definition::HandlerError;
use crate::definition::ToolAccess;
use crate::definition::ToolCategory;
use crate::definition::ToolDefinition;
use crate::definition::ToolHandler;
use crate::definition::ToolOutput;
use crate::definition::ToolSource;
use crate::ndjson;
use crate::version::ClusterVersion;
use crate::version::VersionRange;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of tasks returned by the long-running task tool.
const DEFAULT_TASK_LIMIT: u64 = 10;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Built-in tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTool {
    /// Lists indices or describes one index.
    ListIndex,
    /// Index mappings.
    IndexMapping,
    /// Query DSL search.
    SearchIndex,
    /// Shard table for an index.
    GetShards,
    /// Cluster health.
    ClusterHealth,
    /// Document count.
    Count,
    /// Score explanation for one document.
    Explain,
    /// Multi-search.
    Msearch,
    /// Arbitrary REST call.
    GenericApi,
    /// Cluster state.
    GetClusterState,
    /// Shard allocation per node.
    GetAllocation,
    /// Mappings, settings, and aliases.
    GetIndexInfo,
    /// Index statistics.
    GetIndexStats,
    /// Lucene segments.
    GetSegments,
    /// Node table.
    CatNodes,
    /// Node details.
    GetNodes,
    /// Hot threads.
    GetNodesHotThreads,
    /// Long-running tasks.
    GetLongRunningTasks,
    /// Top queries.
    GetQueryInsights,
}

impl BuiltinTool {
    /// Every built-in tool in catalog order.
    pub const ALL: [Self; 19] = [
        Self::ListIndex,
        Self::IndexMapping,
        Self::SearchIndex,
        Self::GetShards,
        Self::ClusterHealth,
        Self::Count,
        Self::Explain,
        Self::Msearch,
        Self::GenericApi,
        Self::GetClusterState,
        Self::GetAllocation,
        Self::GetIndexInfo,
        Self::GetIndexStats,
        Self::GetSegments,
        Self::CatNodes,
        Self::GetNodes,
        Self::GetNodesHotThreads,
        Self::GetLongRunningTasks,
        Self::GetQueryInsights,
    ];

    /// Registry name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ListIndex => "ListIndexTool",
            Self::IndexMapping => "IndexMappingTool",
            Self::SearchIndex => "SearchIndexTool",
            Self::GetShards => "GetShardsTool",
            Self::ClusterHealth => "ClusterHealthTool",
            Self::Count => "CountTool",
            Self::Explain => "ExplainTool",
            Self::Msearch => "MsearchTool",
            Self::GenericApi => "GenericOpenSearchApiTool",
            Self::GetClusterState => "GetClusterStateTool",
            Self::GetAllocation => "GetAllocationTool",
            Self::GetIndexInfo => "GetIndexInfoTool",
            Self::GetIndexStats => "GetIndexStatsTool",
            Self::GetSegments => "GetSegmentsTool",
            Self::CatNodes => "CatNodesTool",
            Self::GetNodes => "GetNodesTool",
            Self::GetNodesHotThreads => "GetNodesHotThreadsTool",
            Self::GetLongRunningTasks => "GetLongRunningTasksTool",
            Self::GetQueryInsights => "GetQueryInsightsTool",
        }
    }

    /// Default description.
    const fn description(self) -> &'static str {
        match self {
            Self::ListIndex => {
                "Lists indices in the cluster. By default returns only index names. Set \
                 include_detail=true for full cat.indices metadata. When index is provided, returns \
                 detailed information for that index including mappings and settings."
            }
            Self::IndexMapping => "Retrieves the mapping and setting information for an index.",
            Self::SearchIndex => "Searches an index using a query written in the query DSL.",
            Self::GetShards => "Gets information about the shards of an index.",
            Self::ClusterHealth => {
                "Returns the health status of the cluster, optionally scoped to an index."
            }
            Self::Count => "Counts documents in an index, optionally matching a query.",
            Self::Explain => "Explains how a specific document scores against a query.",
            Self::Msearch => {
                "Runs several searches in one request. Each body entry is a header line or a query line."
            }
            Self::GenericApi => {
                "Calls any cluster REST endpoint. Supports GET, HEAD, POST, PUT, DELETE and PATCH with \
                 query parameters and a request body. Use it for APIs without a dedicated tool."
            }
            Self::GetClusterState => {
                "Gets the current cluster state. Can be narrowed to a metric and to indices."
            }
            Self::GetAllocation => "Gets shard allocation across nodes from /_cat/allocation.",
            Self::GetIndexInfo => {
                "Gets mappings, settings, and aliases for an index. Supports wildcards."
            }
            Self::GetIndexStats => {
                "Gets index statistics such as document count, store size, and indexing and search \
                 metrics. Can be narrowed to a metric."
            }
            Self::GetSegments => "Gets Lucene segment information, optionally for specific indices.",
            Self::CatNodes => {
                "Lists node-level information including roles, load, disk, heap, and RAM. Can be \
                 narrowed to specific columns."
            }
            Self::GetNodes => {
                "Gets static node details such as host, JVM, settings, thread pools, and plugins. Can \
                 be narrowed to nodes and metrics."
            }
            Self::GetNodesHotThreads => "Gets hot threads for cluster nodes from /_nodes/hot_threads.",
            Self::GetLongRunningTasks => {
                "Gets the longest-running tasks in the cluster, sorted by running time descending."
            }
            Self::GetQueryInsights => "Gets top queries from the /_insights/top_queries endpoint.",
        }
    }

    /// Tool category.
    const fn category(self) -> ToolCategory {
        match self {
            Self::ListIndex
            | Self::IndexMapping
            | Self::SearchIndex
            | Self::GetShards
            | Self::ClusterHealth
            | Self::Count
            | Self::Explain
            | Self::Msearch
            | Self::GenericApi => ToolCategory::Core,
            Self::GetClusterState | Self::GetAllocation => ToolCategory::Cluster,
            Self::GetIndexInfo | Self::GetIndexStats | Self::GetSegments => ToolCategory::Index,
            Self::CatNodes | Self::GetNodes | Self::GetNodesHotThreads => ToolCategory::Nodes,
            Self::GetLongRunningTasks | Self::GetQueryInsights => ToolCategory::Diagnostics,
        }
    }

    /// Supported cluster versions.
    const fn versions(self) -> VersionRange {
        let min = match self {
            Self::IndexMapping
            | Self::SearchIndex
            | Self::GetShards
            | Self::ClusterHealth
            | Self::Count
            | Self::Explain
            | Self::Msearch => None,
            Self::GetQueryInsights => Some(ClusterVersion::new(2, 12, 0)),
            _ => Some(ClusterVersion::new(1, 0, 0)),
        };
        VersionRange {
            min,
            max: None,
        }
    }

    /// JSON Schema for the tool's arguments.
    fn input_schema(self) -> Value {
        let index = |description: &str| json!({"type": "string", "minLength": 1, "description": description});
        match self {
            Self::ListIndex => object_schema(
                json!({
                    "index": {
                        "type": "string",
                        "description": "Index to describe. When set, detailed information for this index is returned."
                    },
                    "include_detail": {
                        "type": "boolean",
                        "default": false,
                        "description": "Return full cat.indices metadata instead of index names only."
                    }
                }),
                &[],
            ),
            Self::IndexMapping => object_schema(
                json!({"index": index("Index to get mapping information for.")}),
                &["index"],
            ),
            Self::SearchIndex => object_schema(
                json!({
                    "index": index("Index to search."),
                    "query": {"type": "object", "description": "Search request body in query DSL format."}
                }),
                &["index", "query"],
            ),
            Self::GetShards => object_schema(
                json!({"index": index("Index to get shard information for.")}),
                &["index"],
            ),
            Self::ClusterHealth => object_schema(
                json!({"index": {"type": "string", "description": "Limit health to this index."}}),
                &[],
            ),
            Self::Count => object_schema(
                json!({
                    "index": index("Index to count documents in."),
                    "body": {"type": "object", "description": "Optional query DSL body restricting the count."}
                }),
                &["index"],
            ),
            Self::Explain => object_schema(
                json!({
                    "index": index("Index containing the document."),
                    "id": {"type": "string", "minLength": 1, "description": "Document id."},
                    "body": {"type": "object", "description": "Query DSL body to explain."}
                }),
                &["index", "id", "body"],
            ),
            Self::Msearch => object_schema(
                json!({
                    "index": {"type": "string", "description": "Default index for searches without one."},
                    "body": {
                        "type": "array",
                        "minItems": 1,
                        "items": {"type": "object"},
                        "description": "Alternating header and query objects."
                    }
                }),
                &["body"],
            ),
            Self::GenericApi => object_schema(
                json!({
                    "path": {"type": "string", "description": "API path starting with /, such as /_cat/indices."},
                    "method": {
                        "type": "string",
                        "enum": ["GET", "HEAD", "POST", "PUT", "DELETE", "PATCH",
                                 "get", "head", "post", "put", "delete", "patch"],
                        "default": "GET",
                        "description": "HTTP method."
                    },
                    "query_params": {
                        "type": "object",
                        "description": "Query parameters as key-value pairs."
                    },
                    "body": {"description": "Request body for POST, PUT, and PATCH requests."}
                }),
                &["path"],
            ),
            Self::GetClusterState => object_schema(
                json!({
                    "metric": {"type": "string", "description": "Metric to return, such as nodes or metadata."},
                    "index": {"type": "string", "description": "Indices to filter by."}
                }),
                &[],
            ),
            Self::GetAllocation => object_schema(
                json!({"node_id": {"type": "string", "description": "Limit output to these nodes."}}),
                &[],
            ),
            Self::GetIndexInfo => object_schema(
                json!({"index": index("Index name or wildcard pattern.")}),
                &["index"],
            ),
            Self::GetIndexStats => object_schema(
                json!({
                    "index": index("Index name or wildcard pattern."),
                    "metric": {"type": "string", "description": "Statistic group, such as docs or store."}
                }),
                &["index"],
            ),
            Self::GetSegments => object_schema(
                json!({"index": {"type": "string", "description": "Limit output to these indices."}}),
                &[],
            ),
            Self::CatNodes => object_schema(
                json!({"metrics": {"type": "string", "description": "Comma-separated columns to return."}}),
                &[],
            ),
            Self::GetNodes => object_schema(
                json!({
                    "node_id": {"type": "string", "description": "Comma-separated node ids or names."},
                    "metric": {"type": "string", "description": "Comma-separated metrics, such as jvm or os."}
                }),
                &[],
            ),
            Self::GetNodesHotThreads => object_schema(
                json!({
                    "node_id": {"type": "string", "description": "Comma-separated node ids or names."},
                    "threads": {"type": "integer", "minimum": 1, "description": "Threads per node."}
                }),
                &[],
            ),
            Self::GetLongRunningTasks => object_schema(
                json!({
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "default": DEFAULT_TASK_LIMIT,
                        "description": "Maximum number of tasks to return."
                    }
                }),
                &[],
            ),
            Self::GetQueryInsights => object_schema(json!({}), &[]),
        }
    }

    /// Builds the normalized definition.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            handler: Arc::new(self),
            versions: self.versions(),
            category: self.category(),
            source: ToolSource::Builtin,
            // The generic tool refines this per call from its method argument.
            access: ToolAccess::ReadOnly,
        }
    }

    /// Builds the cluster request for validated arguments.
    fn request(self, args: &Value) -> Result<ApiRequest, HandlerError> {
        let request = match self {
            Self::ListIndex => match optional_segment(args, "index")? {
                Some(index) => ApiRequest::get(format!("/{index}")),
                None => ApiRequest::get("/_cat/indices").query("format", "json"),
            },
            Self::IndexMapping => ApiRequest::get(format!("/{}/_mapping", segment(args, "index")?)),
            Self::SearchIndex => {
                ApiRequest::new(HttpMethod::Post, format!("/{}/_search", segment(args, "index")?))
                    .body(RequestBody::Json(object_arg(args, "query")?))
            }
            Self::GetShards => {
                ApiRequest::get(format!("/_cat/shards/{}", segment(args, "index")?)).query("format", "json")
            }
            Self::ClusterHealth => match optional_segment(args, "index")? {
                Some(index) => ApiRequest::get(format!("/_cluster/health/{index}")),
                None => ApiRequest::get("/_cluster/health"),
            },
            Self::Count => {
                let path = format!("/{}/_count", segment(args, "index")?);
                match args.get("body") {
                    Some(body) if !body.is_null() => {
                        ApiRequest::new(HttpMethod::Post, path).body(RequestBody::Json(body.clone()))
                    }
                    _ => ApiRequest::get(path),
                }
            }
            Self::Explain => ApiRequest::new(
                HttpMethod::Post,
                format!("/{}/_explain/{}", segment(args, "index")?, segment(args, "id")?),
            )
            .body(RequestBody::Json(object_arg(args, "body")?)),
            Self::Msearch => {
                let path = match optional_segment(args, "index")? {
                    Some(index) => format!("/{index}/_msearch"),
                    None => "/_msearch".to_string(),
                };
                let lines = args
                    .get("body")
                    .and_then(Value::as_array)
                    .cloned()
                    .ok_or_else(|| invalid("body must be an array of objects"))?;
                ApiRequest::new(HttpMethod::Post, path).body(RequestBody::Ndjson(lines))
            }
            Self::GenericApi => generic_request(args)?,
            Self::GetClusterState => {
                let metric = optional_segment(args, "metric")?;
                let index = optional_segment(args, "index")?;
                match (metric, index) {
                    (None, None) => ApiRequest::get("/_cluster/state"),
                    (Some(metric), None) => ApiRequest::get(format!("/_cluster/state/{metric}")),
                    (metric, Some(index)) => ApiRequest::get(format!(
                        "/_cluster/state/{}/{index}",
                        metric.unwrap_or_else(|| "_all".to_string())
                    )),
                }
            }
            Self::GetAllocation => match optional_segment(args, "node_id")? {
                Some(node) => ApiRequest::get(format!("/_cat/allocation/{node}")),
                None => ApiRequest::get("/_cat/allocation"),
            }
            .query("format", "json"),
            Self::GetIndexInfo => ApiRequest::get(format!("/{}", segment(args, "index")?)),
            Self::GetIndexStats => {
                let index = segment(args, "index")?;
                match optional_segment(args, "metric")? {
                    Some(metric) => ApiRequest::get(format!("/{index}/_stats/{metric}")),
                    None => ApiRequest::get(format!("/{index}/_stats")),
                }
            }
            Self::GetSegments => match optional_segment(args, "index")? {
                Some(index) => ApiRequest::get(format!("/_cat/segments/{index}")),
                None => ApiRequest::get("/_cat/segments"),
            }
            .query("format", "json"),
            Self::CatNodes => ApiRequest::get("/_cat/nodes")
                .query("format", "json")
                .query_opt("h", string_arg(args, "metrics")),
            Self::GetNodes => {
                let mut path = "/_nodes".to_string();
                if let Some(node) = optional_segment(args, "node_id")? {
                    path = format!("{path}/{node}");
                }
                if let Some(metric) = optional_segment(args, "metric")? {
                    path = format!("{path}/{metric}");
                }
                ApiRequest::get(path)
            }
            Self::GetNodesHotThreads => {
                let path = match optional_segment(args, "node_id")? {
                    Some(node) => format!("/_nodes/{node}/hot_threads"),
                    None => "/_nodes/hot_threads".to_string(),
                };
                ApiRequest::get(path).query_opt(
                    "threads",
                    args.get("threads").and_then(Value::as_u64).map(|threads| threads.to_string()),
                )
            }
            Self::GetLongRunningTasks => ApiRequest::get("/_cat/tasks")
                .query("format", "json")
                .query("detailed", "true")
                .query("s", "running_time:desc"),
            Self::GetQueryInsights => ApiRequest::get("/_insights/top_queries"),
        };
        Ok(request)
    }

    /// Shapes a decoded response.
    fn shape(self, args: &Value, payload: Value) -> Value {
        match self {
            Self::ListIndex if args.get("index").is_none_or(Value::is_null) => {
                let detailed = args.get("include_detail").and_then(Value::as_bool).unwrap_or(false);
                if detailed {
                    return payload;
                }
                match payload {
                    Value::Array(rows) => Value::Array(
                        rows.into_iter().filter_map(|row| row.get("index").cloned()).collect(),
                    ),
                    other => other,
                }
            }
            Self::GetLongRunningTasks => {
                let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(DEFAULT_TASK_LIMIT);
                let limit = usize::try_from(limit).unwrap_or(usize::MAX);
                match payload {
                    Value::Array(rows) => Value::Array(rows.into_iter().take(limit).collect()),
                    other => other,
                }
            }
            _ => payload,
        }
    }
}

#[async_trait]
impl ToolHandler for BuiltinTool {
    async fn invoke(
        &self,
        arguments: Value,
        connection: &ClusterConnection,
    ) -> Result<ToolOutput, HandlerError> {
        let request = self.request(&arguments)?;
        let payload = connection.execute_json(&request).await?;
        Ok(ToolOutput::new(self.shape(&arguments, payload)))
    }

    fn access_for(&self, arguments: &Value) -> Option<ToolAccess> {
        match self {
            Self::GenericApi => {
                let method = generic_method(arguments).unwrap_or(HttpMethod::Get);
                Some(if method.is_read_only() { ToolAccess::ReadOnly } else { ToolAccess::Mutating })
            }
            _ => None,
        }
    }
}

/// Returns every built-in definition.
#[must_use]
pub fn builtin_definitions() -> Vec<ToolDefinition> {
    BuiltinTool::ALL.into_iter().map(BuiltinTool::definition).collect()
}

// ============================================================================
// SECTION: Generic API Tool
// ============================================================================

/// Parses the generic tool's method argument.
fn generic_method(args: &Value) -> Result<HttpMethod, HandlerError> {
    match args.get("method").and_then(Value::as_str) {
        None => Ok(HttpMethod::Get),
        Some(raw) => HttpMethod::parse(raw).ok_or_else(|| {
            invalid(format!(
                "invalid HTTP method {raw}; expected GET, HEAD, POST, PUT, DELETE, or PATCH"
            ))
        }),
    }
}

/// Builds the generic tool's request.
fn generic_request(args: &Value) -> Result<ApiRequest, HandlerError> {
    let method = generic_method(args)?;
    let path = args.get("path").and_then(Value::as_str).unwrap_or_default();
    if !path.starts_with('/') {
        return Err(invalid("API path must start with \"/\""));
    }
    let (path, inline_query) = path.split_once('?').map_or((path, None), |(path, query)| (path, Some(query)));
    let mut request = ApiRequest::new(method, path);
    if let Some(query) = inline_query {
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            request = request.query(key, value);
        }
    }
    if let Some(params) = args.get("query_params").and_then(Value::as_object) {
        for (key, value) in params {
            request = match value {
                Value::Null => request,
                Value::String(text) => request.query(key, text.clone()),
                other => request.query(key, other.to_string()),
            };
        }
    }
    let accepts_body = matches!(method, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch);
    match args.get("body") {
        Some(body) if accepts_body && !body.is_null() => Ok(request.body(generic_body(body)?)),
        _ => Ok(request),
    }
}

/// Converts the generic tool's body argument. Strings are parsed as one or
/// more newline-delimited JSON documents.
fn generic_body(body: &Value) -> Result<RequestBody, HandlerError> {
    let Value::String(text) = body else {
        return Ok(RequestBody::Json(body.clone()));
    };
    let mut documents = Vec::new();
    for document in ndjson::split_documents(text) {
        let value = document
            .result
            .map_err(|err| invalid(format!("body line {} is not JSON: {err}", document.line)))?;
        documents.push(value);
    }
    match documents.len() {
        0 => Err(invalid("body is empty")),
        1 => Ok(RequestBody::Json(documents.remove(0))),
        _ => Ok(RequestBody::Ndjson(documents)),
    }
}

// ============================================================================
// SECTION: Argument Helpers
// ============================================================================

/// Builds a closed object schema.
fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Builds an invalid-arguments error.
fn invalid(message: impl Into<String>) -> HandlerError {
    HandlerError::InvalidArguments(message.into())
}

/// Reads a non-empty string argument.
fn string_arg(args: &Value, name: &str) -> Option<String> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Reads an optional argument used as one path segment.
fn optional_segment(args: &Value, name: &str) -> Result<Option<String>, HandlerError> {
    match string_arg(args, name) {
        None => Ok(None),
        Some(value) if value.contains('/') || value.chars().all(|ch| ch == '.') => {
            Err(invalid(format!("{name} must be a single path segment")))
        }
        Some(value) => Ok(Some(value)),
    }
}

/// Reads a required argument used as one path segment.
fn segment(args: &Value, name: &str) -> Result<String, HandlerError> {
    optional_segment(args, name)?.ok_or_else(|| invalid(format!("{name} is required")))
}

/// Reads a required object argument.
fn object_arg(args: &Value, name: &str) -> Result<Value, HandlerError> {
    args.get(name)
        .filter(|value| value.is_object())
        .cloned()
        .ok_or_else(|| invalid(format!("{name} must be an object")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
