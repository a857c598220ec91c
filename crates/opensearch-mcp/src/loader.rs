// crates/opensearch-mcp/src/loader.rs
// ============================================================================
// Module: Tool Spec Loader
// Description: Built-in and specification-derived tool definitions.
// Purpose: Normalize every tool source into ToolDefinition values.
// Dependencies: serde_json, tracing
// ============================================================================

//! ## Overview
//! [`load_builtin`] returns the hand-authored catalog.
//! [`load_from_specification`] converts OpenAPI-shaped fragments into derived
//! tools: each `paths.<path>.<method>` operation becomes one tool whose
//! handler substitutes path parameters, forwards query parameters, and sends
//! `body` when the operation declares a request body.
//!
//! Loading is partial-failure tolerant. A malformed document, unrecognized
//! document, or unusable operation is skipped and reported as a
//! [`SpecParseError`] warning; the remaining fragments still load. An
//! unparsable version bound is dropped with a warning rather than rejecting
//! the operation. [`merge`] deduplicates by name with built-ins first.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use opensearch_mcp_config::SpecificationSource;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

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
use crate::handlers::builtin_definitions;
use crate::ndjson;
use crate::validation::ArgumentValidator;
use crate::version::ClusterVersion;
use crate::version::VersionRange;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Operation keys recognized under a path item.
const METHOD_KEYS: [&str; 6] = ["get", "head", "post", "put", "delete", "patch"];
/// Argument name carrying the request body.
const BODY_ARGUMENT: &str = "body";
/// Maximum tool name length.
const MAX_TOOL_NAME_LENGTH: usize = 128;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One independently parseable specification input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecFragment {
    /// Label used in warnings, usually a file path.
    pub origin: String,
    /// One JSON document or newline-delimited JSON documents.
    pub text: String,
}

impl SpecFragment {
    /// Creates a fragment.
    #[must_use]
    pub fn new(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            text: text.into(),
        }
    }
}

impl From<SpecificationSource> for SpecFragment {
    fn from(source: SpecificationSource) -> Self {
        Self {
            origin: source.path.display().to_string(),
            text: source.text,
        }
    }
}

/// Derived definitions plus recovered failures.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// Successfully derived definitions, deduplicated by name.
    pub definitions: Vec<ToolDefinition>,
    /// Skipped inputs.
    pub warnings: Vec<SpecParseError>,
}

/// A recovered specification failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecParseError {
    /// A document is not valid JSON.
    #[error("{origin} line {line}: invalid JSON: {message}")]
    InvalidDocument {
        /// Fragment origin.
        origin: String,
        /// Line the document starts on.
        line: usize,
        /// Parser message.
        message: String,
    },
    /// A document has no `paths` object.
    #[error("{origin} line {line}: document has no paths object")]
    UnrecognizedDocument {
        /// Fragment origin.
        origin: String,
        /// Line the document starts on.
        line: usize,
    },
    /// An operation cannot be turned into a tool.
    #[error("{origin}: {method} {path}: {message}")]
    InvalidOperation {
        /// Fragment origin.
        origin: String,
        /// Path template.
        path: String,
        /// Upper-case method.
        method: String,
        /// Failure detail.
        message: String,
    },
    /// A version bound could not be parsed and was dropped.
    #[error("{origin}: tool {tool}: ignoring {field}: {message}")]
    InvalidVersionBound {
        /// Fragment origin.
        origin: String,
        /// Tool name.
        tool: String,
        /// Extension key.
        field: String,
        /// Parser message.
        message: String,
    },
    /// A second definition with the same name was dropped.
    #[error("duplicate tool {name} from {origin} ignored")]
    DuplicateName {
        /// Fragment origin.
        origin: String,
        /// Tool name.
        name: String,
    },
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Returns the hand-authored catalog.
#[must_use]
pub fn load_builtin() -> Vec<ToolDefinition> {
    builtin_definitions()
}

/// Derives tools from specification fragments. Never fails as a whole.
#[must_use]
pub fn load_from_specification(fragments: &[SpecFragment]) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();
    let mut seen = BTreeSet::new();
    for fragment in fragments {
        for document in ndjson::split_documents(&fragment.text) {
            let value = match document.result {
                Ok(value) => value,
                Err(err) => {
                    outcome.warnings.push(SpecParseError::InvalidDocument {
                        origin: fragment.origin.clone(),
                        line: document.line,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            let Some(paths) = value.get("paths").and_then(Value::as_object) else {
                outcome.warnings.push(SpecParseError::UnrecognizedDocument {
                    origin: fragment.origin.clone(),
                    line: document.line,
                });
                continue;
            };
            for (path, item) in paths {
                load_path_item(&fragment.origin, path, item, &mut seen, &mut outcome);
            }
        }
    }
    for warning in &outcome.warnings {
        warn!(warning = %warning, "specification input skipped");
    }
    outcome
}

/// Combines built-in and derived definitions. Built-ins win on name collision.
#[must_use]
pub fn merge(builtin: Vec<ToolDefinition>, derived: Vec<ToolDefinition>) -> Vec<ToolDefinition> {
    let names: BTreeSet<String> = builtin.iter().map(|definition| definition.name.clone()).collect();
    let mut merged = builtin;
    for definition in derived {
        if names.contains(&definition.name) {
            warn!(tool = %definition.name, "derived tool shadowed by built-in tool");
        } else {
            merged.push(definition);
        }
    }
    merged
}

/// Converts every operation of one path item.
fn load_path_item(
    origin: &str,
    path: &str,
    item: &Value,
    seen: &mut BTreeSet<String>,
    outcome: &mut LoadOutcome,
) {
    let Some(item) = item.as_object() else {
        outcome.warnings.push(SpecParseError::InvalidOperation {
            origin: origin.to_string(),
            path: path.to_string(),
            method: "*".to_string(),
            message: "path item is not an object".to_string(),
        });
        return;
    };
    let shared = item.get("parameters").and_then(Value::as_array).map_or(&[][..], Vec::as_slice);
    for key in METHOD_KEYS {
        let Some(operation) = item.get(key) else {
            continue;
        };
        let method = key.to_ascii_uppercase();
        let fail = |message: String| SpecParseError::InvalidOperation {
            origin: origin.to_string(),
            path: path.to_string(),
            method: method.clone(),
            message,
        };
        let parsed = match parse_operation(path, key, operation, shared) {
            Ok(parsed) => parsed,
            Err(message) => {
                outcome.warnings.push(fail(message));
                continue;
            }
        };
        if let Err(message) = ArgumentValidator::compile(&parsed.schema) {
            outcome.warnings.push(fail(format!("derived schema is invalid: {message}")));
            continue;
        }
        if !seen.insert(parsed.name.clone()) {
            outcome.warnings.push(SpecParseError::DuplicateName {
                origin: origin.to_string(),
                name: parsed.name,
            });
            continue;
        }
        let versions = version_bounds(origin, &parsed.name, operation, &mut outcome.warnings);
        outcome.definitions.push(parsed.into_definition(versions));
    }
}

// ============================================================================
// SECTION: Operation Parsing
// ============================================================================

/// Operation fields extracted from a specification.
struct ParsedOperation {
    /// Tool name.
    name: String,
    /// Tool description.
    description: String,
    /// Derived input schema.
    schema: Value,
    /// Tool category.
    category: ToolCategory,
    /// Access class.
    access: ToolAccess,
    /// Request handler.
    handler: SpecOperationHandler,
}

impl ParsedOperation {
    /// Builds the definition.
    fn into_definition(self, versions: VersionRange) -> ToolDefinition {
        ToolDefinition {
            name: self.name,
            description: self.description,
            input_schema: self.schema,
            handler: Arc::new(self.handler),
            versions,
            category: self.category,
            source: ToolSource::DerivedFromSpec,
            access: self.access,
        }
    }
}

/// Parses one operation.
fn parse_operation(
    path: &str,
    method_key: &str,
    operation: &Value,
    shared: &[Value],
) -> Result<ParsedOperation, String> {
    let operation = operation.as_object().ok_or("operation is not an object")?;
    let method = HttpMethod::parse(method_key).ok_or("unsupported method")?;
    if !path.starts_with('/') {
        return Err("path must start with /".to_string());
    }
    let raw_name = operation
        .get("x-tool-name")
        .or_else(|| operation.get("operationId"))
        .and_then(Value::as_str)
        .ok_or("operation has neither x-tool-name nor operationId")?;
    let name = sanitize_name(raw_name)?;
    let description = operation
        .get("description")
        .or_else(|| operation.get("summary"))
        .and_then(Value::as_str)
        .map_or_else(|| format!("{} {path}", method.as_str()), ToString::to_string);
    let category = operation
        .get("x-category")
        .and_then(Value::as_str)
        .and_then(ToolCategory::parse)
        .unwrap_or(ToolCategory::Other);
    let read_only = method.is_read_only()
        || operation.get("x-read-only").and_then(Value::as_bool).unwrap_or(false);

    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut path_params = Vec::new();
    let mut query_params = Vec::new();
    let declared = shared.iter().chain(
        operation.get("parameters").and_then(Value::as_array).map_or(&[][..], Vec::as_slice),
    );
    for parameter in declared {
        let name = parameter.get("name").and_then(Value::as_str).ok_or("parameter has no name")?;
        let location = parameter.get("in").and_then(Value::as_str).unwrap_or("query");
        let is_required = match location {
            "path" => {
                path_params.push(name.to_string());
                true
            }
            "query" => {
                query_params.push(name.to_string());
                parameter.get("required").and_then(Value::as_bool).unwrap_or(false)
            }
            _ => continue,
        };
        let mut schema = parameter.get("schema").cloned().unwrap_or_else(|| json!({"type": "string"}));
        if let (Some(object), Some(text)) =
            (schema.as_object_mut(), parameter.get("description").and_then(Value::as_str))
        {
            object.entry("description").or_insert_with(|| Value::String(text.to_string()));
        }
        properties.insert(name.to_string(), schema);
        if is_required && !required.contains(&name.to_string()) {
            required.push(name.to_string());
        }
    }
    for variable in template_variables(path)? {
        if !path_params.contains(&variable) {
            properties.insert(variable.clone(), json!({"type": "string"}));
            required.push(variable.clone());
            path_params.push(variable);
        }
    }

    let body = operation.get("requestBody");
    let ndjson_body = body
        .and_then(|body| body.pointer("/content/application~1x-ndjson"))
        .is_some();
    if let Some(body) = body {
        let mut schema = body
            .pointer("/content/application~1json/schema")
            .cloned()
            .unwrap_or_else(|| json!({}));
        if ndjson_body {
            schema = json!({"type": "array", "items": {"type": "object"}});
        }
        if let (Some(object), Some(text)) =
            (schema.as_object_mut(), body.get("description").and_then(Value::as_str))
        {
            object.entry("description").or_insert_with(|| Value::String(text.to_string()));
        }
        properties.insert(BODY_ARGUMENT.to_string(), schema);
        if body.get("required").and_then(Value::as_bool).unwrap_or(false) {
            required.push(BODY_ARGUMENT.to_string());
        }
    }

    Ok(ParsedOperation {
        name,
        description,
        schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        }),
        category,
        access: if read_only { ToolAccess::ReadOnly } else { ToolAccess::Mutating },
        handler: SpecOperationHandler {
            method,
            path_template: path.to_string(),
            path_params,
            query_params,
            has_body: body.is_some(),
            ndjson_body,
        },
    })
}

/// Replaces characters outside `[A-Za-z0-9_-]` with `_`.
fn sanitize_name(raw: &str) -> Result<String, String> {
    let name: String = raw
        .trim()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' { ch } else { '_' })
        .collect();
    if name.is_empty() || name.len() > MAX_TOOL_NAME_LENGTH {
        return Err(format!("tool name {raw:?} must be 1 to {MAX_TOOL_NAME_LENGTH} characters"));
    }
    Ok(name)
}

/// Extracts `{variable}` names from a path template.
fn template_variables(path: &str) -> Result<Vec<String>, String> {
    let mut variables = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1 ..];
        let end = after.find('}').ok_or("unterminated path variable")?;
        let name = &after[.. end];
        if name.is_empty() || name.contains('{') {
            return Err("malformed path variable".to_string());
        }
        variables.push(name.to_string());
        rest = &after[end + 1 ..];
    }
    Ok(variables)
}

/// Reads `x-version-added` / `x-version-removed`, dropping unparsable bounds.
/// The removed version is exclusive, so the inclusive maximum is its
/// predecessor.
fn version_bounds(
    origin: &str,
    tool: &str,
    operation: &Value,
    warnings: &mut Vec<SpecParseError>,
) -> VersionRange {
    let mut read = |field: &str| -> Option<ClusterVersion> {
        let raw = operation.get(field)?;
        let parsed = match raw {
            Value::String(text) => ClusterVersion::parse(text).map_err(|err| err.to_string()),
            other => Err(format!("expected a version string, got {other}")),
        };
        match parsed {
            Ok(version) => Some(version),
            Err(message) => {
                warnings.push(SpecParseError::InvalidVersionBound {
                    origin: origin.to_string(),
                    tool: tool.to_string(),
                    field: field.to_string(),
                    message,
                });
                None
            }
        }
    };
    let min = read("x-version-added");
    let max = read("x-version-removed").and_then(predecessor);
    VersionRange {
        min,
        max,
    }
}

/// Returns the greatest version strictly below `version`.
fn predecessor(version: ClusterVersion) -> Option<ClusterVersion> {
    match (version.major(), version.minor(), version.patch()) {
        (major, minor, patch) if patch > 0 => Some(ClusterVersion::new(major, minor, patch - 1)),
        (major, minor, _) if minor > 0 => Some(ClusterVersion::new(major, minor - 1, u64::MAX)),
        (major, _, _) if major > 0 => Some(ClusterVersion::new(major - 1, u64::MAX, u64::MAX)),
        _ => None,
    }
}

// ============================================================================
// SECTION: Derived Handler
// ============================================================================

/// Handler for one specification operation.
#[derive(Debug, Clone)]
pub struct SpecOperationHandler {
    /// HTTP method.
    method: HttpMethod,
    /// Path template with `{variable}` placeholders.
    path_template: String,
    /// Path parameter names.
    path_params: Vec<String>,
    /// Query parameter names.
    query_params: Vec<String>,
    /// Whether a `body` argument is forwarded.
    has_body: bool,
    /// Whether the body is sent as newline-delimited JSON.
    ndjson_body: bool,
}

impl SpecOperationHandler {
    /// Builds the cluster request for validated arguments.
    fn request(&self, args: &Value) -> Result<ApiRequest, HandlerError> {
        let mut path = self.path_template.clone();
        for name in &self.path_params {
            let value = args
                .get(name)
                .map(scalar_text)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| HandlerError::InvalidArguments(format!("{name} is required")))?;
            if value.contains('/') || value.chars().all(|ch| ch == '.') {
                return Err(HandlerError::InvalidArguments(format!(
                    "{name} must be a single path segment"
                )));
            }
            path = path.replace(&format!("{{{name}}}"), &value);
        }
        let mut request = ApiRequest::new(self.method, path);
        for name in &self.query_params {
            if let Some(value) = args.get(name).filter(|value| !value.is_null()) {
                request = request.query(name, scalar_text(value));
            }
        }
        if self.has_body
            && let Some(body) = args.get(BODY_ARGUMENT).filter(|body| !body.is_null())
        {
            let body = match (self.ndjson_body, body) {
                (true, Value::Array(lines)) => RequestBody::Ndjson(lines.clone()),
                _ => RequestBody::Json(body.clone()),
            };
            request = request.body(body);
        }
        Ok(request)
    }
}

#[async_trait]
impl ToolHandler for SpecOperationHandler {
    async fn invoke(
        &self,
        arguments: Value,
        connection: &ClusterConnection,
    ) -> Result<ToolOutput, HandlerError> {
        let request = self.request(&arguments)?;
        Ok(ToolOutput::new(connection.execute_json(&request).await?))
    }
}

/// Renders a scalar argument for a path or query position.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests;
