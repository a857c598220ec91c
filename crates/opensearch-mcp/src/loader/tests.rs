// crates/opensearch-mcp/src/loader/tests.rs
// ============================================================================
// Module: Tool Spec Loader Unit Tests
// Description: Fragment parsing, partial failure, and merge precedence.
// Purpose: Ensure malformed fragments never abort loading.
// Dependencies: opensearch-mcp
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions favor direct unwraps for clarity."
)]

use serde_json::json;

use super::SpecFragment;
use super::SpecParseError;
use super::load_builtin;
use super::load_from_specification;
use super::merge;
use super::predecessor;
use super::template_variables;
use crate::connection::HttpMethod;
use crate::connection::RequestBody;
use crate::definition::ToolAccess;
use crate::definition::ToolCategory;
use crate::definition::ToolSource;
use crate::version::ClusterVersion;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn document(path: &str, method: &str, operation: &serde_json::Value) -> String {
    json!({"paths": {path: {method: operation}}}).to_string()
}

fn cat_health() -> String {
    document(
        "/_cat/health",
        "get",
        &json!({
            "operationId": "cat.health",
            "summary": "Cluster health table.",
            "x-category": "cluster",
            "parameters": [{"name": "format", "in": "query", "schema": {"type": "string"}}]
        }),
    )
}

fn index_document() -> String {
    document(
        "/{index}/_doc/{id}",
        "put",
        &json!({
            "x-tool-name": "IndexDocumentTool",
            "description": "Indexes one document.",
            "x-version-added": "1.0.0",
            "x-version-removed": "3.0.0",
            "parameters": [
                {"name": "index", "in": "path", "required": true, "description": "Target index."},
                {"name": "id", "in": "path", "required": true},
                {"name": "refresh", "in": "query", "schema": {"type": "boolean"}}
            ],
            "requestBody": {"required": true, "content": {"application/json": {"schema": {"type": "object"}}}}
        }),
    )
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn newline_delimited_documents_each_load() {
    let text = format!("{}\n{}\n", cat_health(), index_document());
    let outcome = load_from_specification(&[SpecFragment::new("api.ndjson", text)]);
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    let names: Vec<_> = outcome.definitions.iter().map(|definition| definition.name.as_str()).collect();
    assert_eq!(names, vec!["cat_health", "IndexDocumentTool"]);
    assert!(outcome.definitions.iter().all(|definition| definition.source == ToolSource::DerivedFromSpec));
}

#[test]
fn operation_fields_are_derived() {
    let outcome = load_from_specification(&[SpecFragment::new("a.json", index_document())]);
    let definition = &outcome.definitions[0];
    assert_eq!(definition.description, "Indexes one document.");
    assert_eq!(definition.category, ToolCategory::Other);
    assert_eq!(definition.access, ToolAccess::Mutating);
    assert_eq!(definition.versions.min, Some(ClusterVersion::new(1, 0, 0)));
    assert!(definition.versions.contains(&ClusterVersion::new(2, 99, 99)));
    assert!(!definition.versions.contains(&ClusterVersion::new(3, 0, 0)));
    assert_eq!(definition.input_schema["required"], json!(["index", "id", "body"]));
    assert_eq!(definition.input_schema["properties"]["index"]["description"], "Target index.");
    assert_eq!(definition.input_schema["additionalProperties"], json!(false));
}

#[test]
fn malformed_fragment_is_skipped() {
    let fragments = [
        SpecFragment::new("good.json", cat_health()),
        SpecFragment::new("broken.json", "{\"paths\": {"),
        SpecFragment::new("other.json", json!({"openapi": "3.0.0"}).to_string()),
        SpecFragment::new("also-good.json", index_document()),
    ];
    let outcome = load_from_specification(&fragments);
    assert_eq!(outcome.definitions.len(), 2);
    assert!(matches!(outcome.warnings[0], SpecParseError::InvalidDocument { ref origin, .. } if origin == "broken.json"));
    assert!(matches!(outcome.warnings[1], SpecParseError::UnrecognizedDocument { .. }));
}

#[test]
fn bad_line_in_ndjson_spares_neighbours() {
    let text = format!("{}\nnot json\n{}", cat_health(), index_document());
    let outcome = load_from_specification(&[SpecFragment::new("mixed.ndjson", text)]);
    assert_eq!(outcome.definitions.len(), 2);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(matches!(outcome.warnings[0], SpecParseError::InvalidDocument { line: 2, .. }));
}

#[test]
fn unnamed_operation_is_skipped() {
    let text = document("/_stats", "get", &json!({"summary": "stats"}));
    let outcome = load_from_specification(&[SpecFragment::new("x.json", text)]);
    assert!(outcome.definitions.is_empty());
    assert!(matches!(outcome.warnings[0], SpecParseError::InvalidOperation { ref method, .. } if method == "GET"));
}

#[test]
fn unparsable_version_bound_is_dropped() {
    let text = document("/_x", "get", &json!({"operationId": "x", "x-version-added": "two"}));
    let outcome = load_from_specification(&[SpecFragment::new("x.json", text)]);
    assert_eq!(outcome.definitions.len(), 1);
    assert!(outcome.definitions[0].versions.is_unbounded());
    assert!(matches!(outcome.warnings[0], SpecParseError::InvalidVersionBound { .. }));
}

#[test]
fn duplicate_derived_names_keep_first() {
    let outcome = load_from_specification(&[
        SpecFragment::new("a.json", cat_health()),
        SpecFragment::new("b.json", cat_health()),
    ]);
    assert_eq!(outcome.definitions.len(), 1);
    assert!(matches!(outcome.warnings[0], SpecParseError::DuplicateName { ref origin, .. } if origin == "b.json"));
}

#[test]
fn read_only_extension_marks_post_as_read_only() {
    let text = document("/_search", "post", &json!({"operationId": "search", "x-read-only": true}));
    let outcome = load_from_specification(&[SpecFragment::new("s.json", text)]);
    assert_eq!(outcome.definitions[0].access, ToolAccess::ReadOnly);
}

#[test]
fn builtins_win_on_merge() {
    let text = document("/_cluster/health", "get", &json!({"x-tool-name": "ClusterHealthTool"}));
    let derived = load_from_specification(&[SpecFragment::new("h.json", text)]).definitions;
    let builtin = load_builtin();
    let builtin_count = builtin.len();
    let merged = merge(builtin, derived);
    assert_eq!(merged.len(), builtin_count);
    let health = merged.iter().find(|definition| definition.name == "ClusterHealthTool").unwrap();
    assert_eq!(health.source, ToolSource::Builtin);
}

// ============================================================================
// SECTION: Handler
// ============================================================================

#[test]
fn handler_substitutes_path_and_forwards_query_and_body() {
    let outcome = load_from_specification(&[SpecFragment::new("a.json", index_document())]);
    let handler = super::SpecOperationHandler {
        method: HttpMethod::Put,
        path_template: "/{index}/_doc/{id}".to_string(),
        path_params: vec!["index".to_string(), "id".to_string()],
        query_params: vec!["refresh".to_string()],
        has_body: true,
        ndjson_body: false,
    };
    assert_eq!(outcome.definitions[0].argument_names().len(), 4);
    let request = handler
        .request(&json!({"index": "logs", "id": 7, "refresh": true, "body": {"a": 1}}))
        .unwrap();
    assert_eq!(request.path, "/logs/_doc/7");
    assert_eq!(request.query, vec![("refresh".to_string(), "true".to_string())]);
    assert_eq!(request.body, Some(RequestBody::Json(json!({"a": 1}))));
    assert!(handler.request(&json!({"index": "a/b", "id": "1"})).is_err());
}

#[test]
fn template_variables_are_extracted() {
    assert_eq!(template_variables("/{index}/_doc/{id}").unwrap(), vec!["index", "id"]);
    assert!(template_variables("/{index").is_err());
    assert!(template_variables("/{}").is_err());
}

#[test]
fn predecessor_steps_below_removed_version() {
    assert_eq!(predecessor(ClusterVersion::new(2, 1, 3)), Some(ClusterVersion::new(2, 1, 2)));
    assert_eq!(predecessor(ClusterVersion::new(2, 0, 0)), Some(ClusterVersion::new(1, u64::MAX, u64::MAX)));
    assert_eq!(predecessor(ClusterVersion::new(0, 0, 0)), None);
}
