// crates/opensearch-mcp/src/filter/tests.rs
// ============================================================================
// Module: Tool Filter Unit Tests
// Description: Pipeline ordering, fail-open rules, and override handling.
// Purpose: Pin down which tools a session sees for a given configuration.
// Dependencies: opensearch-mcp, proptest
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions favor direct unwraps for clarity."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use opensearch_mcp_config::FilterConfig;
use opensearch_mcp_config::OverrideConfig;
use opensearch_mcp_config::ToolOverride;
use proptest::prelude::*;
use serde_json::Value;
use serde_json::json;

use super::CLUSTER_SELECTOR_ARGUMENT;
use super::FilterError;
use super::FilterPolicy;
use super::compute;
use crate::connection::ClusterConnection;
use crate::definition::HandlerError;
use crate::definition::ToolAccess;
use crate::definition::ToolCategory;
use crate::definition::ToolDefinition;
use crate::definition::ToolHandler;
use crate::definition::ToolOutput;
use crate::definition::ToolSource;
use crate::registry::ToolRegistry;
use crate::version::ClusterVersion;
use crate::version::VersionRange;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

struct Inert;

#[async_trait]
impl ToolHandler for Inert {
    async fn invoke(
        &self,
        _arguments: Value,
        _connection: &ClusterConnection,
    ) -> Result<ToolOutput, HandlerError> {
        Ok(ToolOutput::new(Value::Null))
    }
}

fn tool(name: &str, category: ToolCategory, min: Option<(u64, u64, u64)>) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: format!("{name} description"),
        input_schema: json!({
            "type": "object",
            "properties": {"index": {"type": "string", "description": "Index name."}},
            "additionalProperties": false
        }),
        handler: Arc::new(Inert),
        versions: VersionRange {
            min: min.map(|(major, minor, patch)| ClusterVersion::new(major, minor, patch)),
            max: None,
        },
        category,
        source: ToolSource::Builtin,
        access: ToolAccess::ReadOnly,
    }
}

fn mutating(name: &str, category: ToolCategory) -> ToolDefinition {
    ToolDefinition {
        access: ToolAccess::Mutating,
        ..tool(name, category, None)
    }
}

fn registry(definitions: Vec<ToolDefinition>) -> ToolRegistry {
    ToolRegistry::build(definitions).unwrap()
}

fn sample_registry() -> ToolRegistry {
    registry(vec![
        tool("SearchTool", ToolCategory::Core, None),
        tool("HotThreadsTool", ToolCategory::Diagnostics, Some((2, 0, 0))),
        tool("NodesTool", ToolCategory::Nodes, None),
        tool("SegmentsTool", ToolCategory::Index, None),
        mutating("DeleteIndexTool", ToolCategory::Index),
    ])
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

fn overrides(entries: &[(&str, ToolOverride)]) -> OverrideConfig {
    OverrideConfig {
        tools: entries.iter().map(|(name, entry)| ((*name).to_string(), entry.clone())).collect(),
    }
}

fn visible(
    registry: &ToolRegistry,
    version: Option<ClusterVersion>,
    filter: &FilterConfig,
) -> Vec<String> {
    compute(registry, version, filter, &OverrideConfig::default())
        .names()
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

#[test]
fn unrestricted_filter_shows_everything() {
    let registry = sample_registry();
    let names = visible(&registry, None, &FilterConfig::default());
    assert_eq!(names.len(), registry.len());
}

#[test]
fn version_gate_applies_before_category_allow() {
    let registry = registry(vec![
        tool("A", ToolCategory::Core, None),
        tool("B", ToolCategory::Diagnostics, Some((2, 0, 0))),
    ]);
    let filter = FilterConfig {
        categories: strings(&["core"]),
        ..FilterConfig::default()
    };
    assert_eq!(visible(&registry, Some(ClusterVersion::new(1, 5, 0)), &filter), vec!["A"]);

    let open = FilterConfig::default();
    assert_eq!(visible(&registry, Some(ClusterVersion::new(1, 5, 0)), &open), vec!["A"]);
    assert_eq!(visible(&registry, Some(ClusterVersion::new(2, 0, 0)), &open), vec!["A", "B"]);
    assert_eq!(visible(&registry, None, &open), vec!["A", "B"]);
}

#[test]
fn version_gate_applies_to_core_tools() {
    let registry = registry(vec![tool("A", ToolCategory::Core, Some((3, 0, 0)))]);
    assert!(visible(&registry, Some(ClusterVersion::new(2, 0, 0)), &FilterConfig::default()).is_empty());
}

#[test]
fn core_tools_bypass_category_allow() {
    let filter = FilterConfig {
        categories: strings(&["nodes"]),
        ..FilterConfig::default()
    };
    assert_eq!(visible(&sample_registry(), None, &filter), vec!["SearchTool", "NodesTool"]);
}

#[test]
fn include_names_and_patterns_join_the_allow_set() {
    let filter = FilterConfig {
        categories: strings(&["nodes"]),
        include: strings(&["segmentstool"]),
        include_regex: strings(&["hot"]),
        ..FilterConfig::default()
    };
    assert_eq!(
        visible(&sample_registry(), None, &filter),
        vec!["SearchTool", "HotThreadsTool", "NodesTool", "SegmentsTool"]
    );
}

#[test]
fn patterns_are_anchored_at_the_start() {
    let filter = FilterConfig {
        include_regex: strings(&["Tool"]),
        ..FilterConfig::default()
    };
    assert_eq!(visible(&sample_registry(), None, &filter), vec!["SearchTool"]);
}

#[test]
fn exclusion_beats_inclusion_even_for_core() {
    let filter = FilterConfig {
        include: strings(&["NodesTool"]),
        exclude: strings(&["NodesTool", "SearchTool"]),
        ..FilterConfig::default()
    };
    assert!(visible(&sample_registry(), None, &filter).is_empty());

    let pattern = FilterConfig {
        exclude_regex: strings(&["search"]),
        ..FilterConfig::default()
    };
    assert!(!visible(&sample_registry(), None, &pattern).contains(&"SearchTool".to_string()));
}

#[test]
fn excluded_categories_spare_core() {
    let filter = FilterConfig {
        exclude_categories: strings(&["index", "core"]),
        ..FilterConfig::default()
    };
    assert_eq!(
        visible(&sample_registry(), None, &filter),
        vec!["SearchTool", "HotThreadsTool", "NodesTool"]
    );
}

#[test]
fn write_protection_hides_mutating_tools() {
    let filter = FilterConfig {
        allow_write: false,
        ..FilterConfig::default()
    };
    let names = visible(&sample_registry(), None, &filter);
    assert!(!names.contains(&"DeleteIndexTool".to_string()));
    assert_eq!(names.len(), 4);
}

#[test]
fn custom_categories_resolve_to_members() {
    let mut custom_categories = BTreeMap::new();
    custom_categories.insert("triage".to_string(), strings(&["NodesTool", "segmentstool"]));
    let filter = FilterConfig {
        categories: strings(&["triage"]),
        custom_categories,
        ..FilterConfig::default()
    };
    assert_eq!(
        visible(&sample_registry(), None, &filter),
        vec!["SearchTool", "NodesTool", "SegmentsTool"]
    );
}

#[test]
fn core_alias_resolves() {
    let filter = FilterConfig {
        categories: strings(&["core_tools"]),
        ..FilterConfig::default()
    };
    let policy = FilterPolicy::compile(&filter, &OverrideConfig::default());
    assert!(policy.warnings().is_empty());
    assert_eq!(policy.apply(&sample_registry(), None).names(), vec!["SearchTool"]);
}

// ============================================================================
// SECTION: Fail-Open
// ============================================================================

#[test]
fn invalid_pattern_is_ignored() {
    let filter = FilterConfig {
        exclude_regex: strings(&["(unclosed", "nodes"]),
        ..FilterConfig::default()
    };
    let set = compute(&sample_registry(), None, &filter, &OverrideConfig::default());
    assert_eq!(set.len(), 4);
    assert!(matches!(
        set.warnings()[0],
        FilterError::InvalidPattern { rule: "exclude_regex", ref pattern, .. } if pattern == "(unclosed"
    ));
}

#[test]
fn invalid_include_pattern_does_not_activate_allow_gate() {
    let filter = FilterConfig {
        include_regex: strings(&["[bad"]),
        ..FilterConfig::default()
    };
    assert_eq!(visible(&sample_registry(), None, &filter).len(), 5);
}

#[test]
fn unknown_category_is_ignored() {
    let filter = FilterConfig {
        categories: strings(&["bogus"]),
        ..FilterConfig::default()
    };
    let set = compute(&sample_registry(), None, &filter, &OverrideConfig::default());
    assert_eq!(set.len(), 5);
    assert_eq!(
        set.warnings(),
        &[FilterError::UnknownCategory {
            rule: "categories",
            name: "bogus".to_string(),
        }]
    );
}

// ============================================================================
// SECTION: Overrides
// ============================================================================

#[test]
fn override_replaces_description_only_for_its_tool() {
    let registry = registry(vec![
        tool("A", ToolCategory::Core, None),
        tool("B", ToolCategory::Diagnostics, None),
    ]);
    let entries = overrides(&[(
        "A",
        ToolOverride {
            description: Some("X".to_string()),
            ..ToolOverride::default()
        },
    )]);
    let set = compute(&registry, None, &FilterConfig::default(), &entries);
    assert_eq!(set.get("A").unwrap().description, "X");
    assert_eq!(set.get("B").unwrap().description, "B description");
}

#[test]
fn override_renames_and_describes_arguments() {
    let entries = overrides(&[(
        "NodesTool",
        ToolOverride {
            display_name: Some("list_nodes".to_string()),
            arguments: BTreeMap::from([
                ("index".to_string(), "Which index.".to_string()),
                ("missing".to_string(), "Nope.".to_string()),
            ]),
            ..ToolOverride::default()
        },
    )]);
    let set = compute(&sample_registry(), None, &FilterConfig::default(), &entries);
    assert!(set.get("NodesTool").is_none());
    let renamed = set.get("list_nodes").unwrap();
    assert_eq!(renamed.registry_name(), "NodesTool");
    assert_eq!(renamed.input_schema["properties"]["index"]["description"], "Which index.");
    assert!(matches!(set.warnings()[0], FilterError::UnknownOverrideArgument { .. }));
}

#[test]
fn filters_match_display_names() {
    let entries = overrides(&[(
        "NodesTool",
        ToolOverride {
            display_name: Some("list_nodes".to_string()),
            ..ToolOverride::default()
        },
    )]);
    let filter = FilterConfig {
        exclude: strings(&["LIST_NODES"]),
        ..FilterConfig::default()
    };
    let set = compute(&sample_registry(), None, &filter, &entries);
    assert!(set.get("list_nodes").is_none());
    assert_eq!(set.len(), 4);
}

#[test]
fn colliding_rename_is_ignored() {
    let entries = overrides(&[(
        "NodesTool",
        ToolOverride {
            display_name: Some("SearchTool".to_string()),
            ..ToolOverride::default()
        },
    )]);
    let set = compute(&sample_registry(), None, &FilterConfig::default(), &entries);
    assert_eq!(set.get("SearchTool").unwrap().registry_name(), "SearchTool");
    assert_eq!(set.get("NodesTool").unwrap().registry_name(), "NodesTool");
    assert!(matches!(set.warnings()[0], FilterError::NameCollision { .. }));
}

#[test]
fn disabled_override_hides_tool_and_unknown_tool_warns() {
    let entries = overrides(&[
        (
            "SegmentsTool",
            ToolOverride {
                enabled: Some(false),
                ..ToolOverride::default()
            },
        ),
        ("GhostTool", ToolOverride::default()),
    ]);
    let set = compute(&sample_registry(), None, &FilterConfig::default(), &entries);
    assert!(set.get("SegmentsTool").is_none());
    assert_eq!(
        set.warnings(),
        &[FilterError::UnknownOverrideTool {
            tool: "GhostTool".to_string(),
        }]
    );
}

#[test]
fn listed_schema_adds_cluster_selector_only_for_multiple_clusters() {
    let set = compute(&sample_registry(), None, &FilterConfig::default(), &OverrideConfig::default());
    let search = set.get("SearchTool").unwrap();
    assert!(search.listed_schema(false)["properties"].get(CLUSTER_SELECTOR_ARGUMENT).is_none());
    assert_eq!(
        search.listed_schema(true)["properties"][CLUSTER_SELECTOR_ARGUMENT]["type"],
        "string"
    );
}

// ============================================================================
// SECTION: Properties
// ============================================================================

fn category_strategy() -> impl Strategy<Value = ToolCategory> {
    prop::sample::select(ToolCategory::ALL.to_vec())
}

proptest! {
    #[test]
    fn exclusion_always_wins(
        categories in prop::collection::vec(category_strategy(), 1..8),
        excluded in 0_usize..8,
    ) {
        let definitions: Vec<_> = categories
            .iter()
            .enumerate()
            .map(|(position, category)| tool(&format!("T{position}"), *category, None))
            .collect();
        let registry = registry(definitions);
        let target = format!("T{}", excluded % categories.len());
        let filter = FilterConfig {
            include: vec![target.clone()],
            exclude: vec![target.clone()],
            ..FilterConfig::default()
        };
        let names = visible(&registry, None, &filter);
        prop_assert!(!names.contains(&target));
    }

    #[test]
    fn visibility_matches_membership_formula(
        categories in prop::collection::vec(category_strategy(), 1..10),
        allowed in prop::collection::vec(category_strategy(), 0..3),
        minimums in prop::collection::vec(0_u64..4, 10),
        cluster_major in 0_u64..4,
    ) {
        let definitions: Vec<_> = categories
            .iter()
            .enumerate()
            .map(|(position, category)| {
                tool(&format!("T{position}"), *category, Some((minimums[position], 0, 0)))
            })
            .collect();
        let registry = registry(definitions);
        let filter = FilterConfig {
            categories: allowed.iter().map(|category| category.as_str().to_string()).collect(),
            ..FilterConfig::default()
        };
        let names = visible(&registry, Some(ClusterVersion::new(cluster_major, 0, 0)), &filter);
        let expected: Vec<String> = categories
            .iter()
            .enumerate()
            .filter(|(position, category)| {
                minimums[*position] <= cluster_major
                    && (allowed.is_empty()
                        || **category == ToolCategory::Core
                        || allowed.contains(category))
            })
            .map(|(position, _)| format!("T{position}"))
            .collect();
        prop_assert_eq!(names, expected);
    }

    #[test]
    fn invalid_patterns_never_hide_tools(pattern in "[a-z]{0,4}[\\[(]") {
        let filter = FilterConfig {
            exclude_regex: vec![pattern],
            ..FilterConfig::default()
        };
        prop_assert_eq!(visible(&sample_registry(), None, &filter).len(), 5);
    }
}
