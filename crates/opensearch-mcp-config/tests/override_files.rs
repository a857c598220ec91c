//! Override document tests for opensearch-mcp-config.
// crates/opensearch-mcp-config/tests/override_files.rs
// ============================================================================
// Module: Override File Tests
// Description: YAML/JSON override parsing, aliases, and merge order.
// Purpose: Ensure override documents are shape-checked and layered correctly.
// ============================================================================

use opensearch_mcp_config::ConfigError;
use opensearch_mcp_config::EnvSnapshot;
use opensearch_mcp_config::OpenSearchMcpConfig;
use opensearch_mcp_config::OverrideConfig;

mod common;

type TestResult = Result<(), String>;

#[test]
fn yaml_aliases_map_to_canonical_fields() -> TestResult {
    let config = OverrideConfig::parse(
        r"
tools:
  ListIndexTool:
    displayName: list_indices
    desc: Lists every index.
    args:
      index: Index pattern.
  CountTool:
    enabled: false
",
    )
    .map_err(|err| err.to_string())?;
    let list = config.get("ListIndexTool").ok_or("missing ListIndexTool")?;
    if list.display_name.as_deref() != Some("list_indices") {
        return Err("display name alias not applied".to_string());
    }
    if list.description.as_deref() != Some("Lists every index.") {
        return Err("description alias not applied".to_string());
    }
    if list.arguments.get("index").map(String::as_str) != Some("Index pattern.") {
        return Err("argument alias not applied".to_string());
    }
    if config.get("CountTool").and_then(|entry| entry.enabled) != Some(false) {
        return Err("enabled flag not parsed".to_string());
    }
    Ok(())
}

#[test]
fn json_documents_are_accepted() -> TestResult {
    let config = OverrideConfig::parse(r#"{"tools": {"ExplainTool": {"description": "Why it matched."}}}"#)
        .map_err(|err| err.to_string())?;
    if config.get("ExplainTool").and_then(|entry| entry.description.as_deref()) != Some("Why it matched.") {
        return Err("json override not parsed".to_string());
    }
    Ok(())
}

#[test]
fn unknown_fields_and_duplicate_aliases_rejected() -> TestResult {
    match OverrideConfig::parse("tools:\n  CountTool:\n    colour: blue\n") {
        Err(ConfigError::Parse(_)) => {}
        other => return Err(format!("expected parse error, got {other:?}")),
    }
    match OverrideConfig::parse("tools:\n  CountTool:\n    description: a\n    desc: b\n") {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected duplicate field error, got {other:?}")),
    }
}

#[test]
fn argument_descriptions_must_be_strings() -> TestResult {
    match OverrideConfig::parse("tools:\n  CountTool:\n    arguments:\n      index: [1, 2]\n") {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {other:?}")),
    }
}

#[test]
fn empty_document_is_empty_config() -> TestResult {
    let config = OverrideConfig::parse("  \n").map_err(|err| err.to_string())?;
    if !config.tools.is_empty() {
        return Err("expected no overrides".to_string());
    }
    Ok(())
}

#[test]
fn file_overrides_layer_on_inline() -> TestResult {
    let (dir, _) = common::write_temp(
        "overrides.yaml",
        "tools:\n  CountTool:\n    description: From file.\n    args:\n      body: File body.\n",
    )?;
    let content = r#"
overrides_path = "overrides.yaml"
[tools.CountTool]
display_name = "count_docs"
description = "Inline."
arguments = { index = "Inline index." }
"#;
    let path = dir.path().join("opensearch-mcp.toml");
    std::fs::write(&path, content).map_err(|err| err.to_string())?;
    let config = OpenSearchMcpConfig::load(Some(&path), &EnvSnapshot::default())
        .map_err(|err| err.to_string())?;
    let overrides = config.resolved_overrides().map_err(|err| err.to_string())?;
    let count = overrides.get("CountTool").ok_or("missing CountTool")?;
    if count.description.as_deref() != Some("From file.") {
        return Err("file description should win".to_string());
    }
    if count.display_name.as_deref() != Some("count_docs") {
        return Err("inline display name should survive".to_string());
    }
    if count.arguments.len() != 2 {
        return Err(format!("arguments not merged: {:?}", count.arguments));
    }
    Ok(())
}

#[test]
fn override_file_display_names_validated() -> TestResult {
    let (_dir, path) =
        common::write_temp("overrides.yaml", "tools:\n  CountTool:\n    name: \"has space\"\n")?;
    common::assert_invalid(OverrideConfig::load(&path), "display_name")
}
