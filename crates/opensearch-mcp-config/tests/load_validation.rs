//! Config loading and validation tests for opensearch-mcp-config.
// crates/opensearch-mcp-config/tests/load_validation.rs
// ============================================================================
// Module: Load Validation Tests
// Description: File loading limits and fail-closed validation rules.
// Purpose: Ensure malformed startup configuration aborts with ConfigError.
// ============================================================================

use std::path::Path;

use opensearch_mcp_config::ClusterAuthMode;
use opensearch_mcp_config::ConfigError;
use opensearch_mcp_config::EnvSnapshot;
use opensearch_mcp_config::OpenSearchMcpConfig;
use opensearch_mcp_config::ServerTransport;

mod common;

type TestResult = Result<(), String>;

// ============================================================================
// SECTION: Loading
// ============================================================================

#[test]
fn load_reads_file_and_applies_defaults() -> TestResult {
    let (_dir, path) = common::write_temp("opensearch-mcp.toml", common::SINGLE_CLUSTER_TOML)?;
    let config = OpenSearchMcpConfig::load(Some(&path), &EnvSnapshot::default())
        .map_err(|err| err.to_string())?;
    if config.clusters.len() != 1 || config.clusters[0].id != "local" {
        return Err(format!("unexpected clusters: {:?}", config.clusters));
    }
    if config.server.transport != ServerTransport::Stdio {
        return Err("transport should default to stdio".to_string());
    }
    if config.server.default_timeout_ms != 30_000 || config.retry.max_attempts != 3 {
        return Err("defaults not applied".to_string());
    }
    if !config.clusters[0].ssl_verify {
        return Err("ssl_verify should default to true".to_string());
    }
    Ok(())
}

#[test]
fn unvalidated_load_defers_checks_to_the_caller() -> TestResult {
    let content = format!("[server]\ntransport = \"http\"\n{}", common::SINGLE_CLUSTER_TOML);
    let (_dir, path) = common::write_temp("opensearch-mcp.toml", &content)?;
    common::assert_invalid(
        OpenSearchMcpConfig::load(Some(&path), &EnvSnapshot::default()),
        "bind",
    )?;
    let mut config = OpenSearchMcpConfig::load_unvalidated(Some(&path), &EnvSnapshot::default())
        .map_err(|err| err.to_string())?;
    if config.source_path.is_none() {
        return Err("source path not recorded".to_string());
    }
    config.server.bind = Some("127.0.0.1:8080".to_string());
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn load_missing_explicit_file_is_io_error() -> TestResult {
    let result =
        OpenSearchMcpConfig::load(Some(Path::new("/nonexistent/opensearch-mcp.toml")), &EnvSnapshot::default());
    match result {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {other:?}")),
    }
}

#[test]
fn load_uses_config_path_env_var() -> TestResult {
    let (_dir, path) = common::write_temp("custom.toml", common::SINGLE_CLUSTER_TOML)?;
    let env = EnvSnapshot::from_pairs([("OPENSEARCH_MCP_CONFIG", path.to_string_lossy().to_string())]);
    let config = OpenSearchMcpConfig::load(None, &env).map_err(|err| err.to_string())?;
    if config.source_path.as_deref() != Some(path.as_path()) {
        return Err("config path env var not honored".to_string());
    }
    Ok(())
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let padding = format!("# {}\n", "x".repeat(1024 * 1024));
    let (_dir, path) = common::write_temp("big.toml", &padding)?;
    common::assert_invalid(
        OpenSearchMcpConfig::load(Some(&path), &EnvSnapshot::default()),
        "exceeds size limit",
    )
}

#[test]
fn load_rejects_unknown_keys() -> TestResult {
    let result = common::parse("[server]\nunknown_key = 1\n");
    match result {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {other:?}")),
    }
}

#[test]
fn relative_auxiliary_paths_anchor_at_config_dir() -> TestResult {
    let content = "overrides_path = \"overrides.yaml\"\n[specification]\npaths = [\"api.json\"]\n";
    let (dir, path) = common::write_temp("opensearch-mcp.toml", content)?;
    std::fs::write(dir.path().join("overrides.yaml"), "tools: {}\n").map_err(|err| err.to_string())?;
    let config = OpenSearchMcpConfig::load(Some(&path), &EnvSnapshot::default())
        .map_err(|err| err.to_string())?;
    if config.overrides_path.as_deref() != Some(dir.path().join("overrides.yaml").as_path()) {
        return Err(format!("overrides path not anchored: {:?}", config.overrides_path));
    }
    if config.specification.paths != vec![dir.path().join("api.json")] {
        return Err(format!("spec path not anchored: {:?}", config.specification.paths));
    }
    Ok(())
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn duplicate_cluster_ids_rejected() -> TestResult {
    let config = common::parse(
        r#"
[[clusters]]
id = "a"
url = "http://one:9200"
[[clusters]]
id = "a"
url = "http://two:9200"
"#,
    )
    .map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "duplicate cluster id")
}

#[test]
fn cluster_url_requires_scheme() -> TestResult {
    let config = common::parse("[[clusters]]\nid = \"a\"\nurl = \"localhost:9200\"\n")
        .map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "http:// or https://")
}

#[test]
fn default_cluster_must_exist() -> TestResult {
    let content = format!("[server]\ndefault_cluster = \"missing\"\n{}", common::SINGLE_CLUSTER_TOML);
    let config = common::parse(&content).map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "unknown cluster")
}

#[test]
fn http_transport_requires_bind() -> TestResult {
    let config = common::parse("[server]\ntransport = \"http\"\n").map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "requires bind address")?;
    let config = common::parse("[server]\ntransport = \"stateless\"\nbind = \"127.0.0.1:8080\"\n")
        .map_err(|err| err.to_string())?;
    config.validate().map_err(|err| err.to_string())?;
    if config.server.transport != ServerTransport::Http {
        return Err("stateless alias should map to http".to_string());
    }
    Ok(())
}

#[test]
fn timeout_bounds_enforced() -> TestResult {
    let config =
        common::parse("[server]\ndefault_timeout_ms = 50\n").map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "default_timeout_ms")?;
    let config =
        common::parse("[server]\ndefault_timeout_ms = 600000\n").map_err(|err| err.to_string())?;
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn retry_attempts_bounded() -> TestResult {
    let config = common::parse("[retry]\nmax_attempts = 0\n").map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "retry.max_attempts")?;
    let config = common::parse("[retry]\nmax_attempts = 6\n").map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "retry.max_attempts")?;
    let config = common::parse("[retry]\nbase_delay_ms = 500\nmax_delay_ms = 100\n")
        .map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "base_delay_ms")
}

#[test]
fn basic_auth_requires_both_fields() -> TestResult {
    let config = common::parse("[[clusters]]\nid = \"a\"\nurl = \"http://x:9200\"\nusername = \"u\"\n")
        .map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "both username and password")
}

#[test]
fn auth_none_requires_allow_no_auth() -> TestResult {
    let profile = "[[clusters]]\nid = \"a\"\nurl = \"http://x:9200\"\nauth = \"none\"\n";
    let config = common::parse(profile).map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "allow_no_auth")?;
    let config = common::parse(&format!("[auth]\nallow_no_auth = true\n{profile}"))
        .map_err(|err| err.to_string())?;
    config.validate().map_err(|err| err.to_string())?;
    if config.clusters[0].auth != Some(ClusterAuthMode::None) {
        return Err("auth mode not parsed".to_string());
    }
    Ok(())
}

#[test]
fn signed_request_alias_accepted() -> TestResult {
    let config = common::parse(
        "[[clusters]]\nid = \"a\"\nurl = \"https://x\"\nauth = \"signed-request\"\nregion = \"us-east-1\"\n",
    )
    .map_err(|err| err.to_string())?;
    config.validate().map_err(|err| err.to_string())?;
    if config.clusters[0].auth != Some(ClusterAuthMode::SignedRequest) {
        return Err("signed-request alias not parsed".to_string());
    }
    Ok(())
}

#[test]
fn inline_display_name_validated() -> TestResult {
    let config = common::parse("[tools.ListIndexTool]\ndisplay_name = \"bad name!\"\n")
        .map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "display_name")
}

#[test]
fn cluster_id_charset_enforced() -> TestResult {
    let config = common::parse("[[clusters]]\nid = \"has space\"\nurl = \"http://x:9200\"\n")
        .map_err(|err| err.to_string())?;
    common::assert_invalid(config.validate(), "may only contain")
}
