// crates/opensearch-mcp/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Mock OpenSearch cluster and config helpers.
// Purpose: Provide reusable infrastructure for end-to-end tests.
// Dependencies: opensearch-mcp-config, tiny_http
// ============================================================================

//! ## Overview
//! [`MockCluster`] is a `tiny_http` server that answers a small set of
//! OpenSearch endpoints and records every request it sees, including the
//! `Authorization` header, so tests can assert on what went over the wire.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Read;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use opensearch_mcp_config::EnvSnapshot;
use opensearch_mcp_config::OpenSearchMcpConfig;
use serde_json::json;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Mock Cluster
// ============================================================================

/// A request observed by the mock cluster.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    /// HTTP method.
    pub method: String,
    /// Path and query string.
    pub url: String,
    /// Authorization header value, if any.
    pub authorization: Option<String>,
    /// Request body.
    pub body: String,
}

/// In-process mock cluster.
pub struct MockCluster {
    server: Arc<Server>,
    url: String,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockCluster {
    /// Starts a mock cluster reporting `version`.
    ///
    /// `failures` maps a path to the number of 503 responses served before
    /// the path starts succeeding.
    pub fn start(version: &'static str, failures: BTreeMap<String, usize>) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let addr = server.server_addr().to_ip().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let server = Arc::clone(&server);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                let mut failures = failures;
                for mut request in server.incoming_requests() {
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    let url = request.url().to_string();
                    let path = url.split('?').next().unwrap_or_default().to_string();
                    let authorization = request
                        .headers()
                        .iter()
                        .find(|header| header.field.equiv("Authorization"))
                        .map(|header| header.value.to_string());
                    seen.lock().unwrap().push(SeenRequest {
                        method: request.method().to_string(),
                        url,
                        authorization,
                        body,
                    });
                    let remaining = failures.get_mut(&path);
                    let (status, payload) = match remaining {
                        Some(count) if *count > 0 => {
                            *count -= 1;
                            (503, json!({"error": "unavailable"}))
                        }
                        _ => route(version, &path),
                    };
                    let content_type = Header::from_bytes("Content-Type", "application/json").unwrap();
                    let response = Response::from_string(payload.to_string())
                        .with_status_code(status)
                        .with_header(content_type);
                    let _ = request.respond(response);
                }
            })
        };
        Self {
            server,
            url: format!("http://{addr}"),
            seen,
            handle: Some(handle),
        }
    }

    /// Base URL of the cluster.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Requests observed so far, excluding the version probe.
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().iter().filter(|request| request.url != "/").cloned().collect()
    }

    /// Number of times `path` was requested.
    pub fn hits(&self, path: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url.split('?').next() == Some(path))
            .count()
    }
}

impl Drop for MockCluster {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Canned responses per path.
fn route(version: &str, path: &str) -> (u16, serde_json::Value) {
    match path {
        "/" => (200, json!({"version": {"number": version, "distribution": "opensearch"}})),
        "/_cluster/health" => (200, json!({"cluster_name": "mock", "status": "green"})),
        "/_cat/indices" => (200, json!([{"index": "logs", "health": "green"}, {"index": "metrics"}])),
        "/_cat/health" => (200, json!([{"status": "green", "node.total": "3"}])),
        "/logs/_count" => (200, json!({"count": 42})),
        "/missing/_count" => (404, json!({"error": {"type": "index_not_found_exception"}})),
        _ => (200, json!({"acknowledged": true})),
    }
}

// ============================================================================
// SECTION: Config Helpers
// ============================================================================

/// Parses a TOML config and validates it.
pub fn config(toml: &str) -> OpenSearchMcpConfig {
    let config = OpenSearchMcpConfig::from_toml_str(toml).unwrap();
    config.validate().unwrap();
    config
}

/// Single basic-auth cluster pointing at `url`.
pub fn basic_cluster_toml(id: &str, url: &str) -> String {
    format!(
        r#"
[[clusters]]
id = "{id}"
url = "{url}"
auth = "basic"
username = "admin"
password = "secret"
"#
    )
}

/// Empty environment snapshot.
pub fn empty_env() -> EnvSnapshot {
    EnvSnapshot::from_pairs(Vec::<(String, String)>::new())
}

/// Returns a free local port for the HTTP transport.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
