// crates/opensearch-mcp/src/connection.rs
// ============================================================================
// Module: Cluster Connections
// Description: Pooled per-profile connections, transport, and probing.
// Purpose: Build one shared connection per profile and classify failures.
// Dependencies: async-trait, reqwest, tokio, tracing
// ============================================================================

//! ## Overview
//! [`ConnectionManager`] lazily builds exactly one [`ClusterConnection`] per
//! profile. Construction is single-flight: a per-profile
//! [`tokio::sync::OnceCell`] slot is fetched under a short map lock, and
//! concurrent first callers await the same initialization. A failed build
//! leaves the slot empty so a later call can retry.
//!
//! Connections wrap a [`ClusterTransport`]; the production transport is a
//! pooled `reqwest` client that applies basic auth or SigV4 signing.
//! Responses are classified into [`UpstreamError`] variants so the dispatcher
//! can decide whether a failure is retryable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::provider::ProvideCredentials;
use opensearch_mcp_config::EnvSnapshot;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HOST;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::info;
use tracing::warn;

use crate::auth::AuthResolutionError;
use crate::auth::ClusterCredentials;
use crate::auth::CredentialSources;
use crate::auth::resolve_auth;
use crate::ndjson;
use crate::profile::ClusterProfile;
use crate::profile::ProfileStore;
use crate::sigv4;
use crate::version::ClusterVersion;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// HTTP timeout used when a profile does not set one.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Maximum characters of an upstream error body kept in errors.
const MAX_ERROR_BODY_CHARS: usize = 4096;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// HTTP methods accepted by cluster APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// HEAD.
    Head,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// DELETE.
    Delete,
    /// PATCH.
    Patch,
}

impl HttpMethod {
    /// Parses a method name, ignoring case.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "HEAD" => Some(Self::Head),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            _ => None,
        }
    }

    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }

    /// GET and HEAD never mutate cluster state.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::Get | Self::Head)
    }

    /// Converts to the `reqwest` method type.
    const fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Head => reqwest::Method::HEAD,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
        }
    }
}

/// Request payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A single JSON document.
    Json(Value),
    /// Newline-delimited JSON documents.
    Ndjson(Vec<Value>),
}

impl RequestBody {
    /// Serializes the payload.
    ///
    /// # Errors
    ///
    /// Returns a serialization error when a document cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Json(value) => serde_json::to_vec(value),
            Self::Ndjson(documents) => {
                let mut out = Vec::new();
                for document in documents {
                    serde_json::to_writer(&mut out, document)?;
                    out.push(b'\n');
                }
                Ok(out)
            }
        }
    }

    /// Content type matching the payload.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => "application/json",
            Self::Ndjson(_) => "application/x-ndjson",
        }
    }
}

/// A cluster API request. Paths and query values are unencoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute path starting with `/`.
    pub path: String,
    /// Query parameters in insertion order.
    pub query: Vec<(String, String)>,
    /// Optional payload.
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    /// Creates a request without query or body.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Appends a query parameter when a value is present.
    #[must_use]
    pub fn query_opt(self, key: &str, value: Option<String>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw cluster response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

/// Decodes a response body, merging newline-delimited documents. Non-JSON
/// text (for example `_cat` output without `format=json`) is returned as a
/// string.
#[must_use]
pub fn decode_body(body: &str) -> Value {
    ndjson::merge_documents(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

// ============================================================================
// SECTION: Transport
// ============================================================================

/// Sends requests to one cluster.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Sends a request and returns the raw response for any status code.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Network`] when no response was received.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, UpstreamError>;
}

/// Pooled HTTP transport with basic or SigV4 authentication.
pub struct HttpClusterTransport {
    /// Pooled HTTP client.
    client: reqwest::Client,
    /// Profile served by this transport.
    profile: Arc<ClusterProfile>,
    /// Credentials applied to every request.
    credentials: ClusterCredentials,
    /// `scheme://host[:port]`.
    origin: String,
    /// Host header value.
    host_header: String,
    /// Path prefix from the base URL, without trailing slash.
    base_path: String,
}

impl HttpClusterTransport {
    /// Builds a transport for a profile.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Client`] when the URL or HTTP client is invalid.
    pub fn new(
        profile: Arc<ClusterProfile>,
        credentials: ClusterCredentials,
    ) -> Result<Self, ConnectError> {
        let url = reqwest::Url::parse(&profile.base_url)
            .map_err(|err| ConnectError::Client(format!("invalid cluster url: {err}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| ConnectError::Client("cluster url has no host".to_string()))?;
        let host_header = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!profile.ssl_verify)
            .timeout(profile.timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))
            .build()
            .map_err(|err| ConnectError::Client(err.to_string()))?;
        Ok(Self {
            client,
            origin: format!("{}://{host_header}", url.scheme()),
            base_path: url.path().trim_end_matches('/').to_string(),
            host_header,
            profile,
            credentials,
        })
    }

    /// Signing service for the profile's deployment type.
    fn signing_service(&self) -> &'static str {
        if self.profile.is_serverless() == Some(true) {
            sigv4::SERVICE_SERVERLESS
        } else {
            sigv4::SERVICE_MANAGED
        }
    }
}

#[async_trait]
impl ClusterTransport for HttpClusterTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, UpstreamError> {
        let path = format!("{}{}", self.base_path, request.path);
        let query = sigv4::canonical_query(&request.query);
        let mut url = format!("{}{}", self.origin, sigv4::uri_encode_path(&path));
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        let payload = match &request.body {
            Some(body) => body
                .to_bytes()
                .map_err(|err| UpstreamError::Network(format!("request encoding failed: {err}")))?,
            None => Vec::new(),
        };
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), url)
            .header(HOST, self.host_header.as_str());
        if let Some(body) = &request.body {
            builder = builder.header(CONTENT_TYPE, body.content_type());
        }
        match &self.credentials {
            ClusterCredentials::Anonymous => {}
            ClusterCredentials::Basic {
                username,
                password,
            } => builder = builder.basic_auth(username, Some(password)),
            ClusterCredentials::Signed(identity) => {
                let credentials = identity.provider.provide_credentials().await.map_err(|err| {
                    UpstreamError::Network(format!("credential refresh failed: {err}"))
                })?;
                let keys = sigv4::SigningKeys {
                    access_key_id: credentials.access_key_id(),
                    secret_access_key: credentials.secret_access_key(),
                    session_token: credentials.session_token(),
                };
                let signable = sigv4::SignableRequest {
                    method: request.method.as_str(),
                    host: &self.host_header,
                    path: &path,
                    query: &request.query,
                    payload: &payload,
                };
                let scope = sigv4::SigningScope {
                    region: &identity.region,
                    service: self.signing_service(),
                    timestamp: OffsetDateTime::now_utc(),
                };
                for (name, value) in sigv4::sign(&signable, &keys, &scope) {
                    builder = builder.header(name, value);
                }
            }
        }
        if !payload.is_empty() {
            builder = builder.body(payload);
        }
        let response =
            builder.send().await.map_err(|err| UpstreamError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| UpstreamError::Network(err.to_string()))?;
        Ok(ApiResponse {
            status,
            body,
        })
    }
}

// ============================================================================
// SECTION: Connection
// ============================================================================

/// Shared handle bound to one profile. Cloning is cheap.
#[derive(Clone)]
pub struct ClusterConnection {
    /// Profile this connection serves.
    profile: Arc<ClusterProfile>,
    /// Underlying transport.
    transport: Arc<dyn ClusterTransport>,
}

impl fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConnection").field("profile", &self.profile.id).finish_non_exhaustive()
    }
}

impl ClusterConnection {
    /// Wraps a transport for a profile.
    #[must_use]
    pub fn new(profile: Arc<ClusterProfile>, transport: Arc<dyn ClusterTransport>) -> Self {
        Self {
            profile,
            transport,
        }
    }

    /// Profile served by this connection.
    #[must_use]
    pub fn profile(&self) -> &Arc<ClusterProfile> {
        &self.profile
    }

    /// Sends a request, classifying non-success statuses.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] for network failures and non-2xx statuses.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, UpstreamError> {
        let response = self.transport.send(request).await?;
        match response.status {
            200..=299 => Ok(response),
            500..=599 => Err(UpstreamError::Server {
                status: response.status,
                body: truncate(&response.body),
            }),
            status => Err(UpstreamError::Client {
                status,
                body: truncate(&response.body),
            }),
        }
    }

    /// Sends a request and decodes the response body.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] for network failures and non-2xx statuses.
    pub async fn execute_json(&self, request: &ApiRequest) -> Result<Value, UpstreamError> {
        let response = self.execute(request).await?;
        Ok(decode_body(&response.body))
    }
}

/// Truncates an error body on a character boundary.
fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.to_string()
    } else {
        body.chars().take(MAX_ERROR_BODY_CHARS).collect()
    }
}

// ============================================================================
// SECTION: Connection Factory
// ============================================================================

/// Builds connections for profiles.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Builds a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when auth or client construction fails.
    async fn connect(&self, profile: Arc<ClusterProfile>) -> Result<ClusterConnection, ConnectError>;
}

/// Production factory: resolves auth then builds an HTTP transport.
pub struct HttpConnectionFactory {
    /// Captured environment for credential signals.
    env: EnvSnapshot,
    /// AWS credential lookups.
    sources: Arc<dyn CredentialSources>,
    /// Whether unauthenticated access is permitted.
    allow_no_auth: bool,
}

impl HttpConnectionFactory {
    /// Creates a factory.
    #[must_use]
    pub fn new(env: EnvSnapshot, sources: Arc<dyn CredentialSources>, allow_no_auth: bool) -> Self {
        Self {
            env,
            sources,
            allow_no_auth,
        }
    }
}

#[async_trait]
impl ConnectionFactory for HttpConnectionFactory {
    async fn connect(&self, profile: Arc<ClusterProfile>) -> Result<ClusterConnection, ConnectError> {
        let resolved =
            resolve_auth(&profile, &self.env, self.sources.as_ref(), self.allow_no_auth).await?;
        info!(
            cluster = %profile.id,
            auth_mode = resolved.credentials.mode().as_str(),
            origin = resolved.origin.as_str(),
            ssl_verify = profile.ssl_verify,
            "cluster connection established"
        );
        let transport = HttpClusterTransport::new(Arc::clone(&profile), resolved.credentials)?;
        Ok(ClusterConnection::new(profile, Arc::new(transport)))
    }
}

// ============================================================================
// SECTION: Connection Manager
// ============================================================================

/// Lazily built, single-flight connection pool keyed by profile id.
pub struct ConnectionManager {
    /// Configured profiles.
    profiles: Arc<ProfileStore>,
    /// Connection builder.
    factory: Arc<dyn ConnectionFactory>,
    /// Per-profile initialization slots.
    slots: Mutex<HashMap<String, Arc<OnceCell<ClusterConnection>>>>,
}

impl ConnectionManager {
    /// Creates a manager over a profile store.
    #[must_use]
    pub fn new(profiles: Arc<ProfileStore>, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            profiles,
            factory,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Configured profiles.
    #[must_use]
    pub fn profiles(&self) -> &Arc<ProfileStore> {
        &self.profiles
    }

    /// Returns the pooled connection for a profile, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when the profile is unknown or construction
    /// fails. Failed construction is retried by the next caller.
    pub async fn get_connection(&self, profile_id: &str) -> Result<ClusterConnection, ConnectError> {
        let profile = self
            .profiles
            .get(profile_id)
            .ok_or_else(|| ConnectError::UnknownProfile(profile_id.to_string()))?;
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .map_err(|_| ConnectError::Client("connection pool lock poisoned".to_string()))?;
            Arc::clone(slots.entry(profile_id.to_string()).or_default())
        };
        slot.get_or_try_init(|| self.factory.connect(profile)).await.cloned()
    }

    /// Returns the cluster version, probing `GET /` once per profile.
    ///
    /// Serverless clusters report no version. A failed probe is not cached
    /// and yields `None`, which disables version gating for that call.
    pub async fn cluster_version(&self, connection: &ClusterConnection) -> Option<ClusterVersion> {
        let profile = connection.profile();
        if let Some(version) = profile.cached_version() {
            return version;
        }
        match connection.execute(&ApiRequest::get("/")).await {
            Ok(response) => {
                profile.record_serverless(false);
                let version = parse_reported_version(&profile.id, &response.body);
                profile.record_version(version)
            }
            Err(UpstreamError::Client {
                status: 400 | 404,
                ..
            }) => {
                profile.record_serverless(true);
                profile.record_version(None)
            }
            Err(err) => {
                warn!(cluster = %profile.id, error = %err, "cluster info probe failed");
                None
            }
        }
    }

    /// Returns whether the profile is serverless, probing once when unknown.
    /// Probe failure defaults to non-serverless without caching.
    pub async fn detect_serverless(&self, connection: &ClusterConnection) -> bool {
        if let Some(serverless) = connection.profile().is_serverless() {
            return serverless;
        }
        self.cluster_version(connection).await;
        connection.profile().is_serverless().unwrap_or(false)
    }
}

/// Extracts `version.number` from a cluster info payload.
fn parse_reported_version(cluster: &str, body: &str) -> Option<ClusterVersion> {
    let info: Value = serde_json::from_str(body).ok()?;
    let raw = info.pointer("/version/number").and_then(Value::as_str)?;
    match ClusterVersion::parse(raw) {
        Ok(version) => Some(version),
        Err(err) => {
            warn!(cluster, version = raw, error = %err, "unparsable cluster version; version gate disabled");
            None
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Upstream cluster failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// 4xx-equivalent response. Never retried.
    #[error("cluster rejected request with status {status}: {body}")]
    Client {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },
    /// 5xx response.
    #[error("cluster failed request with status {status}: {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },
    /// No response was received.
    #[error("cluster unreachable: {0}")]
    Network(String),
}

impl UpstreamError {
    /// Server and network failures may be retried for read-only tools.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Client { .. })
    }

    /// HTTP status when a response was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Client {
                status,
                ..
            }
            | Self::Server {
                status,
                ..
            } => Some(*status),
            Self::Network(_) => None,
        }
    }
}

/// Connection construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// Credential resolution failed.
    #[error(transparent)]
    Auth(#[from] AuthResolutionError),
    /// No profile with the requested id.
    #[error("unknown cluster profile: {0}")]
    UnknownProfile(String),
    /// HTTP client construction failed.
    #[error("cluster client error: {0}")]
    Client(String),
}
