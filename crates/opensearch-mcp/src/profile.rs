// crates/opensearch-mcp/src/profile.rs
// ============================================================================
// Module: Cluster Profiles
// Description: Configured cluster endpoints with lazily resolved facts.
// Purpose: Hold endpoint, auth material, and cached serverless/version facts.
// Dependencies: opensearch-mcp-config
// ============================================================================

//! ## Overview
//! A [`ClusterProfile`] is created once from configuration. Its serverless
//! flag and cluster version start unknown and are each set at most once,
//! by explicit configuration, by host name, or by the first successful probe.
//! Later writes are ignored, so concurrent probes are idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use opensearch_mcp_config::ClusterAuthMode;
use opensearch_mcp_config::ClusterConfig;
use opensearch_mcp_config::OpenSearchMcpConfig;

use crate::version::ClusterVersion;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Host suffix identifying serverless collections.
const SERVERLESS_HOST_SUFFIX: &str = ".aoss.amazonaws.com";

// ============================================================================
// SECTION: Credential Reference
// ============================================================================

/// Auth material declared on a profile.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialReference {
    /// Basic-auth username.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Named local AWS credential profile.
    pub aws_profile: Option<String>,
    /// Role assumed on top of resolved base credentials.
    pub iam_role_arn: Option<String>,
}

impl fmt::Debug for CredentialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialReference")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("aws_profile", &self.aws_profile)
            .field("iam_role_arn", &self.iam_role_arn)
            .finish()
    }
}

// ============================================================================
// SECTION: Profile
// ============================================================================

/// One configured cluster endpoint.
#[derive(Debug)]
pub struct ClusterProfile {
    /// Unique profile identifier.
    pub id: String,
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Declared auth mode, if any.
    pub auth_mode: Option<ClusterAuthMode>,
    /// Declared auth material.
    pub credentials: CredentialReference,
    /// Verify TLS certificates.
    pub ssl_verify: bool,
    /// Signing region.
    pub region: Option<String>,
    /// Per-request HTTP timeout.
    pub timeout: Option<Duration>,
    /// Serverless flag, set at most once.
    serverless: OnceLock<bool>,
    /// Probed cluster version, set at most once. `None` inside means the
    /// cluster reports no version.
    version: OnceLock<Option<ClusterVersion>>,
}

impl ClusterProfile {
    /// Builds a profile from its configuration entry.
    #[must_use]
    pub fn from_config(config: &ClusterConfig) -> Self {
        let profile = Self {
            id: config.id.trim().to_string(),
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            auth_mode: config.auth,
            credentials: CredentialReference {
                username: config.username.clone(),
                password: config.password.clone(),
                aws_profile: config.aws_profile.clone(),
                iam_role_arn: config.iam_role_arn.clone(),
            },
            ssl_verify: config.ssl_verify,
            region: config.region.clone(),
            timeout: config.timeout_ms.map(Duration::from_millis),
            serverless: OnceLock::new(),
            version: OnceLock::new(),
        };
        if let Some(explicit) = config.serverless {
            profile.record_serverless(explicit);
        } else if profile.host().to_ascii_lowercase().ends_with(SERVERLESS_HOST_SUFFIX) {
            profile.record_serverless(true);
        }
        if profile.is_serverless() == Some(true) {
            profile.record_version(None);
        }
        profile
    }

    /// Returns the host portion of the base URL.
    #[must_use]
    pub fn host(&self) -> &str {
        let rest = self.base_url.split_once("://").map_or(self.base_url.as_str(), |(_, rest)| rest);
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        authority.split(':').next().unwrap_or_default()
    }

    /// Serverless flag: `None` until known.
    #[must_use]
    pub fn is_serverless(&self) -> Option<bool> {
        self.serverless.get().copied()
    }

    /// Records the serverless flag and returns the effective value.
    pub fn record_serverless(&self, serverless: bool) -> bool {
        *self.serverless.get_or_init(|| serverless)
    }

    /// Cached cluster version: outer `None` until probed.
    #[must_use]
    pub fn cached_version(&self) -> Option<Option<ClusterVersion>> {
        self.version.get().copied()
    }

    /// Records the probed cluster version and returns the effective value.
    pub fn record_version(&self, version: Option<ClusterVersion>) -> Option<ClusterVersion> {
        *self.version.get_or_init(|| version)
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// All configured profiles, keyed by id.
#[derive(Debug, Default)]
pub struct ProfileStore {
    /// Profiles keyed by id.
    profiles: BTreeMap<String, Arc<ClusterProfile>>,
    /// Configured default profile id.
    default_id: Option<String>,
}

impl ProfileStore {
    /// Builds the store from validated configuration.
    #[must_use]
    pub fn from_config(config: &OpenSearchMcpConfig) -> Self {
        let profiles = config
            .clusters
            .iter()
            .map(|cluster| {
                let profile = ClusterProfile::from_config(cluster);
                (profile.id.clone(), Arc::new(profile))
            })
            .collect();
        Self {
            profiles,
            default_id: config.server.default_cluster.clone(),
        }
    }

    /// Builds a store from prepared profiles.
    #[must_use]
    pub fn from_profiles(profiles: Vec<ClusterProfile>, default_id: Option<String>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.id.clone(), Arc::new(profile)))
                .collect(),
            default_id,
        }
    }

    /// Looks up a profile by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ClusterProfile>> {
        self.profiles.get(id).cloned()
    }

    /// Returns every profile in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ClusterProfile>> {
        self.profiles.values()
    }

    /// Returns profile ids in order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Number of configured profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Returns true when no profile is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Returns the configured default profile id.
    #[must_use]
    pub fn default_id(&self) -> Option<&str> {
        self.default_id.as_deref()
    }

    /// Returns the sole profile when exactly one is configured.
    #[must_use]
    pub fn single(&self) -> Option<Arc<ClusterProfile>> {
        if self.profiles.len() == 1 { self.profiles.values().next().cloned() } else { None }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions favor direct unwraps for clarity."
    )]

    use opensearch_mcp_config::ClusterConfig;

    use super::ClusterProfile;
    use crate::version::ClusterVersion;

    fn cluster(url: &str, serverless: Option<bool>) -> ClusterConfig {
        ClusterConfig {
            id: "c".to_string(),
            url: url.to_string(),
            auth: None,
            username: Some("u".to_string()),
            password: Some("secret".to_string()),
            aws_profile: None,
            iam_role_arn: None,
            region: None,
            ssl_verify: true,
            serverless,
            timeout_ms: None,
        }
    }

    #[test]
    fn host_strips_scheme_port_and_path() {
        let profile = ClusterProfile::from_config(&cluster("https://user@search.local:9200/base/", None));
        assert_eq!(profile.host(), "search.local");
        assert_eq!(profile.base_url, "https://user@search.local:9200/base");
    }

    #[test]
    fn serverless_host_detected_without_probe() {
        let profile =
            ClusterProfile::from_config(&cluster("https://abc123.us-east-1.aoss.amazonaws.com", None));
        assert_eq!(profile.is_serverless(), Some(true));
        assert_eq!(profile.cached_version(), Some(None));
    }

    #[test]
    fn explicit_flag_beats_host_name() {
        let profile = ClusterProfile::from_config(&cluster(
            "https://abc123.us-east-1.aoss.amazonaws.com",
            Some(false),
        ));
        assert_eq!(profile.is_serverless(), Some(false));
    }

    #[test]
    fn facts_are_set_once() {
        let profile = ClusterProfile::from_config(&cluster("http://localhost:9200", None));
        assert_eq!(profile.is_serverless(), None);
        assert!(!profile.record_serverless(false));
        assert!(!profile.record_serverless(true));
        let first = Some(ClusterVersion::new(2, 11, 0));
        assert_eq!(profile.record_version(first), first);
        assert_eq!(profile.record_version(None), first);
    }

    #[test]
    fn debug_redacts_password() {
        let profile = ClusterProfile::from_config(&cluster("http://localhost:9200", None));
        let rendered = format!("{profile:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
