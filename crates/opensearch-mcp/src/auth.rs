// crates/opensearch-mcp/src/auth.rs
// ============================================================================
// Module: Credential Resolution
// Description: Ordered auth precedence for cluster profiles.
// Purpose: Resolve one deterministic credential set per profile.
// Dependencies: async-trait, aws-config, aws-credential-types
// ============================================================================

//! ## Overview
//! [`resolve_auth`] is the single precedence function for cluster
//! credentials, highest first:
//!
//! 1. credentials declared on the profile (basic pair, named AWS profile),
//! 2. environment signals (basic pair, static AWS keys, explicit region),
//! 3. ambient default AWS credentials and region,
//! 4. no auth, only when `auth.allow_no_auth` is enabled.
//!
//! Explicit credentials always win over the no-auth flag; the flag only
//! permits the final fallback. A declared `auth` mode narrows which steps
//! apply. AWS lookups go through [`CredentialSources`] so the precedence is
//! testable without network access.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_config::SdkConfig;
use aws_config::sts::AssumeRoleProvider;
use aws_credential_types::Credentials;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use opensearch_mcp_config::ClusterAuthMode;
use opensearch_mcp_config::EnvSnapshot;
use opensearch_mcp_config::env::ACCESS_KEY_VAR;
use opensearch_mcp_config::env::PASSWORD_VAR;
use opensearch_mcp_config::env::REGION_VAR;
use opensearch_mcp_config::env::SECRET_KEY_VAR;
use opensearch_mcp_config::env::SESSION_TOKEN_VAR;
use opensearch_mcp_config::env::USERNAME_VAR;
use thiserror::Error;

use crate::profile::ClusterProfile;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Session name used for role assumption.
const ASSUME_ROLE_SESSION_NAME: &str = "opensearch-mcp";
/// Provider label attached to environment-sourced static keys.
const ENV_PROVIDER_NAME: &str = "OpenSearchMcpEnvironment";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Credentials used for every request to one profile.
#[derive(Clone)]
pub enum ClusterCredentials {
    /// No credentials are sent.
    Anonymous,
    /// HTTP basic authentication.
    Basic {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// SigV4 request signing.
    Signed(SignedIdentity),
}

impl ClusterCredentials {
    /// Returns the auth mode these credentials implement.
    #[must_use]
    pub const fn mode(&self) -> ClusterAuthMode {
        match self {
            Self::Anonymous => ClusterAuthMode::None,
            Self::Basic {
                ..
            } => ClusterAuthMode::Basic,
            Self::Signed(_) => ClusterAuthMode::SignedRequest,
        }
    }
}

impl fmt::Debug for ClusterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Basic {
                username,
                ..
            } => f.debug_struct("Basic").field("username", username).finish_non_exhaustive(),
            Self::Signed(identity) => {
                f.debug_struct("Signed").field("region", &identity.region).finish_non_exhaustive()
            }
        }
    }
}

/// Refreshable signing credentials bound to a region.
#[derive(Clone)]
pub struct SignedIdentity {
    /// Signing region.
    pub region: String,
    /// Credential provider, refreshed on demand.
    pub provider: SharedCredentialsProvider,
}

/// Where resolved credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOrigin {
    /// Declared on the profile.
    Profile,
    /// Supplied by environment variables.
    Environment,
    /// Ambient default AWS chain.
    Ambient,
    /// Unauthenticated fallback.
    NoAuth,
}

impl CredentialOrigin {
    /// Returns the stable label for this origin.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Environment => "environment",
            Self::Ambient => "ambient",
            Self::NoAuth => "no_auth",
        }
    }
}

/// Result of auth resolution.
#[derive(Debug, Clone)]
pub struct ResolvedAuth {
    /// Credentials to use.
    pub credentials: ClusterCredentials,
    /// Precedence step that produced them.
    pub origin: CredentialOrigin,
}

/// AWS credentials plus the region reported alongside them.
#[derive(Clone)]
pub struct AwsIdentity {
    /// Credential provider.
    pub provider: SharedCredentialsProvider,
    /// Region configured for the same source, if any.
    pub region: Option<String>,
}

// ============================================================================
// SECTION: Credential Sources
// ============================================================================

/// AWS credential lookups used by the precedence function.
#[async_trait]
pub trait CredentialSources: Send + Sync {
    /// Loads credentials for a named local profile.
    async fn named_profile(&self, name: &str) -> Option<AwsIdentity>;

    /// Loads the ambient default credential chain.
    async fn ambient(&self) -> Option<AwsIdentity>;

    /// Assumes a role on top of base credentials.
    async fn assume_role(
        &self,
        base: SharedCredentialsProvider,
        role_arn: &str,
        region: &str,
    ) -> Result<SharedCredentialsProvider, String>;
}

/// Credential sources backed by the AWS SDK default chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct AwsCredentialSources;

#[async_trait]
impl CredentialSources for AwsCredentialSources {
    async fn named_profile(&self, name: &str) -> Option<AwsIdentity> {
        let sdk = aws_config::defaults(BehaviorVersion::latest()).profile_name(name).load().await;
        usable_identity(&sdk).await
    }

    async fn ambient(&self) -> Option<AwsIdentity> {
        let sdk = aws_config::defaults(BehaviorVersion::latest()).load().await;
        usable_identity(&sdk).await
    }

    async fn assume_role(
        &self,
        base: SharedCredentialsProvider,
        role_arn: &str,
        region: &str,
    ) -> Result<SharedCredentialsProvider, String> {
        let sdk = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        let provider = AssumeRoleProvider::builder(role_arn)
            .session_name(ASSUME_ROLE_SESSION_NAME)
            .configure(&sdk)
            .build_from_provider(base)
            .await;
        provider.provide_credentials().await.map_err(|err| err.to_string())?;
        Ok(SharedCredentialsProvider::new(provider))
    }
}

/// Returns the SDK identity when it currently yields credentials.
async fn usable_identity(sdk: &SdkConfig) -> Option<AwsIdentity> {
    let provider = sdk.credentials_provider()?;
    provider.provide_credentials().await.ok()?;
    Some(AwsIdentity {
        provider,
        region: sdk.region().map(|region| region.as_ref().to_string()),
    })
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves credentials for a profile using the fixed precedence order.
///
/// # Errors
///
/// Returns [`AuthResolutionError`] when no permitted source yields usable
/// credentials.
pub async fn resolve_auth(
    profile: &ClusterProfile,
    env: &EnvSnapshot,
    sources: &dyn CredentialSources,
    allow_no_auth: bool,
) -> Result<ResolvedAuth, AuthResolutionError> {
    let mode = profile.auth_mode;
    if mode == Some(ClusterAuthMode::None) {
        return no_auth(profile, allow_no_auth);
    }
    let allows_basic = matches!(mode, None | Some(ClusterAuthMode::Basic));
    let allows_signed = matches!(mode, None | Some(ClusterAuthMode::SignedRequest));
    let explicit_region =
        profile.region.clone().or_else(|| env.get(REGION_VAR).map(ToString::to_string));

    // Declared on the profile.
    if allows_basic
        && let (Some(username), Some(password)) =
            (&profile.credentials.username, &profile.credentials.password)
    {
        return Ok(basic(username, password, CredentialOrigin::Profile));
    }
    if allows_signed && let Some(name) = &profile.credentials.aws_profile {
        let identity = sources.named_profile(name).await.ok_or_else(|| {
            AuthResolutionError::ProfileUnavailable {
                profile: profile.id.clone(),
                aws_profile: name.clone(),
            }
        })?;
        let region = explicit_region.or(identity.region).ok_or_else(|| missing_region(profile))?;
        return signed(profile, sources, identity.provider, region, CredentialOrigin::Profile).await;
    }

    // Environment signals.
    if allows_basic
        && let (Some(username), Some(password)) = (env.get(USERNAME_VAR), env.get(PASSWORD_VAR))
    {
        return Ok(basic(username, password, CredentialOrigin::Environment));
    }
    if allows_signed
        && let (Some(access_key), Some(secret_key)) = (env.get(ACCESS_KEY_VAR), env.get(SECRET_KEY_VAR))
    {
        let region = explicit_region.ok_or_else(|| missing_region(profile))?;
        let credentials = Credentials::new(
            access_key,
            secret_key,
            env.get(SESSION_TOKEN_VAR).map(ToString::to_string),
            None,
            ENV_PROVIDER_NAME,
        );
        let provider = SharedCredentialsProvider::new(credentials);
        return signed(profile, sources, provider, region, CredentialOrigin::Environment).await;
    }

    // Ambient chain; an explicit region makes it an environment signal.
    if allows_signed && let Some(identity) = sources.ambient().await {
        let origin = if explicit_region.is_some() {
            CredentialOrigin::Environment
        } else {
            CredentialOrigin::Ambient
        };
        if let Some(region) = explicit_region.or(identity.region) {
            return signed(profile, sources, identity.provider, region, origin).await;
        }
    }

    no_auth(profile, allow_no_auth)
}

/// Builds basic credentials.
fn basic(username: &str, password: &str, origin: CredentialOrigin) -> ResolvedAuth {
    ResolvedAuth {
        credentials: ClusterCredentials::Basic {
            username: username.to_string(),
            password: password.to_string(),
        },
        origin,
    }
}

/// Builds signed credentials, assuming the profile's role when declared.
async fn signed(
    profile: &ClusterProfile,
    sources: &dyn CredentialSources,
    provider: SharedCredentialsProvider,
    region: String,
    origin: CredentialOrigin,
) -> Result<ResolvedAuth, AuthResolutionError> {
    let provider = match &profile.credentials.iam_role_arn {
        Some(role_arn) => sources.assume_role(provider, role_arn, &region).await.map_err(|message| {
            AuthResolutionError::AssumeRole {
                profile: profile.id.clone(),
                message,
            }
        })?,
        None => provider,
    };
    Ok(ResolvedAuth {
        credentials: ClusterCredentials::Signed(SignedIdentity {
            region,
            provider,
        }),
        origin,
    })
}

/// Final fallback: anonymous access when permitted.
fn no_auth(profile: &ClusterProfile, allow_no_auth: bool) -> Result<ResolvedAuth, AuthResolutionError> {
    if allow_no_auth {
        Ok(ResolvedAuth {
            credentials: ClusterCredentials::Anonymous,
            origin: CredentialOrigin::NoAuth,
        })
    } else {
        Err(AuthResolutionError::NoCredentials {
            profile: profile.id.clone(),
        })
    }
}

/// Builds the missing-region error.
fn missing_region(profile: &ClusterProfile) -> AuthResolutionError {
    AuthResolutionError::MissingRegion {
        profile: profile.id.clone(),
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Credential resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthResolutionError {
    /// No permitted source produced credentials and no-auth is disabled.
    #[error("no usable credentials for cluster {profile} and no-auth is not enabled")]
    NoCredentials {
        /// Profile identifier.
        profile: String,
    },
    /// Signed requests need a region and none was found.
    #[error("cluster {profile} requires a signing region")]
    MissingRegion {
        /// Profile identifier.
        profile: String,
    },
    /// The named AWS profile yielded no credentials.
    #[error("aws profile {aws_profile} for cluster {profile} has no usable credentials")]
    ProfileUnavailable {
        /// Profile identifier.
        profile: String,
        /// Named AWS profile.
        aws_profile: String,
    },
    /// Role assumption failed.
    #[error("assuming role for cluster {profile} failed: {message}")]
    AssumeRole {
        /// Profile identifier.
        profile: String,
        /// Failure detail.
        message: String,
    },
}
