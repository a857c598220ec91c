// crates/opensearch-mcp/src/sigv4.rs
// ============================================================================
// Module: Request Signing
// Description: AWS Signature Version 4 header signing.
// Purpose: Authenticate requests to managed and serverless clusters.
// Dependencies: hex, hmac, sha2, time
// ============================================================================

//! ## Overview
//! Implements header-based SigV4 signing for the `es` and `aoss` services.
//! Paths are supplied unencoded; the wire form is single-encoded and the
//! canonical form double-encodes each segment as required for non-S3
//! services. Query pairs are encoded with the RFC 3986 unreserved set and
//! sorted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;

use hmac::Hmac;
use hmac::Mac;
use sha2::Digest;
use sha2::Sha256;
use time::OffsetDateTime;
use time::macros::format_description;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Signing algorithm label.
const ALGORITHM: &str = "AWS4-HMAC-SHA256";
/// Service name for managed domains.
pub const SERVICE_MANAGED: &str = "es";
/// Service name for serverless collections.
pub const SERVICE_SERVERLESS: &str = "aoss";

/// HMAC-SHA256 instance type.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Key material used for one signature.
#[derive(Clone)]
pub struct SigningKeys<'a> {
    /// Access key id.
    pub access_key_id: &'a str,
    /// Secret access key.
    pub secret_access_key: &'a str,
    /// Session token for temporary credentials.
    pub session_token: Option<&'a str>,
}

/// Request fields that participate in the signature.
pub struct SignableRequest<'a> {
    /// Upper-case HTTP method.
    pub method: &'a str,
    /// `host[:port]` exactly as sent in the Host header.
    pub host: &'a str,
    /// Unencoded absolute path.
    pub path: &'a str,
    /// Unencoded query pairs.
    pub query: &'a [(String, String)],
    /// Request payload.
    pub payload: &'a [u8],
}

/// Scope of a signature.
pub struct SigningScope<'a> {
    /// Region name.
    pub region: &'a str,
    /// Service name (`es` or `aoss`).
    pub service: &'a str,
    /// Signing instant.
    pub timestamp: OffsetDateTime,
}

/// Canonical request text and its signed header list.
pub(crate) struct CanonicalRequest {
    /// Full canonical request.
    pub(crate) text: String,
    /// Semicolon-joined lower-case header names.
    pub(crate) signed_headers: String,
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Computes the headers to add to a request: `x-amz-date`,
/// `x-amz-content-sha256`, optional `x-amz-security-token`, and
/// `authorization`.
#[must_use]
pub fn sign(
    request: &SignableRequest<'_>,
    keys: &SigningKeys<'_>,
    scope: &SigningScope<'_>,
) -> Vec<(String, String)> {
    let amz_date = format_amz_date(scope.timestamp);
    let payload_hash = hex::encode(Sha256::digest(request.payload));
    let mut headers = BTreeMap::new();
    headers.insert("host".to_string(), request.host.to_string());
    headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
    headers.insert("x-amz-date".to_string(), amz_date.clone());
    if let Some(token) = keys.session_token {
        headers.insert("x-amz-security-token".to_string(), token.to_string());
    }
    let canonical = canonical_request(
        request.method,
        request.path,
        request.query,
        &headers,
        &payload_hash,
    );
    let authorization = authorization_header(&canonical, keys, scope, &amz_date);
    headers.remove("host");
    let mut out: Vec<(String, String)> = headers.into_iter().collect();
    out.push(("authorization".to_string(), authorization));
    out
}

/// Builds the `Authorization` header value for a canonical request.
pub(crate) fn authorization_header(
    canonical: &CanonicalRequest,
    keys: &SigningKeys<'_>,
    scope: &SigningScope<'_>,
    amz_date: &str,
) -> String {
    let date = amz_date.get(..8).unwrap_or_default();
    let credential_scope = format!("{date}/{}/{}/aws4_request", scope.region, scope.service);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
        hex::encode(Sha256::digest(canonical.text.as_bytes()))
    );
    let key = signing_key(keys.secret_access_key, date, scope.region, scope.service);
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));
    format!(
        "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={}, Signature={signature}",
        keys.access_key_id, canonical.signed_headers
    )
}

/// Builds the canonical request.
pub(crate) fn canonical_request(
    method: &str,
    path: &str,
    query: &[(String, String)],
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
) -> CanonicalRequest {
    let canonical_uri = uri_encode_path(&uri_encode_path(path));
    let canonical_query = canonical_query(query);
    let mut canonical_headers = String::new();
    for (name, value) in headers {
        let _ = writeln!(canonical_headers, "{name}:{}", value.trim());
    }
    let signed_headers = headers.keys().map(String::as_str).collect::<Vec<_>>().join(";");
    CanonicalRequest {
        text: format!(
            "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        ),
        signed_headers,
    }
}

/// Derives the per-day signing key.
fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

/// Computes HMAC-SHA256.
fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a timestamp as `YYYYMMDD'T'HHMMSS'Z'`.
pub(crate) fn format_amz_date(timestamp: OffsetDateTime) -> String {
    let format = format_description!("[year][month][day]T[hour][minute][second]Z");
    timestamp.to_offset(time::UtcOffset::UTC).format(&format).unwrap_or_default()
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Encodes a path, preserving `/` separators. Empty paths become `/`.
#[must_use]
pub fn uri_encode_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    uri_encode(path, false)
}

/// Builds the sorted, encoded query string.
#[must_use]
pub fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(key, value)| (uri_encode(key, true), uri_encode(value, true)))
        .collect();
    pairs.sort();
    pairs.iter().map(|(key, value)| format!("{key}={value}")).collect::<Vec<_>>().join("&")
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            b'/' if !encode_slash => out.push('/'),
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
