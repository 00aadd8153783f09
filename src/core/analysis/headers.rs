// src/core/analysis/headers.rs

use reqwest::header::HeaderMap;
use tracing::debug;

use crate::core::models::{Finding, FindingKind, Severity};
use crate::core::probe::HttpSnapshot;

/// Response headers every page is expected to carry, as (lookup name, display name).
pub const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-frame-options", "X-Frame-Options"),
    ("x-content-type-options", "X-Content-Type-Options"),
    ("strict-transport-security", "Strict-Transport-Security"),
    ("content-security-policy", "Content-Security-Policy"),
    ("x-xss-protection", "X-XSS-Protection"),
];

const DIRECTORY_LISTING_SIGNATURES: [&str; 2] = ["Index of /", "Directory listing for"];

/// One `Low` finding per security header absent from `headers`.
pub fn missing_security_headers(headers: &HeaderMap) -> Vec<Finding> {
    SECURITY_HEADERS
        .iter()
        .filter(|(lookup, _)| !headers.contains_key(*lookup))
        .map(|(_, name)| {
            debug!(header = name, "Security header missing.");
            Finding::new(FindingKind::MissingSecurityHeader, Severity::Low, format!("Missing {} header", name))
                .with_header(name)
        })
        .collect()
}

/// Flags a wildcard `Access-Control-Allow-Origin` combined with credentials.
///
/// The same combination is `Medium` on a plain response and `High` on a
/// preflight answer, so the caller picks the severity.
pub fn cors_misconfiguration(headers: &HeaderMap, severity: Severity) -> Option<Finding> {
    let origin = headers.get("access-control-allow-origin").and_then(|v| v.to_str().ok())?;
    let credentials = headers
        .get("access-control-allow-credentials")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if origin.trim() == "*" && credentials {
        Some(
            Finding::new(
                FindingKind::CorsMisconfiguration,
                severity,
                "Access-Control-Allow-Origin is '*' while credentials are allowed",
            )
            .with_header("Access-Control-Allow-Origin"),
        )
    } else {
        None
    }
}

pub fn directory_listing(body: &str) -> Option<Finding> {
    DIRECTORY_LISTING_SIGNATURES.iter().find(|sig| body.contains(*sig)).map(|sig| {
        Finding::new(
            FindingKind::DirectoryListing,
            Severity::Low,
            format!("Response body looks like a directory listing ('{}')", sig),
        )
    })
}

/// Header policy over a GET response: missing security headers, permissive
/// CORS and exposed directory listings.
pub fn analyze_header_policy(snapshot: &HttpSnapshot) -> Vec<Finding> {
    let mut findings = missing_security_headers(&snapshot.headers);
    findings.extend(cors_misconfiguration(&snapshot.headers, Severity::Medium));
    findings.extend(directory_listing(&snapshot.body));
    findings
}
