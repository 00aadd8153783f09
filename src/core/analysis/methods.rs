// src/core/analysis/methods.rs

use reqwest::header::HeaderMap;

use super::headers::cors_misconfiguration;
use crate::core::models::{Finding, FindingKind, Severity};
use crate::core::probe::HttpSnapshot;

/// Methods that should not be advertised on a public endpoint.
pub const RISKY_METHODS: [&str; 3] = ["PUT", "DELETE", "TRACE"];

/// The methods announced by `Allow`, falling back to `Access-Control-Allow-Methods`.
pub fn allowed_methods(headers: &HeaderMap) -> Option<String> {
    ["allow", "access-control-allow-methods"]
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .map(str::to_string)
}

pub fn excessive_methods(allow: &str) -> Option<Finding> {
    let announced: Vec<String> = allow.split(',').map(|m| m.trim().to_ascii_uppercase()).collect();
    let risky: Vec<&str> = RISKY_METHODS
        .iter()
        .copied()
        .filter(|m| announced.iter().any(|a| a == m))
        .collect();
    if risky.is_empty() {
        return None;
    }
    let joined = risky.join(", ");
    Some(
        Finding::new(
            FindingKind::ExcessiveMethods,
            Severity::Medium,
            format!("Server advertises potentially dangerous methods: {}", joined),
        )
        .with_method(&joined),
    )
}

/// Classifies an OPTIONS answer: risky advertised methods and a credentialed
/// wildcard CORS policy.
pub fn analyze_options(snapshot: &HttpSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();
    if let Some(allow) = allowed_methods(&snapshot.headers) {
        findings.extend(excessive_methods(&allow));
    }
    findings.extend(cors_misconfiguration(&snapshot.headers, Severity::High));
    findings
}
