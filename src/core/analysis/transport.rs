// src/core/analysis/transport.rs

use reqwest::header::HeaderMap;

use crate::core::models::{Finding, FindingKind, Severity, Target};
use crate::core::probe::HttpSnapshot;

const BANNER_HEADERS: [(&str, &str); 2] = [("server", "Server"), ("x-powered-by", "X-Powered-By")];

pub fn insecure_transport(target: &Target) -> Option<Finding> {
    if target.is_https() {
        return None;
    }
    Some(Finding::new(
        FindingKind::InsecureTransport,
        Severity::Medium,
        "Target is served over plain HTTP; traffic can be read and modified in transit",
    ))
}

/// An https target whose redirect chain lands on plain http.
pub fn redirect_downgrade(target: &Target, snapshot: &HttpSnapshot) -> Option<Finding> {
    if target.is_https() && snapshot.final_url.starts_with("http://") {
        Some(Finding::new(
            FindingKind::RedirectDowngrade,
            Severity::High,
            format!("HTTPS request was redirected to insecure {}", snapshot.final_url),
        ))
    } else {
        None
    }
}

/// One `Info` finding per software banner header the server exposes.
pub fn banner_disclosure(headers: &HeaderMap) -> Vec<Finding> {
    BANNER_HEADERS
        .iter()
        .filter_map(|(lookup, display)| {
            let value = headers.get(*lookup)?.to_str().ok()?;
            Some(
                Finding::new(
                    FindingKind::ServerBannerDisclosure,
                    Severity::Info,
                    format!("{} header discloses '{}'", display, value),
                )
                .with_header(display),
            )
        })
        .collect()
}

pub fn analyze_transport(target: &Target, snapshot: &HttpSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(insecure_transport(target));
    findings.extend(redirect_downgrade(target, snapshot));
    findings.extend(banner_disclosure(&snapshot.headers));
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Scheme;
    use reqwest::header::HeaderValue;

    fn target(scheme: Scheme) -> Target {
        let url = format!("{}://example.com/", scheme);
        let port = if scheme == Scheme::Https { 443 } else { 80 };
        Target::new(&url, scheme, "example.com", port, "93.184.216.34".parse().unwrap())
    }

    #[test]
    fn plain_http_is_insecure_transport() {
        let snapshot = HttpSnapshot::new(200, HeaderMap::new(), "http://example.com/");
        let findings = analyze_transport(&target(Scheme::Http), &snapshot);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is(FindingKind::InsecureTransport));
    }

    #[test]
    fn https_downgraded_by_redirect_is_high() {
        let snapshot = HttpSnapshot::new(200, HeaderMap::new(), "https://example.com/")
            .with_redirects(1, "http://example.com/login");
        let findings = analyze_transport(&target(Scheme::Https), &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn each_banner_header_is_reported() {
        let mut headers = HeaderMap::new();
        headers.insert("Server", HeaderValue::from_static("nginx/1.25.3"));
        headers.insert("X-Powered-By", HeaderValue::from_static("PHP/8.2"));
        let findings = banner_disclosure(&headers);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[1].header.as_deref(), Some("X-Powered-By"));
        assert!(findings.iter().all(|f| f.severity == Severity::Info));
    }
}
