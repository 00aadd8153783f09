// tests/scan_scenarios.rs

mod common;

use common::{hardened_headers, scanner, text_headers, tls_info, ScriptedProber, StaticResolver};
use portcyber_scanner::core::error::{ErrorClass, ProbeError};
use portcyber_scanner::core::models::{Caller, FindingKind, ScanType, Severity, TlsMetadata};
use portcyber_scanner::core::probe::HttpSnapshot;
use portcyber_scanner::core::scanner::EndpointSpec;
use portcyber_scanner::{ScanError, ScannerConfig};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn user() -> Caller {
    Caller::User("alice".to_string())
}

fn anonymous(ip: &str) -> Caller {
    Caller::Anonymous(ip.parse().unwrap())
}

fn ok_page(url: &str) -> Result<HttpSnapshot, ProbeError> {
    Ok(HttpSnapshot::new(200, hardened_headers(), url))
}

#[tokio::test]
async fn test_metadata_endpoint_is_blocked_before_any_probe() {
    let resolver = StaticResolver::new(&[]);
    let prober = Arc::new(ScriptedProber::new());
    let scanner = scanner(ScannerConfig::default(), resolver.clone(), prober.clone());

    let err = scanner
        .basic_scan("http://169.254.169.254/latest/meta-data/", &user())
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::TargetBlocked { .. }));
    assert_eq!(err.class(), ErrorClass::SecurityPolicy);
    assert_eq!(err.status_code(), 400);
    assert_eq!(resolver.calls(), 0);
    assert_eq!(prober.total_calls(), 0);
}

#[tokio::test]
async fn test_hostname_resolving_internally_is_blocked() {
    let resolver = StaticResolver::new(&[("intranet.example.com", "93.184.216.34"), ("intranet.example.com", "10.0.0.5")]);
    let prober = Arc::new(ScriptedProber::new());
    let scanner = scanner(ScannerConfig::default(), resolver.clone(), prober.clone());

    let err = scanner.advanced_scan("https://intranet.example.com", &user()).await.unwrap_err();

    match err {
        ScanError::TargetBlocked { ip, .. } => assert_eq!(ip, "10.0.0.5".parse::<IpAddr>().unwrap()),
        other => panic!("expected TargetBlocked, got {other:?}"),
    }
    assert_eq!(resolver.calls(), 1);
    assert_eq!(prober.total_calls(), 0);
}

#[tokio::test]
async fn test_non_http_schemes_never_reach_dns() {
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(ScriptedProber::new());
    let scanner = scanner(ScannerConfig::default(), resolver.clone(), prober.clone());

    for raw in ["ftp://example.com", "file:///etc/passwd", "example.com"] {
        let err = scanner.basic_scan(raw, &user()).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidScheme(_) | ScanError::InvalidUrl { .. }), "{raw}: {err:?}");
        assert_eq!(err.status_code(), 400);
    }
    let err = scanner.basic_scan("ftp://example.com", &user()).await.unwrap_err();
    assert!(matches!(err, ScanError::InvalidScheme(ref s) if s == "ftp"));

    assert_eq!(resolver.calls(), 0);
    assert_eq!(prober.total_calls(), 0);
}

#[tokio::test]
async fn test_well_configured_site_grades_a_plus() {
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(
        ScriptedProber::new()
            .on(Method::GET, "/", ok_page("https://example.com/"))
            .with_tls(Ok(tls_info("TLSv1.3", 120))),
    );
    let scanner = scanner(ScannerConfig::default(), resolver, prober.clone());

    let response = scanner.advanced_scan("https://example.com", &user()).await.unwrap();

    assert_eq!(response.status, "completed");
    assert_eq!(response.scan_type, ScanType::Advanced);
    match response.metadata.tls {
        Some(TlsMetadata::Observed { ref grade, ref info }) => {
            assert_eq!(grade, "A+");
            assert_eq!(info.protocol, "TLSv1.3");
        }
        ref other => panic!("expected observed TLS, got {other:?}"),
    }
    assert!(!response.findings.is_empty());
    for finding in &response.findings {
        assert!(finding.is(FindingKind::ServerBannerDisclosure), "unexpected finding {finding:?}");
        assert_eq!(finding.severity, Severity::Info);
        assert!(finding.remediation.is_some());
    }
    assert_eq!(response.metadata.server.as_deref(), Some("nginx"));
    assert_eq!(response.metadata.resolved_ip, Some("93.184.216.34".parse().unwrap()));
    assert_eq!(prober.tls_calls.load(Ordering::SeqCst), 1);
    assert_eq!(prober.tcp_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_basic_scan_reports_missing_headers_and_plain_http() {
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(
        ScriptedProber::new().on(Method::GET, "/", Ok(HttpSnapshot::new(200, text_headers(), "http://example.com/"))),
    );
    let scanner = scanner(ScannerConfig::default(), resolver, prober.clone());

    let response = scanner.basic_scan("http://example.com", &user()).await.unwrap();

    let missing = response.findings.iter().filter(|f| f.is(FindingKind::MissingSecurityHeader)).count();
    assert_eq!(missing, 5);
    assert!(response.findings.iter().any(|f| f.is(FindingKind::InsecureTransport)));
    assert!(response.metadata.tls.is_none());
    assert_eq!(prober.tls_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_basic_scan_survives_a_failed_request() {
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(ScriptedProber::new().on(Method::GET, "/", Err(ProbeError::Timeout(Duration::from_secs(8)))));
    let scanner = scanner(ScannerConfig::default(), resolver, prober);

    let response = scanner.basic_scan("http://example.com", &user()).await.unwrap();

    assert_eq!(response.status, "completed");
    assert!(response.metadata.http_error.is_some());
    assert!(response.metadata.status_code.is_none());
}

#[tokio::test]
async fn test_advanced_scan_fails_when_primary_request_fails() {
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(
        ScriptedProber::new().on(Method::GET, "/", Err(ProbeError::Connect("connection refused".to_string()))),
    );
    let scanner = scanner(ScannerConfig::default(), resolver, prober);

    let err = scanner.advanced_scan("https://example.com", &user()).await.unwrap_err();

    assert!(matches!(err, ScanError::Unreachable { .. }));
    assert_eq!(err.status_code(), 502);
}

#[tokio::test]
async fn test_tls_failure_is_recorded_not_fatal() {
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(
        ScriptedProber::new()
            .on(Method::GET, "/", ok_page("https://example.com/"))
            .with_tls(Err(ProbeError::Tls("handshake failure".to_string()))),
    );
    let scanner = scanner(ScannerConfig::default(), resolver, prober);

    let response = scanner.advanced_scan("https://example.com", &user()).await.unwrap();

    assert!(matches!(response.metadata.tls, Some(TlsMetadata::Failed { .. })));
}

#[tokio::test]
async fn test_options_probe_flags_risky_methods() {
    let mut allow = HeaderMap::new();
    allow.insert("allow", HeaderValue::from_static("GET, POST, PUT, DELETE, TRACE"));
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(
        ScriptedProber::new()
            .on(Method::GET, "/", ok_page("https://example.com/"))
            .on(Method::OPTIONS, "/", Ok(HttpSnapshot::new(204, allow, "https://example.com/")))
            .with_tls(Ok(tls_info("TLSv1.2", 200))),
    );
    let scanner = scanner(ScannerConfig::default(), resolver, prober);

    let response = scanner.advanced_scan("https://example.com", &user()).await.unwrap();

    let excessive: Vec<_> = response.findings.iter().filter(|f| f.is(FindingKind::ExcessiveMethods)).collect();
    assert_eq!(excessive.len(), 1);
    assert_eq!(excessive[0].severity, Severity::Medium);
    assert_eq!(response.metadata.allow_methods.as_deref(), Some("GET, POST, PUT, DELETE, TRACE"));
}

#[tokio::test]
async fn test_aggressive_scan_needs_an_authenticated_caller() {
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(ScriptedProber::new());
    let scanner = scanner(ScannerConfig::default(), resolver.clone(), prober.clone());

    let err = scanner.aggressive_scan("https://example.com", &anonymous("203.0.113.7")).await.unwrap_err();

    assert_eq!(err, ScanError::PortScanNotPermitted);
    assert_eq!(err.status_code(), 403);
    assert_eq!(resolver.calls(), 0);
    assert_eq!(prober.total_calls(), 0);
}

#[tokio::test]
async fn test_aggressive_scan_disabled_by_config() {
    let config = ScannerConfig {
        allow_port_scan: false,
        ..Default::default()
    };
    let scanner = scanner(config, StaticResolver::new(&[]), Arc::new(ScriptedProber::new()));

    let err = scanner.scan("https://example.com", ScanType::Aggressive, &user()).await.unwrap_err();

    assert_eq!(err, ScanError::PortScanNotPermitted);
}

#[tokio::test]
async fn test_aggressive_scan_reports_open_ports() {
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(
        ScriptedProber::new()
            .on(Method::GET, "/", ok_page("https://example.com/"))
            .with_tls(Ok(tls_info("TLSv1.3", 120)))
            .with_open_ports(&[22, 443]),
    );
    let scanner = scanner(ScannerConfig::default(), resolver, prober.clone());

    let response = scanner.aggressive_scan("https://example.com", &user()).await.unwrap();

    let mut open: Vec<u16> = response
        .findings
        .iter()
        .filter(|f| f.is(FindingKind::OpenPort))
        .filter_map(|f| f.port)
        .collect();
    open.sort_unstable();
    assert_eq!(open, vec![22, 443]);
    let ports = response.metadata.ports.expect("port reports");
    assert_eq!(ports.len(), prober.tcp_calls.load(Ordering::SeqCst));
    assert!(ports.windows(2).all(|w| w[0].port < w[1].port));
}

#[tokio::test]
async fn test_public_tier_limits_each_ip_separately() {
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(ScriptedProber::new().on(Method::GET, "/", ok_page("https://example.com/")));
    let scanner = scanner(ScannerConfig::default(), resolver, prober);
    let first: IpAddr = "198.51.100.20".parse().unwrap();
    let second: IpAddr = "198.51.100.21".parse().unwrap();

    for _ in 0..10 {
        scanner.public_scan("https://example.com", first).await.unwrap();
    }
    let err = scanner.public_scan("https://example.com", first).await.unwrap_err();

    assert!(matches!(err, ScanError::RateLimited { .. }));
    assert_eq!(err.status_code(), 429);
    assert!(err.is_retryable());
    assert!(err.retry_after().unwrap().as_secs() <= 300);

    scanner.public_scan("https://example.com", second).await.unwrap();
}

#[tokio::test]
async fn test_rejected_targets_do_not_consume_the_limit() {
    let config = ScannerConfig {
        user_scan_limit: 1,
        ..Default::default()
    };
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(ScriptedProber::new().on(Method::GET, "/", ok_page("https://example.com/")));
    let scanner = scanner(config, resolver, prober);

    for _ in 0..3 {
        assert!(scanner.basic_scan("http://127.0.0.1:8080", &user()).await.is_err());
    }
    scanner.basic_scan("https://example.com", &user()).await.unwrap();
    let err = scanner.basic_scan("https://example.com", &user()).await.unwrap_err();
    assert!(matches!(err, ScanError::RateLimited { .. }));
}

#[tokio::test]
async fn test_private_targets_need_flag_and_authentication() {
    let config = ScannerConfig {
        allow_private_targets: true,
        ..Default::default()
    };
    let resolver = StaticResolver::new(&[("staging.internal", "10.0.0.5")]);
    let prober = Arc::new(ScriptedProber::new().on(Method::GET, "/", ok_page("http://staging.internal/")));
    let scanner = scanner(config, resolver, prober);

    scanner.basic_scan("http://staging.internal", &user()).await.unwrap();
    let err = scanner.public_scan("http://staging.internal", "198.51.100.20".parse().unwrap()).await.unwrap_err();
    assert!(matches!(err, ScanError::TargetBlocked { .. }));
}

#[tokio::test]
async fn test_deadline_cancels_outstanding_probes() {
    let config = ScannerConfig {
        scan_deadline_secs: 1,
        ..Default::default()
    };
    let resolver = StaticResolver::new(&[("example.com", "93.184.216.34")]);
    let prober = Arc::new(
        ScriptedProber::new()
            .on(Method::GET, "/", ok_page("https://example.com/"))
            .with_hanging_tls(),
    );
    let scanner = scanner(config, resolver, prober);

    let response = scanner.advanced_scan("https://example.com", &user()).await.unwrap();

    match response.metadata.tls {
        Some(TlsMetadata::Failed { ref error }) => assert_eq!(error, &ProbeError::Cancelled.to_string()),
        ref other => panic!("expected cancelled TLS probe, got {other:?}"),
    }
}

#[tokio::test]
async fn test_api_audit_validates_before_resolving() {
    let resolver = StaticResolver::new(&[("api.example.com", "93.184.216.34")]);
    let prober = Arc::new(ScriptedProber::new());
    let scanner = scanner(ScannerConfig::default(), resolver.clone(), prober.clone());

    let too_many: Vec<EndpointSpec> = (0..26).map(|i| EndpointSpec::new("GET", &format!("/e{i}"))).collect();
    let err = scanner.api_audit("https://api.example.com", &too_many, false, &user()).await.unwrap_err();
    assert_eq!(err, ScanError::TooManyEndpoints { given: 26, max: 25 });

    let bad_method = [EndpointSpec::new("TRACE", "/")];
    let err = scanner.api_audit("https://api.example.com", &bad_method, false, &user()).await.unwrap_err();
    assert!(matches!(err, ScanError::InvalidMethod(_)));

    assert_eq!(resolver.calls(), 0);
    assert_eq!(prober.total_calls(), 0);
}

#[tokio::test]
async fn test_api_audit_classifies_each_endpoint() {
    let mut bare = HeaderMap::new();
    bare.insert("server", HeaderValue::from_static("gunicorn"));
    let mut preflight = HeaderMap::new();
    preflight.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    preflight.insert("access-control-allow-credentials", HeaderValue::from_static("true"));
    preflight.insert("access-control-allow-methods", HeaderValue::from_static("GET, DELETE"));

    let resolver = StaticResolver::new(&[("api.example.com", "93.184.216.34")]);
    let prober = Arc::new(
        ScriptedProber::new()
            .on(Method::GET, "/users", Ok(HttpSnapshot::new(200, bare.clone(), "https://api.example.com/users")))
            .on(Method::POST, "/orders", Ok(HttpSnapshot::new(503, bare, "https://api.example.com/orders")))
            .on(Method::OPTIONS, "/users", Ok(HttpSnapshot::new(204, preflight, "https://api.example.com/users"))),
    );
    let scanner = scanner(ScannerConfig::default(), resolver, prober.clone());
    let endpoints = ["/users".parse::<EndpointSpec>().unwrap(), "POST /orders".parse().unwrap()];

    let audit = scanner.api_audit("https://api.example.com", &endpoints, true, &user()).await.unwrap();

    assert_eq!(audit.probes.len(), 2);
    assert_eq!(audit.probes[0].endpoint, "/users");
    assert_eq!(audit.probes[1].status_code, Some(503));

    let count = |kind: FindingKind| audit.findings.iter().filter(|f| f.is(kind)).count();
    assert_eq!(count(FindingKind::ServerErrorResponse), 1);
    assert_eq!(count(FindingKind::MissingContentType), 1);
    assert_eq!(count(FindingKind::ServerBannerDisclosure), 1);
    assert_eq!(count(FindingKind::ExcessiveMethods), 1);
    let cors = audit
        .findings
        .iter()
        .find(|f| f.is(FindingKind::CorsMisconfiguration))
        .expect("CORS finding");
    assert_eq!(cors.severity, Severity::High);
    assert_eq!(cors.endpoint.as_deref(), Some("/users"));

    // Each endpoint gets its request plus one OPTIONS probe.
    assert_eq!(prober.http_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_api_audit_through_scan_uses_default_endpoint() {
    let resolver = StaticResolver::new(&[("api.example.com", "93.184.216.34")]);
    let prober = Arc::new(ScriptedProber::new().on(Method::GET, "/", ok_page("https://api.example.com/")));
    let scanner = scanner(ScannerConfig::default(), resolver, prober.clone());

    let response = scanner.scan("https://api.example.com", ScanType::ApiAudit, &user()).await.unwrap();

    assert_eq!(response.scan_type, ScanType::ApiAudit);
    assert_eq!(response.metadata.status_code, Some(200));
    assert_eq!(prober.requests.lock().as_slice(), &[(Method::GET, "/".to_string())]);
}
