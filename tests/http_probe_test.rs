// tests/http_probe_test.rs

mod common;

use common::StaticResolver;
use portcyber_scanner::core::guard::TargetGuard;
use portcyber_scanner::core::models::{Caller, FindingKind, Target};
use portcyber_scanner::core::probe::{HttpRequest, NetworkProber, Prober, MAX_BODY_BYTES};
use portcyber_scanner::core::rate_limiter::RateLimiters;
use portcyber_scanner::{ScanError, Scanner, ScannerConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

async fn local_target(server: &MockServer) -> Target {
    TargetGuard::new(StaticResolver::new(&[]))
        .resolve_and_validate(&server.uri(), true)
        .await
        .unwrap()
}

fn prober() -> NetworkProber {
    NetworkProber::new(&ScannerConfig::default(), StaticResolver::new(&[]))
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn test_http_probe_captures_headers_and_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("server", "Apache/2.4.41")
                .append_header("set-cookie", "session=abc; Path=/")
                .append_header("set-cookie", "prefs=dark; Secure; HttpOnly; SameSite=Lax")
                .set_body_string("<html>hello</html>"),
        )
        .mount(&server)
        .await;

    let target = local_target(&server).await;
    let snapshot = prober()
        .http(&target, &HttpRequest::get(url(&server, "/")), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(snapshot.status, 200);
    assert_eq!(snapshot.header("server"), Some("Apache/2.4.41"));
    assert_eq!(snapshot.body, "<html>hello</html>");
    assert_eq!(snapshot.redirects, 0);
    assert_eq!(snapshot.cookies.len(), 2);
    let session = snapshot.cookies.iter().find(|c| c.name == "session").unwrap();
    assert!(!session.secure && !session.http_only);
    let prefs = snapshot.cookies.iter().find(|c| c.name == "prefs").unwrap();
    assert!(prefs.secure && prefs.http_only);
}

#[tokio::test]
async fn test_http_probe_truncates_large_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a".repeat(MAX_BODY_BYTES * 2)))
        .mount(&server)
        .await;

    let target = local_target(&server).await;
    let snapshot = prober()
        .http(&target, &HttpRequest::get(url(&server, "/big")), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(snapshot.body.len(), MAX_BODY_BYTES);
}

#[tokio::test]
async fn test_http_probe_follows_and_counts_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/middle"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/middle"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let target = local_target(&server).await;
    let request = HttpRequest::get(url(&server, "/old")).allowing_private_redirects(true);
    let snapshot = prober().http(&target, &request, &CancellationToken::new()).await.unwrap();

    assert_eq!(snapshot.status, 200);
    assert_eq!(snapshot.redirects, 2);
    assert!(snapshot.final_url.ends_with("/new"));
}

#[tokio::test]
async fn test_redirects_into_internal_hosts_are_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
        .mount(&server)
        .await;

    let target = local_target(&server).await;
    let snapshot = prober()
        .http(&target, &HttpRequest::get(url(&server, "/old")), &CancellationToken::new())
        .await
        .unwrap();

    // The hop points back at a loopback address, so the redirect itself is the answer.
    assert_eq!(snapshot.status, 302);
    assert_eq!(snapshot.redirects, 0);
    assert!(snapshot.final_url.ends_with("/old"));
}

async fn redirecting_server(location_host: &str) -> MockServer {
    let server = MockServer::start().await;
    let port = server.address().port();
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", format!("http://{}:{}/landing", location_host, port)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_redirect_to_name_resolving_internally_is_refused() {
    let server = redirecting_server("internal.test").await;
    let resolver = StaticResolver::new(&[("internal.test", "10.0.0.1")]);
    let prober = NetworkProber::new(&ScannerConfig::default(), resolver.clone());

    let target = local_target(&server).await;
    let result = prober
        .http(&target, &HttpRequest::get(url(&server, "/old")), &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert_eq!(resolver.calls(), 1);
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.iter().all(|r| r.url.path() != "/landing"));
}

#[tokio::test]
async fn test_redirect_to_name_uses_resolver_answer_when_private_allowed() {
    let server = redirecting_server("internal.test").await;
    let resolver = StaticResolver::new(&[("internal.test", "127.0.0.1")]);
    let prober = NetworkProber::new(&ScannerConfig::default(), resolver.clone());

    let target = local_target(&server).await;
    let request = HttpRequest::get(url(&server, "/old")).allowing_private_redirects(true);
    let snapshot = prober.http(&target, &request, &CancellationToken::new()).await.unwrap();

    assert_eq!(snapshot.status, 200);
    assert_eq!(snapshot.redirects, 1);
    assert_eq!(resolver.calls(), 1);
}

#[tokio::test]
async fn test_options_probe_reads_allow_header() {
    let server = MockServer::start().await;
    Mock::given(method("OPTIONS"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(204).insert_header("allow", "GET, PUT, DELETE"))
        .mount(&server)
        .await;

    let target = local_target(&server).await;
    let snapshot = prober()
        .http(&target, &HttpRequest::options(url(&server, "/")), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(snapshot.status, 204);
    assert_eq!(snapshot.header("allow"), Some("GET, PUT, DELETE"));
}

#[tokio::test]
async fn test_cancelled_probe_returns_promptly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(30)))
        .mount(&server)
        .await;

    let target = local_target(&server).await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = prober().http(&target, &HttpRequest::get(url(&server, "/")), &cancel).await;

    assert!(result.is_err());
}

fn local_scanner() -> Scanner {
    let config = ScannerConfig {
        allow_private_targets: true,
        ..Default::default()
    };
    let resolver = StaticResolver::new(&[]);
    let prober = Arc::new(NetworkProber::new(&config, resolver.clone()));
    let limiters = RateLimiters::from_config(&config);
    Scanner::new(config, resolver, prober, limiters)
}

#[tokio::test]
async fn test_basic_scan_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-frame-options", "DENY")
                .insert_header("x-powered-by", "Express")
                .set_body_string("<title>Index of /</title>"),
        )
        .mount(&server)
        .await;

    let response = local_scanner()
        .basic_scan(&server.uri(), &Caller::User("alice".to_string()))
        .await
        .unwrap();

    assert_eq!(response.metadata.status_code, Some(200));
    assert_eq!(response.metadata.powered_by.as_deref(), Some("Express"));
    let count = |kind: FindingKind| response.findings.iter().filter(|f| f.is(kind)).count();
    assert_eq!(count(FindingKind::MissingSecurityHeader), 4);
    assert_eq!(count(FindingKind::InsecureTransport), 1);
    assert_eq!(count(FindingKind::DirectoryListing), 1);
    assert_eq!(count(FindingKind::ServerBannerDisclosure), 1);
}

#[tokio::test]
async fn test_local_targets_stay_blocked_for_public_callers() {
    let server = MockServer::start().await;

    let err = local_scanner()
        .public_scan(&server.uri(), "198.51.100.20".parse().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::TargetBlocked { .. }));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
