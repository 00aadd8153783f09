// src/core/probe/mod.rs

//! Probe primitives: one bounded network operation each.
//!
//! Scanners talk to the network only through the [`Prober`] trait. The
//! production implementation is [`NetworkProber`]; tests swap in fakes.

pub mod http_probe;
pub mod port_probe;
pub mod tls_probe;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::config::ScannerConfig;
use crate::core::error::ProbeError;
use crate::core::guard::HostResolver;
use crate::core::models::{PortReport, PortState, Target, TlsInfo};

/// Identifies the scanner in every HTTP request it sends.
pub const USER_AGENT: &str = concat!("PortCyber-Scanner/", env!("CARGO_PKG_VERSION"));

/// Response bodies are cut to this many bytes.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Ports checked by the aggressive recipe, with the service usually behind them.
pub const COMMON_PORTS: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "dns"),
    (80, "http"),
    (110, "pop3"),
    (143, "imap"),
    (443, "https"),
    (445, "smb"),
    (3306, "mysql"),
    (3389, "rdp"),
    (5432, "postgresql"),
    (6379, "redis"),
    (8080, "http-alt"),
    (8443, "https-alt"),
    (27017, "mongodb"),
];

/// A single HTTP request to issue against a validated target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: Url,
    pub method: Method,
    pub follow_redirects: bool,
    /// Lets redirect hops land on internal addresses. Mirrors the caller's allowance.
    pub allow_private_redirects: bool,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            follow_redirects: true,
            allow_private_redirects: false,
        }
    }

    pub fn options(url: Url) -> Self {
        Self {
            url,
            method: Method::OPTIONS,
            follow_redirects: false,
            allow_private_redirects: false,
        }
    }

    pub fn with_method(url: Url, method: Method) -> Self {
        Self {
            url,
            method,
            follow_redirects: false,
            allow_private_redirects: false,
        }
    }

    pub fn allowing_private_redirects(mut self, allow: bool) -> Self {
        self.allow_private_redirects = allow;
        self
    }
}

/// A cookie as announced by a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieInfo {
    pub name: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
}

impl CookieInfo {
    /// Parses one `Set-Cookie` header value. Returns `None` when there is no cookie name.
    pub fn parse(set_cookie: &str) -> Option<Self> {
        let mut parts = set_cookie.split(';');
        let pair = parts.next()?.trim();
        let name = pair.split('=').next()?.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = CookieInfo {
            name: name.to_string(),
            secure: false,
            http_only: false,
            same_site: None,
        };
        for attribute in parts {
            let mut kv = attribute.trim().splitn(2, '=');
            let key = kv.next().unwrap_or_default().trim().to_ascii_lowercase();
            match key.as_str() {
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "samesite" => cookie.same_site = kv.next().map(|v| v.trim().to_string()),
                _ => {}
            }
        }
        Some(cookie)
    }
}

/// What the HTTP probe observed. Built from a live response by the real prober, or
/// by hand in tests.
#[derive(Debug, Clone)]
pub struct HttpSnapshot {
    pub status: u16,
    pub headers: HeaderMap,
    pub cookies: Vec<CookieInfo>,
    pub final_url: String,
    pub redirects: usize,
    pub body: String,
}

impl HttpSnapshot {
    /// A response with the given status and headers, no body and no redirects.
    pub fn new(status: u16, headers: HeaderMap, final_url: &str) -> Self {
        let cookies = cookies_from_headers(&headers);
        Self {
            status,
            headers,
            cookies,
            final_url: final_url.to_string(),
            redirects: 0,
            body: String::new(),
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn with_redirects(mut self, redirects: usize, final_url: &str) -> Self {
        self.redirects = redirects;
        self.final_url = final_url.to_string();
        self
    }

    /// Header value as text; non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }
}

pub fn cookies_from_headers(headers: &HeaderMap) -> Vec<CookieInfo> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(CookieInfo::parse)
        .collect()
}

/// The network seam. Every method is a single, independently failing probe.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn http(&self, target: &Target, request: &HttpRequest, cancel: &CancellationToken) -> Result<HttpSnapshot, ProbeError>;

    async fn tls(&self, target: &Target, cancel: &CancellationToken) -> Result<TlsInfo, ProbeError>;

    async fn tcp_connect(&self, ip: IpAddr, port: u16, cancel: &CancellationToken) -> Result<PortState, ProbeError>;
}

/// Races `fut` against `cancel`.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(ProbeError::Cancelled),
        result = fut => result,
    }
}

/// Connect-scans every port in `ports` with at most `concurrency` attempts in flight.
///
/// Ports fail independently. The only scan-level failure is cancellation.
pub async fn scan_ports(
    prober: &dyn Prober,
    ip: IpAddr,
    ports: &[(u16, &str)],
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<Vec<PortReport>, ProbeError> {
    info!(%ip, ports = ports.len(), concurrency, "Starting port scan.");
    let outcomes: Vec<(u16, &str, Result<PortState, ProbeError>)> = stream::iter(ports.iter().copied())
        .map(|(port, service)| async move { (port, service, prober.tcp_connect(ip, port, cancel).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut reports = Vec::with_capacity(outcomes.len());
    for (port, service, outcome) in outcomes {
        match outcome {
            Ok(state) => reports.push(PortReport { port, service: service.to_string(), state }),
            Err(ProbeError::Cancelled) => return Err(ProbeError::Cancelled),
            Err(e) => {
                debug!(port, error = %e, "Port probe failed, reporting as filtered.");
                reports.push(PortReport { port, service: service.to_string(), state: PortState::Filtered });
            }
        }
    }
    reports.sort_by_key(|r| r.port);
    let open = reports.iter().filter(|r| r.state == PortState::Open).count();
    info!(%ip, open, "Port scan finished.");
    Ok(reports)
}

/// Probes the real network with reqwest, rustls/native-tls and tokio sockets.
pub struct NetworkProber {
    http_timeout: Duration,
    tls_timeout: Duration,
    port_timeout: Duration,
    max_redirects: usize,
    resolver: Arc<dyn HostResolver>,
}

impl NetworkProber {
    pub fn new(config: &ScannerConfig, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            http_timeout: config.http_timeout(),
            tls_timeout: config.tls_timeout(),
            port_timeout: config.port_timeout(),
            max_redirects: config.max_redirects,
            resolver,
        }
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn http(&self, target: &Target, request: &HttpRequest, cancel: &CancellationToken) -> Result<HttpSnapshot, ProbeError> {
        let options = http_probe::HttpOptions {
            timeout: self.http_timeout,
            max_redirects: self.max_redirects,
            resolver: self.resolver.clone(),
        };
        cancellable(cancel, http_probe::send(target, request, &options)).await
    }

    async fn tls(&self, target: &Target, cancel: &CancellationToken) -> Result<TlsInfo, ProbeError> {
        cancellable(cancel, tls_probe::inspect(target, self.tls_timeout)).await
    }

    async fn tcp_connect(&self, ip: IpAddr, port: u16, cancel: &CancellationToken) -> Result<PortState, ProbeError> {
        cancellable(cancel, async { Ok(port_probe::connect(ip, port, self.port_timeout).await) }).await
    }
}
