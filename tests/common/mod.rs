// tests/common/mod.rs

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use portcyber_scanner::config::ScannerConfig;
use portcyber_scanner::core::error::ProbeError;
use portcyber_scanner::core::guard::HostResolver;
use portcyber_scanner::core::models::{PortState, Target, TlsInfo};
use portcyber_scanner::core::probe::{cancellable, HttpRequest, HttpSnapshot, Prober};
use portcyber_scanner::core::rate_limiter::RateLimiters;
use portcyber_scanner::Scanner;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Resolver backed by a fixed table, counting every lookup.
pub struct StaticResolver {
    answers: HashMap<String, Vec<IpAddr>>,
    calls: AtomicUsize,
}

impl StaticResolver {
    pub fn new(entries: &[(&str, &str)]) -> Arc<Self> {
        let mut answers: HashMap<String, Vec<IpAddr>> = HashMap::new();
        for (host, ip) in entries {
            answers.entry(host.to_string()).or_default().push(ip.parse().unwrap());
        }
        Arc::new(Self {
            answers,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.get(host).cloned().ok_or_else(|| format!("NXDOMAIN {}", host))
    }
}

/// Prober answering from a script keyed by (method, path). Unscripted requests get a 404.
#[derive(Default)]
pub struct ScriptedProber {
    http: HashMap<(Method, String), Result<HttpSnapshot, ProbeError>>,
    tls: Option<Result<TlsInfo, ProbeError>>,
    hang_tls: bool,
    open_ports: Vec<u16>,
    pub http_calls: AtomicUsize,
    pub tls_calls: AtomicUsize,
    pub tcp_calls: AtomicUsize,
    pub requests: Mutex<Vec<(Method, String)>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: Method, path: &str, response: Result<HttpSnapshot, ProbeError>) -> Self {
        self.http.insert((method, path.to_string()), response);
        self
    }

    pub fn with_tls(mut self, tls: Result<TlsInfo, ProbeError>) -> Self {
        self.tls = Some(tls);
        self
    }

    /// TLS never answers; the probe only returns once the scan is cancelled.
    pub fn with_hanging_tls(mut self) -> Self {
        self.hang_tls = true;
        self
    }

    pub fn with_open_ports(mut self, ports: &[u16]) -> Self {
        self.open_ports = ports.to_vec();
        self
    }

    pub fn total_calls(&self) -> usize {
        self.http_calls.load(Ordering::SeqCst) + self.tls_calls.load(Ordering::SeqCst) + self.tcp_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn http(&self, _target: &Target, request: &HttpRequest, _cancel: &CancellationToken) -> Result<HttpSnapshot, ProbeError> {
        self.http_calls.fetch_add(1, Ordering::SeqCst);
        let key = (request.method.clone(), request.url.path().to_string());
        self.requests.lock().push(key.clone());
        match self.http.get(&key) {
            Some(response) => response.clone(),
            None => Ok(HttpSnapshot::new(404, text_headers(), request.url.as_str())),
        }
    }

    async fn tls(&self, _target: &Target, cancel: &CancellationToken) -> Result<TlsInfo, ProbeError> {
        self.tls_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_tls {
            return cancellable(cancel, std::future::pending()).await;
        }
        self.tls
            .clone()
            .unwrap_or_else(|| Err(ProbeError::Tls("no TLS scripted".to_string())))
    }

    async fn tcp_connect(&self, _ip: IpAddr, port: u16, _cancel: &CancellationToken) -> Result<PortState, ProbeError> {
        self.tcp_calls.fetch_add(1, Ordering::SeqCst);
        Ok(if self.open_ports.contains(&port) {
            PortState::Open
        } else {
            PortState::Closed
        })
    }
}

pub fn text_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("text/html; charset=utf-8"));
    headers
}

/// Every security header present, plus a `Server` banner.
pub fn hardened_headers() -> HeaderMap {
    let mut headers = text_headers();
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("strict-transport-security", HeaderValue::from_static("max-age=63072000; includeSubDomains"));
    headers.insert("content-security-policy", HeaderValue::from_static("default-src 'self'"));
    headers.insert("x-xss-protection", HeaderValue::from_static("0"));
    headers.insert("server", HeaderValue::from_static("nginx"));
    headers
}

pub fn tls_info(protocol: &str, days: i64) -> TlsInfo {
    let now = Utc::now();
    TlsInfo {
        protocol: protocol.to_string(),
        issuer: "R11".to_string(),
        subject: "example.com".to_string(),
        not_before: now - ChronoDuration::days(30),
        not_after: now + ChronoDuration::days(days),
        days_remaining: days,
        self_signed: false,
        trusted: true,
        legacy_protocols_accepted: false,
    }
}

pub fn scanner(config: ScannerConfig, resolver: Arc<StaticResolver>, prober: Arc<ScriptedProber>) -> Scanner {
    let limiters = RateLimiters::from_config(&config);
    Scanner::new(config, resolver, prober, limiters)
}
