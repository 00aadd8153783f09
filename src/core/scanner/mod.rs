// src/core/scanner/mod.rs

//! Scan orchestration.
//!
//! Every recipe runs the same fixed pipeline: validate the target through the
//! SSRF guard, charge the caller's rate limit, run the probes (independent ones
//! concurrently through `tokio::join!`), classify whatever succeeded and
//! assemble the response. A failed probe skips its classifiers and leaves its
//! error in the metadata; only the advanced recipe's primary GET is fatal.

pub mod api_audit;

use std::net::IpAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ScannerConfig;
use crate::core::analysis::{
    analyze_cookies, analyze_header_policy, analyze_options, analyze_transport, grade_tls, methods, transport,
};
use crate::core::error::ScanError;
use crate::core::guard::{DnsResolver, HostResolver, TargetGuard};
use crate::core::knowledge_base;
use crate::core::models::{
    Caller, Finding, FindingKind, PortState, ScanMetadata, ScanResponse, ScanType, Severity, Target, Tier,
    TlsMetadata,
};
use crate::core::probe::{scan_ports, HttpRequest, HttpSnapshot, NetworkProber, Prober, COMMON_PORTS};
use crate::core::rate_limiter::RateLimiters;

pub use api_audit::{EndpointSpec, MAX_AUDIT_ENDPOINTS};

/// Runs scan recipes on behalf of callers. Cheap to share behind an `Arc`;
/// the rate-limiter tables are the only state that outlives a call.
pub struct Scanner {
    config: ScannerConfig,
    guard: TargetGuard,
    prober: Arc<dyn Prober>,
    limiters: RateLimiters,
}

impl Scanner {
    pub fn new(
        config: ScannerConfig,
        resolver: Arc<dyn HostResolver>,
        prober: Arc<dyn Prober>,
        limiters: RateLimiters,
    ) -> Self {
        Self {
            config,
            guard: TargetGuard::new(resolver),
            prober,
            limiters,
        }
    }

    /// A scanner that resolves through system DNS and probes the real network.
    pub fn with_network(config: ScannerConfig) -> Self {
        let resolver: Arc<dyn HostResolver> = Arc::new(DnsResolver::new());
        let prober = Arc::new(NetworkProber::new(&config, resolver.clone()));
        let limiters = RateLimiters::from_config(&config);
        Self::new(config, resolver, prober, limiters)
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn limiters(&self) -> &RateLimiters {
        &self.limiters
    }

    /// Private targets need the config flag *and* an authenticated caller.
    fn allow_private(&self, caller: &Caller) -> bool {
        self.config.allow_private_targets && caller.tier() == Tier::Authenticated
    }

    /// Validation first, then the rate limit. Rejected targets never cost the caller a scan.
    async fn admit(&self, raw_url: &str, caller: &Caller) -> Result<Target, ScanError> {
        let target = self.guard.resolve_and_validate(raw_url, self.allow_private(caller)).await?;
        self.limiters.admit(caller)?;
        Ok(target)
    }

    /// Starts the per-scan deadline. The returned token is cancelled when it expires.
    fn start_deadline(&self) -> (CancellationToken, Deadline) {
        Deadline::start(self.config.scan_deadline())
    }

    /// Runs a named scan recipe for `caller`.
    ///
    /// # Arguments
    /// * `raw_url` - The user-supplied target URL.
    /// * `scan_type` - Which recipe to run. `ApiAudit` audits the default `GET /` endpoint.
    /// * `caller` - Who the scan is charged to.
    ///
    /// # Returns
    /// The completed `ScanResponse`, or the `ScanError` that stopped the pipeline.
    pub async fn scan(&self, raw_url: &str, scan_type: ScanType, caller: &Caller) -> Result<ScanResponse, ScanError> {
        info!(target = raw_url, %scan_type, %caller, "Scan requested.");

        // `None` is the basic recipe; `Some(with_ports)` the advanced one.
        let advanced = match scan_type {
            ScanType::ApiAudit => {
                let audit = self.api_audit(raw_url, &[], false, caller).await?;
                return Ok(api_audit::into_scan_response(audit));
            }
            ScanType::Aggressive if !self.port_scan_permitted(caller) => {
                warn!(%caller, "Aggressive scan refused: port scanning not permitted.");
                return Err(ScanError::PortScanNotPermitted);
            }
            ScanType::Basic => None,
            ScanType::Advanced => Some(false),
            ScanType::Aggressive => Some(true),
        };

        let target = self.admit(raw_url, caller).await?;
        let allow_private = self.allow_private(caller);
        let (cancel, deadline) = self.start_deadline();

        let outcome = match advanced {
            None => Ok(self.basic_recipe(&target, allow_private, &cancel).await),
            Some(with_ports) => self.advanced_recipe(&target, allow_private, with_ports, &cancel).await,
        };
        drop(deadline);

        let (findings, metadata) = outcome?;
        let findings = knowledge_base::annotate(findings);
        info!(target = target.raw_url(), %scan_type, findings = findings.len(), "Scan completed.");
        Ok(ScanResponse::completed(&target, scan_type, findings, metadata))
    }

    pub async fn basic_scan(&self, raw_url: &str, caller: &Caller) -> Result<ScanResponse, ScanError> {
        self.scan(raw_url, ScanType::Basic, caller).await
    }

    pub async fn advanced_scan(&self, raw_url: &str, caller: &Caller) -> Result<ScanResponse, ScanError> {
        self.scan(raw_url, ScanType::Advanced, caller).await
    }

    pub async fn aggressive_scan(&self, raw_url: &str, caller: &Caller) -> Result<ScanResponse, ScanError> {
        self.scan(raw_url, ScanType::Aggressive, caller).await
    }

    /// The basic recipe for an unauthenticated caller, limited per client IP.
    pub async fn public_scan(&self, raw_url: &str, client_ip: IpAddr) -> Result<ScanResponse, ScanError> {
        self.scan(raw_url, ScanType::Basic, &Caller::Anonymous(client_ip)).await
    }

    fn port_scan_permitted(&self, caller: &Caller) -> bool {
        self.config.allow_port_scan && caller.tier() == Tier::Authenticated
    }

    /// GET with redirects, then header policy and transport.
    async fn basic_recipe(
        &self,
        target: &Target,
        allow_private: bool,
        cancel: &CancellationToken,
    ) -> (Vec<Finding>, ScanMetadata) {
        let mut metadata = ScanMetadata {
            resolved_ip: Some(target.resolved_ip()),
            ..Default::default()
        };
        let mut findings = Vec::new();

        let request = match target_url(target) {
            Ok(url) => HttpRequest::get(url).allowing_private_redirects(allow_private),
            Err(e) => {
                metadata.http_error = Some(e.to_string());
                return (findings, metadata);
            }
        };

        match self.prober.http(target, &request, cancel).await {
            Ok(snapshot) => {
                record_http(&mut metadata, &snapshot);
                findings.extend(analyze_header_policy(&snapshot));
                findings.extend(analyze_transport(target, &snapshot));
            }
            Err(e) => {
                debug!(error = %e, "Basic GET failed; recording and continuing.");
                metadata.http_error = Some(e.to_string());
                findings.extend(transport::insecure_transport(target));
            }
        }
        (findings, metadata)
    }

    /// Primary GET (fatal on failure), then TLS, OPTIONS and optionally the port
    /// scan, concurrently.
    async fn advanced_recipe(
        &self,
        target: &Target,
        allow_private: bool,
        with_ports: bool,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Finding>, ScanMetadata), ScanError> {
        let url = target_url(target)?;
        let mut metadata = ScanMetadata {
            resolved_ip: Some(target.resolved_ip()),
            ..Default::default()
        };

        let get = HttpRequest::get(url.clone()).allowing_private_redirects(allow_private);
        let primary = self.prober.http(target, &get, cancel).await.map_err(|e| {
            warn!(target = target.raw_url(), error = %e, "Primary request failed.");
            ScanError::Unreachable {
                target: target.raw_url().to_string(),
                reason: e.to_string(),
            }
        })?;

        record_http(&mut metadata, &primary);
        let mut findings = analyze_header_policy(&primary);
        findings.extend(analyze_cookies(&primary.cookies));
        findings.extend(analyze_transport(target, &primary));

        let options = HttpRequest::options(url);
        let prober = self.prober.as_ref();
        let concurrency = self.config.port_scan_concurrency;
        let (tls, preflight, ports) = tokio::join!(
            async {
                if target.is_https() {
                    Some(prober.tls(target, cancel).await)
                } else {
                    None
                }
            },
            prober.http(target, &options, cancel),
            async {
                if with_ports {
                    Some(scan_ports(prober, target.resolved_ip(), COMMON_PORTS, concurrency, cancel).await)
                } else {
                    None
                }
            },
        );

        match tls {
            Some(Ok(info)) => {
                let assessment = grade_tls(&info);
                findings.extend(assessment.findings);
                metadata.tls = Some(TlsMetadata::Observed {
                    info,
                    grade: assessment.grade.to_string(),
                });
            }
            Some(Err(e)) => metadata.tls = Some(TlsMetadata::Failed { error: e.to_string() }),
            None => {}
        }

        match preflight {
            Ok(snapshot) => {
                metadata.allow_methods = methods::allowed_methods(&snapshot.headers);
                findings.extend(analyze_options(&snapshot));
            }
            Err(e) => metadata.options_error = Some(e.to_string()),
        }

        match ports {
            Some(Ok(reports)) => {
                findings.extend(reports.iter().filter(|r| r.state == PortState::Open).map(|r| {
                    Finding::new(
                        FindingKind::OpenPort,
                        Severity::Info,
                        format!("Port {} is open running {}", r.port, r.service),
                    )
                    .with_port(r.port, &r.service)
                }));
                metadata.ports = Some(reports);
            }
            Some(Err(e)) => metadata.ports_error = Some(e.to_string()),
            None => {}
        }

        Ok((findings, metadata))
    }
}

pub(crate) fn target_url(target: &Target) -> Result<Url, ScanError> {
    Url::parse(target.raw_url()).map_err(|e| ScanError::InvalidUrl {
        url: target.raw_url().to_string(),
        reason: e.to_string(),
    })
}

fn record_http(metadata: &mut ScanMetadata, snapshot: &HttpSnapshot) {
    metadata.status_code = Some(snapshot.status);
    metadata.final_url = Some(snapshot.final_url.clone());
    metadata.redirects = Some(snapshot.redirects);
    metadata.server = snapshot.header("server").map(str::to_string);
    metadata.powered_by = snapshot.header("x-powered-by").map(str::to_string);
}

/// Watchdog for one scan. Dropping it stops the watchdog, so a scan future that
/// is abandoned midway leaves no timer task behind.
pub(crate) struct Deadline {
    watchdog: JoinHandle<()>,
}

impl Deadline {
    pub(crate) fn start(limit: std::time::Duration) -> (CancellationToken, Self) {
        let cancel = CancellationToken::new();
        let watchdog = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(limit).await;
                warn!(deadline_secs = limit.as_secs(), "Scan deadline reached, cancelling probes.");
                cancel.cancel();
            }
        });
        (cancel, Self { watchdog })
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.watchdog.abort();
    }
}
