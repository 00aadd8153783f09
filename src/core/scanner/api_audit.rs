// src/core/scanner/api_audit.rs

use futures::stream::{self, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::{target_url, Scanner};
use crate::core::analysis::headers::cors_misconfiguration;
use crate::core::analysis::methods::{allowed_methods, excessive_methods};
use crate::core::analysis::transport::{banner_disclosure, insecure_transport};
use crate::core::error::ScanError;
use crate::core::knowledge_base;
use crate::core::models::{
    ApiAuditProbe, ApiAuditResponse, Caller, Finding, FindingKind, ScanMetadata, ScanResponse, ScanType, Severity,
    Target,
};
use crate::core::probe::HttpRequest;

pub const MAX_AUDIT_ENDPOINTS: usize = 25;

const AUDIT_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// One endpoint to audit: a path relative to the base URL and the method to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub path: String,
    pub method: String,
}

impl EndpointSpec {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_string(),
        }
    }

    fn validated_method(&self) -> Result<Method, ScanError> {
        let upper = self.method.trim().to_ascii_uppercase();
        if !AUDIT_METHODS.contains(&upper.as_str()) {
            return Err(ScanError::InvalidMethod(self.method.clone()));
        }
        Method::from_bytes(upper.as_bytes()).map_err(|_| ScanError::InvalidMethod(self.method.clone()))
    }
}

impl Default for EndpointSpec {
    fn default() -> Self {
        Self::new("GET", "/")
    }
}

impl fmt::Display for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Parses `"METHOD /path"`, or a bare path which means `GET`.
impl FromStr for EndpointSpec {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let spec = match s.split_once(char::is_whitespace) {
            Some((method, path)) => EndpointSpec::new(method, path.trim()),
            None if s.starts_with('/') => EndpointSpec::new("GET", s),
            None => EndpointSpec::new(s, "/"),
        };
        spec.validated_method()?;
        Ok(spec)
    }
}

/// Joins `path` onto the base URL, keeping the base's scheme, host and port.
fn endpoint_url(base: &Url, path: &str) -> Result<Url, ScanError> {
    let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));
    let url = Url::parse(&joined).map_err(|e| ScanError::InvalidUrl {
        url: joined.clone(),
        reason: e.to_string(),
    })?;
    if url.host_str() != base.host_str() || url.port_or_known_default() != base.port_or_known_default() {
        return Err(ScanError::InvalidUrl {
            url: joined,
            reason: "endpoint must stay on the audited host".to_string(),
        });
    }
    Ok(url)
}

/// Drops repeated findings, keyed on type plus header, method and endpoint.
fn dedup(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen = HashSet::new();
    findings
        .into_iter()
        .filter(|f| seen.insert((f.kind.clone(), f.header.clone(), f.method.clone(), f.endpoint.clone())))
        .collect()
}

struct EndpointPlan {
    spec: EndpointSpec,
    method: Method,
    url: Url,
}

impl Scanner {
    /// Audits a list of API endpoints on one base URL.
    ///
    /// Endpoint count and methods are checked before the target is resolved, so a
    /// malformed request never reaches DNS or the rate limiter. An empty list
    /// audits `GET /`.
    pub async fn api_audit(
        &self,
        raw_url: &str,
        endpoints: &[EndpointSpec],
        probe_options: bool,
        caller: &Caller,
    ) -> Result<ApiAuditResponse, ScanError> {
        if endpoints.len() > MAX_AUDIT_ENDPOINTS {
            return Err(ScanError::TooManyEndpoints {
                given: endpoints.len(),
                max: MAX_AUDIT_ENDPOINTS,
            });
        }
        let defaults = [EndpointSpec::default()];
        let endpoints = if endpoints.is_empty() { &defaults[..] } else { endpoints };
        let methods = endpoints
            .iter()
            .map(EndpointSpec::validated_method)
            .collect::<Result<Vec<_>, _>>()?;

        let target = self.admit(raw_url, caller).await?;
        let base = target_url(&target)?;
        let plans = endpoints
            .iter()
            .zip(methods)
            .map(|(spec, method)| {
                Ok(EndpointPlan {
                    url: endpoint_url(&base, &spec.path)?,
                    spec: spec.clone(),
                    method,
                })
            })
            .collect::<Result<Vec<_>, ScanError>>()?;

        info!(target = target.raw_url(), endpoints = plans.len(), probe_options, %caller, "Starting API audit.");
        let (cancel, deadline) = self.start_deadline();
        let concurrency = self.config.port_scan_concurrency.max(1);
        let results: Vec<(ApiAuditProbe, Vec<Finding>)> = stream::iter(plans.iter())
            .map(|plan| self.audit_endpoint(&target, plan, probe_options, &cancel))
            .buffered(concurrency)
            .collect()
            .await;
        drop(deadline);

        let mut findings: Vec<Finding> = insecure_transport(&target).into_iter().collect();
        let mut probes = Vec::with_capacity(results.len());
        for (probe, endpoint_findings) in results {
            probes.push(probe);
            findings.extend(endpoint_findings);
        }
        let findings = knowledge_base::annotate(dedup(findings));
        info!(target = target.raw_url(), findings = findings.len(), "API audit completed.");

        Ok(ApiAuditResponse {
            target: target.raw_url().to_string(),
            probes,
            findings,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn audit_endpoint(
        &self,
        target: &Target,
        plan: &EndpointPlan,
        probe_options: bool,
        cancel: &CancellationToken,
    ) -> (ApiAuditProbe, Vec<Finding>) {
        let endpoint = plan.spec.path.as_str();
        let mut probe = ApiAuditProbe {
            endpoint: endpoint.to_string(),
            method: plan.method.to_string(),
            url: plan.url.to_string(),
            status_code: None,
            content_type: None,
            allow_methods: None,
            error: None,
        };
        let mut findings = Vec::new();

        let request = HttpRequest::with_method(plan.url.clone(), plan.method.clone());
        match self.prober.http(target, &request, cancel).await {
            Ok(snapshot) => {
                debug!(endpoint, status = snapshot.status, "Endpoint answered.");
                probe.status_code = Some(snapshot.status);
                probe.content_type = snapshot.header("content-type").map(str::to_string);

                if snapshot.status >= 500 {
                    findings.push(
                        Finding::new(
                            FindingKind::ServerErrorResponse,
                            Severity::Low,
                            format!("{} {} answered with status {}", plan.method, endpoint, snapshot.status),
                        )
                        .with_endpoint(endpoint),
                    );
                }
                let has_body = plan.method != Method::HEAD && snapshot.status != 204;
                if (200..300).contains(&snapshot.status) && has_body && probe.content_type.is_none() {
                    findings.push(
                        Finding::new(
                            FindingKind::MissingContentType,
                            Severity::Info,
                            format!("{} {} returned a body without a Content-Type", plan.method, endpoint),
                        )
                        .with_endpoint(endpoint),
                    );
                }
                if plan.method == Method::OPTIONS {
                    // The request itself was the preflight.
                    probe.allow_methods = allowed_methods(&snapshot.headers);
                    findings.extend(preflight_findings(&snapshot.headers, endpoint));
                } else {
                    findings.extend(
                        cors_misconfiguration(&snapshot.headers, Severity::Medium).map(|f| f.with_endpoint(endpoint)),
                    );
                }
                findings.extend(banner_disclosure(&snapshot.headers));
            }
            Err(e) => probe.error = Some(e.to_string()),
        }

        if probe_options && plan.method != Method::OPTIONS {
            let preflight = HttpRequest::options(plan.url.clone());
            match self.prober.http(target, &preflight, cancel).await {
                Ok(snapshot) => {
                    probe.allow_methods = allowed_methods(&snapshot.headers);
                    findings.extend(preflight_findings(&snapshot.headers, endpoint));
                }
                Err(e) => debug!(endpoint, error = %e, "OPTIONS probe failed."),
            }
        }

        (probe, findings)
    }
}

fn preflight_findings(headers: &HeaderMap, endpoint: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    if let Some(allow) = allowed_methods(headers) {
        findings.extend(excessive_methods(&allow));
    }
    findings.extend(cors_misconfiguration(headers, Severity::High));
    findings.into_iter().map(|f| f.with_endpoint(endpoint)).collect()
}

/// Presents an API audit in the common scan response shape.
pub(crate) fn into_scan_response(audit: ApiAuditResponse) -> ScanResponse {
    let first = audit.probes.first();
    let metadata = ScanMetadata {
        status_code: first.and_then(|p| p.status_code),
        http_error: first.and_then(|p| p.error.clone()),
        allow_methods: first.and_then(|p| p.allow_methods.clone()),
        ..Default::default()
    };
    ScanResponse {
        target: audit.target,
        scan_type: ScanType::ApiAudit,
        status: "completed".to_string(),
        findings: audit.findings,
        metadata,
        timestamp: audit.timestamp,
    }
}
