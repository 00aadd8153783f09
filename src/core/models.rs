// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use strum::{Display, EnumString, IntoStaticStr};

// --- Severity & Findings ---

/// Severity of a single finding, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// The finding types the built-in classifiers emit.
///
/// The code-pattern heuristic emits free-form vulnerability names instead, which is
/// why [`Finding::kind`] is a plain string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum FindingKind {
    #[strum(serialize = "Missing Security Header")]
    MissingSecurityHeader,
    #[strum(serialize = "CORS Misconfiguration")]
    CorsMisconfiguration,
    #[strum(serialize = "Directory Listing")]
    DirectoryListing,
    #[strum(serialize = "Insecure Cookie")]
    InsecureCookie,
    #[strum(serialize = "Cookie Without HttpOnly")]
    CookieWithoutHttpOnly,
    #[strum(serialize = "Insecure Transport")]
    InsecureTransport,
    #[strum(serialize = "Redirect Downgrade")]
    RedirectDowngrade,
    #[strum(serialize = "Server Banner Disclosure")]
    ServerBannerDisclosure,
    #[strum(serialize = "Weak TLS Configuration")]
    WeakTlsConfiguration,
    #[strum(serialize = "Certificate Expiring")]
    CertificateExpiring,
    #[strum(serialize = "Excessive Methods")]
    ExcessiveMethods,
    #[strum(serialize = "Open Port")]
    OpenPort,
    #[strum(serialize = "Server Error Response")]
    ServerErrorResponse,
    #[strum(serialize = "Missing Content Type")]
    MissingContentType,
    #[strum(serialize = "Phishing Indicator")]
    PhishingIndicator,
}

impl From<FindingKind> for String {
    fn from(kind: FindingKind) -> Self {
        kind.to_string()
    }
}

/// A single classified observation. Immutable once built; the `with_*` helpers
/// consume and return the finding so classifiers can attach detail fields inline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl Finding {
    pub fn new(kind: impl Into<String>, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            severity,
            description: description.into(),
            header: None,
            cookie: None,
            port: None,
            service: None,
            method: None,
            endpoint: None,
            cwe: None,
            file: None,
            line: None,
            remediation: None,
        }
    }

    /// True when this finding was produced as the given built-in kind.
    pub fn is(&self, kind: FindingKind) -> bool {
        let label: &'static str = kind.into();
        self.kind == label
    }

    pub fn with_header(mut self, header: &str) -> Self {
        self.header = Some(header.to_string());
        self
    }

    pub fn with_cookie(mut self, cookie: &str) -> Self {
        self.cookie = Some(cookie.to_string());
        self
    }

    pub fn with_port(mut self, port: u16, service: &str) -> Self {
        self.port = Some(port);
        self.service = Some(service.to_string());
        self
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn with_location(mut self, cwe: &str, file: &str, line: u32) -> Self {
        self.cwe = Some(cwe.to_string());
        self.file = Some(file.to_string());
        self.line = Some(line);
        self
    }

    pub fn with_remediation(mut self, remediation: &str) -> Self {
        self.remediation = Some(remediation.to_string());
        self
    }
}

// --- Targets & Callers ---

/// Accepted target schemes.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

/// A target that has passed URL validation and the SSRF guard.
///
/// Only the guard builds these, so holding a `Target` means `resolved_ip` is safe to probe.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Target {
    raw_url: String,
    scheme: Scheme,
    hostname: String,
    port: u16,
    resolved_ip: IpAddr,
}

impl Target {
    pub(crate) fn new(raw_url: &str, scheme: Scheme, hostname: &str, port: u16, resolved_ip: IpAddr) -> Self {
        Self {
            raw_url: raw_url.to_string(),
            scheme,
            hostname: hostname.to_string(),
            port,
            resolved_ip,
        }
    }

    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn resolved_ip(&self) -> IpAddr {
        self.resolved_ip
    }

    pub fn is_https(&self) -> bool {
        self.scheme == Scheme::Https
    }
}

/// Which limiter tier a request is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Tier {
    Authenticated,
    Public,
}

/// The identity a scan is performed on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// An authenticated user, keyed by their identifier.
    User(String),
    /// An unauthenticated caller, keyed by client IP.
    Anonymous(IpAddr),
}

impl Caller {
    pub fn tier(&self) -> Tier {
        match self {
            Caller::User(_) => Tier::Authenticated,
            Caller::Anonymous(_) => Tier::Public,
        }
    }

    pub fn rate_key(&self) -> String {
        match self {
            Caller::User(id) => id.clone(),
            Caller::Anonymous(ip) => ip.to_string(),
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::User(id) => write!(f, "user:{}", id),
            Caller::Anonymous(ip) => write!(f, "ip:{}", ip),
        }
    }
}

/// Named scan recipes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ScanType {
    Basic,
    Advanced,
    Aggressive,
    ApiAudit,
}

// --- Probe Metadata ---

/// State of a single TCP port after a connect attempt.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

/// Outcome of one TCP connect during a port scan.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PortReport {
    /// The TCP port that was tried.
    pub port: u16,
    /// Conventional service name for the port, e.g. `ssh` for 22.
    pub service: String,
    /// Whether the connect succeeded, was refused, or timed out.
    pub state: PortState,
}

/// Certificate and protocol details observed during a TLS handshake.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TlsInfo {
    /// Negotiated protocol, in OpenSSL spelling (`TLSv1.3`, `TLSv1.2`, `TLSv1.1`, `TLSv1`).
    pub protocol: String,
    /// Common name of the issuer, or the full distinguished name if it has none.
    pub issuer: String,
    /// Common name of the leaf certificate's subject, with the same fallback.
    pub subject: String,
    /// Start of the certificate's validity period.
    pub not_before: DateTime<Utc>,
    /// End of the certificate's validity period. Expiry is judged against this.
    pub not_after: DateTime<Utc>,
    /// Whole days left until `not_after`, rounded down; negative once expired.
    pub days_remaining: i64,
    /// Issuer and subject names are identical.
    pub self_signed: bool,
    /// Whether the chain validated against the default trust roots.
    pub trusted: bool,
    /// The server completed a TLS 1.0 or 1.1 handshake.
    pub legacy_protocols_accepted: bool,
}

/// TLS section of the scan metadata: either what was observed, or why the probe failed.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TlsMetadata {
    Observed {
        #[serde(flatten)]
        info: TlsInfo,
        grade: String,
    },
    Failed {
        error: String,
    },
}

/// Everything a scan observed about the target. Fields stay `None` for probes that
/// never ran, so the serialized form only contains data that was actually seen.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ScanMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirects: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub powered_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_methods: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<PortReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports_error: Option<String>,
}

// --- Responses ---

/// Aggregate result of one scan recipe.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResponse {
    /// The URL as the caller supplied it.
    pub target: String,
    /// Recipe that produced this response.
    pub scan_type: ScanType,
    /// Always `completed`; failed scans surface as errors instead.
    pub status: String,
    /// Every finding, annotated with remediation text where one is known.
    pub findings: Vec<Finding>,
    /// Raw observations behind the findings.
    pub metadata: ScanMetadata,
    /// RFC 3339 completion time.
    pub timestamp: String,
}

impl ScanResponse {
    pub fn completed(target: &Target, scan_type: ScanType, findings: Vec<Finding>, metadata: ScanMetadata) -> Self {
        Self {
            target: target.raw_url().to_string(),
            scan_type,
            status: "completed".to_string(),
            findings,
            metadata,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// One endpoint probed during an API audit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApiAuditProbe {
    pub endpoint: String,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_methods: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of an API audit across all requested endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ApiAuditResponse {
    /// Base URL as the caller supplied it.
    pub target: String,
    /// One entry per audited endpoint, in request order.
    pub probes: Vec<ApiAuditProbe>,
    /// Findings from every endpoint plus the target-wide transport check.
    pub findings: Vec<Finding>,
    /// RFC 3339 completion time.
    pub timestamp: String,
}

/// Result of the phishing-content heuristic.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PhishingReport {
    pub is_phishing: bool,
    pub confidence: f64,
    pub findings: Vec<Finding>,
}

/// Result of the static code-pattern heuristic.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CodeScanReport {
    pub repository: String,
    pub language: String,
    pub findings: Vec<Finding>,
    pub disclaimer: String,
}

