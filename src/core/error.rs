// src/core/error.rs

use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Broad class of a scan rejection. Drives the HTTP-equivalent status and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    SecurityPolicy,
    RateLimit,
    Unreachable,
}

/// Every way a scan request can be rejected before or instead of completing.
///
/// Messages are meant to reach the caller as-is, so each one names the specific
/// reason and what to change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("invalid scheme '{0}': only http and https targets can be scanned")]
    InvalidScheme(String),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid host: the target URL has no hostname")]
    InvalidHost,

    #[error("could not resolve host '{host}': {reason}")]
    ResolutionFailed { host: String, reason: String },

    #[error("target blocked: {host} resolves to private or internal address {ip}")]
    TargetBlocked { host: String, ip: IpAddr },

    #[error("unsupported HTTP method '{0}': use GET, POST, PUT, DELETE, PATCH, HEAD or OPTIONS")]
    InvalidMethod(String),

    #[error("too many endpoints: {given} supplied, at most {max} can be audited per request")]
    TooManyEndpoints { given: usize, max: usize },

    #[error("unsupported language '{language}': supported languages are {supported}")]
    UnsupportedLanguage { language: String, supported: String },

    #[error("port scanning is not permitted for this caller")]
    PortScanNotPermitted,

    #[error("scan limit exceeded: try again in {} seconds", whole_seconds(retry_after))]
    RateLimited { retry_after: Duration },

    #[error("target unreachable: {target} did not answer the primary request ({reason})")]
    Unreachable { target: String, reason: String },
}

impl ScanError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ScanError::InvalidScheme(_)
            | ScanError::InvalidUrl { .. }
            | ScanError::InvalidHost
            | ScanError::ResolutionFailed { .. }
            | ScanError::InvalidMethod(_)
            | ScanError::TooManyEndpoints { .. }
            | ScanError::UnsupportedLanguage { .. } => ErrorClass::Validation,
            ScanError::TargetBlocked { .. } | ScanError::PortScanNotPermitted => ErrorClass::SecurityPolicy,
            ScanError::RateLimited { .. } => ErrorClass::RateLimit,
            ScanError::Unreachable { .. } => ErrorClass::Unreachable,
        }
    }

    /// The status code the HTTP layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ScanError::PortScanNotPermitted => 403,
            _ => match self.class() {
                ErrorClass::Validation | ErrorClass::SecurityPolicy => 400,
                ErrorClass::RateLimit => 429,
                ErrorClass::Unreachable => 502,
            },
        }
    }

    /// Only rate-limit rejections are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::RateLimit
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ScanError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Wait in whole seconds, rounded up and never zero.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after().as_ref().map(whole_seconds)
    }
}

fn whole_seconds(wait: &Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

/// Failure of a single network probe. Always caught at the probe boundary and
/// turned into metadata; it never aborts a scan on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("probe cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn status_codes_follow_error_class() {
        assert_eq!(ScanError::InvalidScheme("ftp".into()).status_code(), 400);
        let blocked = ScanError::TargetBlocked {
            host: "metadata".into(),
            ip: IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254)),
        };
        assert_eq!(blocked.status_code(), 400);
        assert_eq!(blocked.class(), ErrorClass::SecurityPolicy);
        assert_eq!(ScanError::PortScanNotPermitted.status_code(), 403);
        let limited = ScanError::RateLimited { retry_after: Duration::from_secs(42) };
        assert_eq!(limited.status_code(), 429);
        assert!(limited.is_retryable());
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(42)));
        let down = ScanError::Unreachable { target: "https://example.com".into(), reason: "timeout".into() };
        assert_eq!(down.status_code(), 502);
        assert!(!down.is_retryable());
    }

    #[test]
    fn rate_limit_message_carries_wait_hint() {
        let limited = ScanError::RateLimited { retry_after: Duration::from_secs(90) };
        assert_eq!(limited.to_string(), "scan limit exceeded: try again in 90 seconds");
        let sub_second = ScanError::RateLimited { retry_after: Duration::from_millis(200) };
        assert!(sub_second.to_string().contains("1 seconds"));
    }

    #[test]
    fn fractional_waits_round_up() {
        let limited = ScanError::RateLimited { retry_after: Duration::from_millis(59_900) };
        assert_eq!(limited.to_string(), "scan limit exceeded: try again in 60 seconds");
        assert_eq!(limited.retry_after_secs(), Some(60));
        let exact = ScanError::RateLimited { retry_after: Duration::from_secs(60) };
        assert_eq!(exact.retry_after_secs(), Some(60));
        assert_eq!(ScanError::InvalidHost.retry_after_secs(), None);
    }
}
