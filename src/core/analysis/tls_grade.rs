// src/core/analysis/tls_grade.rs

//! Letter grade for a TLS endpoint.
//!
//! Weaknesses pull the grade down; warnings only stop it from reaching the top
//! marks. Two weaknesses (a legacy negotiated protocol and an expired
//! certificate) force an F regardless of anything else. Adding a weakness can
//! never improve the grade.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tracing::debug;

use crate::core::models::{Finding, FindingKind, Severity, TlsInfo};

/// Letter grades, best first. `Ord` follows that order, so a larger value is a worse grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display)]
pub enum Grade {
    #[strum(serialize = "A+")]
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

const LEGACY_PROTOCOLS: [&str; 5] = ["SSLv2", "SSLv3", "TLSv1", "TLSv1.0", "TLSv1.1"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Weakness {
    LegacyProtocol(String),
    Expired { days_ago: i64 },
    UntrustedCertificate { self_signed: bool },
    LegacyProtocolsAccepted,
}

impl Weakness {
    fn forces_f(&self) -> bool {
        matches!(self, Weakness::LegacyProtocol(_) | Weakness::Expired { .. })
    }

    fn finding(&self) -> Finding {
        let severity = if self.forces_f() { Severity::Critical } else { Severity::High };
        let description = match self {
            Weakness::LegacyProtocol(p) => format!("Server negotiated the obsolete protocol {}", p),
            Weakness::Expired { days_ago } => format!("Certificate expired {} day(s) ago", days_ago),
            Weakness::UntrustedCertificate { self_signed: true } => "Certificate is self-signed".to_string(),
            Weakness::UntrustedCertificate { self_signed: false } => {
                "Certificate is not issued by a trusted authority".to_string()
            }
            Weakness::LegacyProtocolsAccepted => "Server still accepts TLS 1.0/1.1 connections".to_string(),
        };
        Finding::new(FindingKind::WeakTlsConfiguration, severity, description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// Fewer than 7 days left.
    ExpiresVerySoon(i64),
    /// Fewer than 30 days left.
    ExpiresSoon(i64),
}

impl Warning {
    fn finding(&self) -> Finding {
        match self {
            Warning::ExpiresVerySoon(days) => Finding::new(
                FindingKind::CertificateExpiring,
                Severity::High,
                format!("Certificate expires in {} day(s)", days),
            ),
            Warning::ExpiresSoon(days) => Finding::new(
                FindingKind::CertificateExpiring,
                Severity::Medium,
                format!("Certificate expires in {} days", days),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlsAssessment {
    pub grade: Grade,
    pub weaknesses: Vec<Weakness>,
    pub warnings: Vec<Warning>,
    pub findings: Vec<Finding>,
}

/// Whole days from `now` until `not_after`, rounded down. Any instant past
/// `not_after` counts as at least one day negative.
pub fn days_until(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    not_after.signed_duration_since(now).num_seconds().div_euclid(86_400)
}

fn is_expired(info: &TlsInfo, now: DateTime<Utc>) -> bool {
    info.not_after <= now || info.days_remaining < 0
}

pub fn weaknesses(info: &TlsInfo, now: DateTime<Utc>) -> Vec<Weakness> {
    let mut found = Vec::new();
    let negotiated_legacy = LEGACY_PROTOCOLS.contains(&info.protocol.as_str());
    if negotiated_legacy {
        found.push(Weakness::LegacyProtocol(info.protocol.clone()));
    }
    if is_expired(info, now) {
        let days_ago = (-days_until(info.not_after, now)).max(-info.days_remaining).max(1);
        found.push(Weakness::Expired { days_ago });
    }
    if info.self_signed || !info.trusted {
        found.push(Weakness::UntrustedCertificate { self_signed: info.self_signed });
    }
    if info.legacy_protocols_accepted && !negotiated_legacy {
        found.push(Weakness::LegacyProtocolsAccepted);
    }
    found
}

pub fn warnings(info: &TlsInfo, now: DateTime<Utc>) -> Vec<Warning> {
    if is_expired(info, now) {
        return Vec::new();
    }
    match info.days_remaining {
        d if d < 7 => vec![Warning::ExpiresVerySoon(d)],
        d if d < 30 => vec![Warning::ExpiresSoon(d)],
        _ => Vec::new(),
    }
}

/// Grade from already classified weaknesses and warnings.
pub fn grade_from(weaknesses: &[Weakness], warnings: &[Warning], protocol: &str, days_remaining: i64) -> Grade {
    if weaknesses.iter().any(Weakness::forces_f) {
        return Grade::F;
    }
    match weaknesses.len() {
        0 => {
            let modern = protocol == "TLSv1.3" || protocol == "TLSv1.2";
            if protocol == "TLSv1.3" && warnings.is_empty() && days_remaining > 60 {
                Grade::APlus
            } else if modern && warnings.is_empty() {
                Grade::A
            } else {
                Grade::B
            }
        }
        1 => Grade::C,
        2 => Grade::D,
        _ => Grade::F,
    }
}

pub fn grade_tls(info: &TlsInfo) -> TlsAssessment {
    grade_tls_at(info, Utc::now())
}

pub fn grade_tls_at(info: &TlsInfo, now: DateTime<Utc>) -> TlsAssessment {
    let weaknesses = weaknesses(info, now);
    let warnings = warnings(info, now);
    let grade = grade_from(&weaknesses, &warnings, &info.protocol, info.days_remaining);
    debug!(%grade, weaknesses = weaknesses.len(), warnings = warnings.len(), "TLS graded.");

    let findings = weaknesses
        .iter()
        .map(Weakness::finding)
        .chain(warnings.iter().map(Warning::finding))
        .collect();
    TlsAssessment { grade, weaknesses, warnings, findings }
}
