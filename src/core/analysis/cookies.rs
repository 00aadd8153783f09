// src/core/analysis/cookies.rs

use crate::core::models::{Finding, FindingKind, Severity};
use crate::core::probe::CookieInfo;

/// One finding per missing attribute per cookie, in the order the cookies were set.
pub fn analyze_cookies(cookies: &[CookieInfo]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for cookie in cookies {
        if !cookie.secure {
            findings.push(
                Finding::new(
                    FindingKind::InsecureCookie,
                    Severity::Medium,
                    format!("Cookie '{}' is set without the Secure flag", cookie.name),
                )
                .with_cookie(&cookie.name),
            );
        }
        if !cookie.http_only {
            findings.push(
                Finding::new(
                    FindingKind::CookieWithoutHttpOnly,
                    Severity::Medium,
                    format!("Cookie '{}' is readable from JavaScript (no HttpOnly flag)", cookie.name),
                )
                .with_cookie(&cookie.name),
            );
        }
    }
    findings
}
