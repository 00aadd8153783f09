// src/core/analysis/phishing.rs

//! Keyword and URL heuristic for phishing emails.
//!
//! The score is a sum of fixed contributions, each counted at most once, so the
//! same text always produces the same confidence and the same findings.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::core::models::{Finding, FindingKind, PhishingReport, Severity};

pub const PHISHING_THRESHOLD: f64 = 0.4;
pub const MAX_CONFIDENCE: f64 = 0.95;

const BRAND_SPOOF_WEIGHT: f64 = 0.3;
const LOOKALIKE_WEIGHT: f64 = 0.2;

/// A group of phrases that contributes `weight` once if any of them appears.
struct KeywordCategory {
    name: &'static str,
    weight: f64,
    severity: Severity,
    phrases: &'static [&'static str],
}

static CATEGORIES: &[KeywordCategory] = &[
    KeywordCategory {
        name: "urgency",
        weight: 0.2,
        severity: Severity::Medium,
        phrases: &[
            "urgent",
            "immediately",
            "act now",
            "within 24 hours",
            "expires today",
            "final notice",
            "as soon as possible",
        ],
    },
    KeywordCategory {
        name: "credential request",
        weight: 0.25,
        severity: Severity::High,
        phrases: &[
            "verify your account",
            "confirm your password",
            "enter your password",
            "login credentials",
            "verify your identity",
            "update your payment",
            "social security number",
            "confirm your bank",
        ],
    },
    KeywordCategory {
        name: "threat",
        weight: 0.2,
        severity: Severity::Medium,
        phrases: &[
            "account will be suspended",
            "account has been suspended",
            "account will be closed",
            "unauthorized access",
            "legal action",
            "unusual activity",
            "security alert",
        ],
    },
    KeywordCategory {
        name: "reward",
        weight: 0.15,
        severity: Severity::Low,
        phrases: &[
            "congratulations",
            "you have won",
            "you've won",
            "claim your prize",
            "gift card",
            "free money",
            "lottery",
        ],
    },
];

/// Brands commonly impersonated, with the registrable domain they actually use.
static BRANDS: &[(&str, &str)] = &[
    ("paypal", "paypal.com"),
    ("apple", "apple.com"),
    ("microsoft", "microsoft.com"),
    ("amazon", "amazon.com"),
    ("google", "google.com"),
    ("netflix", "netflix.com"),
    ("facebook", "facebook.com"),
    ("instagram", "instagram.com"),
    ("linkedin", "linkedin.com"),
    ("dropbox", "dropbox.com"),
];

static RE_URL_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://([a-z0-9\-\.\p{L}]+)"#).expect("URL host pattern compiles"));

/// Cyrillic or Greek letters, the scripts most often used for Latin lookalikes.
fn is_lookalike(c: char) -> bool {
    matches!(c, '\u{0370}'..='\u{03FF}' | '\u{0400}'..='\u{04FF}')
}

/// `true` when `brand` is a whole label, or a whole hyphen-separated part of
/// one, so `apple-id.com` matches `apple` but `pineapple.com` does not.
fn names_brand(host: &str, brand: &str) -> bool {
    host.split(['.', '-']).any(|part| part == brand)
}

/// Hosts in `text` that mention a brand without belonging to it.
fn spoofed_hosts(text: &str) -> Vec<(String, &'static str)> {
    let mut spoofed = Vec::new();
    for capture in RE_URL_HOST.captures_iter(text) {
        let host = capture[1].trim_end_matches('.').to_lowercase();
        for (brand, domain) in BRANDS {
            let genuine = host == *domain || host.ends_with(&format!(".{}", domain));
            if names_brand(&host, brand) && !genuine {
                spoofed.push((host.clone(), *brand));
                break;
            }
        }
    }
    spoofed
}

fn round_confidence(score: f64) -> f64 {
    (score.min(MAX_CONFIDENCE) * 100.0).round() / 100.0
}

/// Scores free-text email content.
///
/// # Arguments
/// * `content` - The email body (and subject, if the caller has one) as plain text.
///
/// # Returns
/// A `PhishingReport` with the capped confidence and one finding per triggered signal.
pub fn analyze_email(content: &str) -> PhishingReport {
    let lowered = content.to_lowercase();
    let mut score = 0.0;
    let mut findings = Vec::new();

    for category in CATEGORIES {
        if let Some(phrase) = category.phrases.iter().find(|p| lowered.contains(*p)) {
            debug!(category = category.name, phrase, "Phishing keyword matched.");
            score += category.weight;
            findings.push(Finding::new(
                FindingKind::PhishingIndicator,
                category.severity,
                format!("{} language detected: '{}'", capitalize(category.name), phrase),
            ));
        }
    }

    let spoofed = spoofed_hosts(content);
    if let Some((host, brand)) = spoofed.first() {
        score += BRAND_SPOOF_WEIGHT;
        findings.push(Finding::new(
            FindingKind::PhishingIndicator,
            Severity::High,
            format!("Link to {} imitates {} but is not on its domain", host, brand),
        ));
    }

    if content.chars().any(is_lookalike) {
        score += LOOKALIKE_WEIGHT;
        findings.push(Finding::new(
            FindingKind::PhishingIndicator,
            Severity::High,
            "Text contains Cyrillic or Greek characters that can pass for Latin letters",
        ));
    }

    let confidence = round_confidence(score);
    let is_phishing = confidence >= PHISHING_THRESHOLD;
    info!(confidence, is_phishing, signals = findings.len(), "Phishing analysis finished.");
    PhishingReport { is_phishing, confidence, findings }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
