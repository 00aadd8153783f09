// src/core/moderation.rs

//! Spam and abuse screening for user-submitted text.
//!
//! Comments are only flagged (the caller keeps them for review). Contact-form
//! submissions are screened and either accepted or rejected with one generic
//! error; the rule that fired is logged and never returned.

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ScannerConfig;
use crate::core::rate_limiter::RateLimiter;

static SPAM_KEYWORDS: &[&str] = &[
    "viagra",
    "cialis",
    "casino",
    "poker",
    "lottery",
    "prize",
    "click here",
    "buy now",
    "limited time",
    "act now",
    "free money",
    "earn cash",
    "work from home",
];

/// Keywords that reject a contact submission outright.
static CONTACT_BLOCKLIST: &[&str] = &["viagra", "casino", "lottery", "claim prize", "bitcoin"];

static PROFANITY: &[&str] = &["fuck", "shit", "bitch", "bastard", "asshole", "cunt"];

static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static RE_PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{10,}\b").unwrap());
static RE_SHOUTING: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]{5,}").unwrap());
static RE_PROFANITY: Lazy<Regex> = Lazy::new(|| {
    let alternatives = PROFANITY.join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives)).unwrap()
});

const SPAM_THRESHOLD: f64 = 2.0;

/// True when five or more identical characters appear in a row.
fn has_repeated_run(content: &str) -> bool {
    let mut previous = None;
    let mut run = 0;
    for c in content.chars() {
        if Some(c) == previous {
            run += 1;
            if run >= 5 {
                return true;
            }
        } else {
            previous = Some(c);
            run = 1;
        }
    }
    false
}

/// Spam score: one point per keyword, half a point per suspicious pattern, one
/// point for mostly-uppercase text and one for long character runs.
pub fn spam_score(content: &str) -> f64 {
    let lowered = content.to_lowercase();
    let mut score = SPAM_KEYWORDS.iter().filter(|k| lowered.contains(*k)).count() as f64;

    for pattern in [&RE_URL, &RE_PHONE, &RE_SHOUTING] {
        if pattern.is_match(content) {
            score += 0.5;
        }
    }

    let length = content.chars().count();
    if length > 10 {
        let upper = content.chars().filter(|c| c.is_uppercase()).count();
        if upper as f64 / length as f64 > 0.6 {
            score += 1.0;
        }
    }

    if has_repeated_run(content) {
        score += 1.0;
    }
    score
}

pub fn is_spam(content: &str) -> bool {
    spam_score(content) >= SPAM_THRESHOLD
}

pub fn has_profanity(content: &str) -> bool {
    RE_PROFANITY.is_match(content)
}

/// Moderation flags for a new comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentVerdict {
    pub is_spam: bool,
    pub has_profanity: bool,
}

impl CommentVerdict {
    /// Comments that trip either flag wait for manual approval.
    pub fn needs_review(&self) -> bool {
        self.is_spam || self.has_profanity
    }
}

pub fn moderate_comment(content: &str) -> CommentVerdict {
    CommentVerdict {
        is_spam: is_spam(content),
        has_profanity: has_profanity(content),
    }
}

/// A contact-form submission.
#[derive(Debug, Clone)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

/// Why a submission was turned away. Logged, never shown to the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MalformedField,
    IpRateLimit,
    EmailRateLimit,
    BlockedKeyword,
    Spam,
}

/// The only error a submitter ever sees.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unable to process request")]
pub struct SubmissionRejected {
    /// Kept for the status code only; the message is the same for every reason.
    throttled: bool,
}

impl SubmissionRejected {
    pub fn status_code(&self) -> u16 {
        if self.throttled { 429 } else { 400 }
    }
}

/// Contact-form gate: field checks, per-IP and per-email limits, keyword and spam screening.
pub struct ContactScreen {
    by_ip: RateLimiter,
    by_email: RateLimiter,
}

impl ContactScreen {
    pub fn new(by_ip: RateLimiter, by_email: RateLimiter) -> Self {
        Self { by_ip, by_email }
    }

    pub fn from_config(config: &ScannerConfig) -> Self {
        Self::new(
            RateLimiter::new("contact-ip", config.contact_ip_limit, config.contact_window()),
            RateLimiter::new("contact-email", config.contact_email_limit, config.contact_window()),
        )
    }

    pub fn screen(&self, submission: &ContactSubmission, client_ip: IpAddr) -> Result<(), SubmissionRejected> {
        self.screen_at(submission, client_ip, Instant::now())
    }

    /// Screens a submission. Only accepted submissions count against the limits.
    pub fn screen_at(
        &self,
        submission: &ContactSubmission,
        client_ip: IpAddr,
        now: Instant,
    ) -> Result<(), SubmissionRejected> {
        let ip_key = client_ip.to_string();
        let email_key = submission.email.trim().to_lowercase();

        let content = if !fields_well_formed(submission) {
            Err(RejectReason::MalformedField)
        } else if contains_blocked_keyword(&submission.message) {
            Err(RejectReason::BlockedKeyword)
        } else if is_spam(&submission.message) {
            Err(RejectReason::Spam)
        } else {
            Ok(())
        };

        // Throttling outranks content rejections. A rejected submission is never
        // recorded, so only the accepting path needs the joint check-and-record.
        let verdict = match content {
            Err(RejectReason::MalformedField) => content,
            Err(reason) => {
                if self.by_ip.in_window(&ip_key, now) >= self.by_ip.limit() {
                    Err(RejectReason::IpRateLimit)
                } else if self.by_email.in_window(&email_key, now) >= self.by_email.limit() {
                    Err(RejectReason::EmailRateLimit)
                } else {
                    Err(reason)
                }
            }
            Ok(()) => RateLimiter::admit_all_at(&[(&self.by_ip, ip_key.as_str()), (&self.by_email, email_key.as_str())], now)
                .map_err(|(index, _)| if index == 0 { RejectReason::IpRateLimit } else { RejectReason::EmailRateLimit }),
        };

        match verdict {
            Ok(()) => {
                info!(ip = %client_ip, "Contact submission accepted.");
                Ok(())
            }
            Err(reason) => {
                warn!(ip = %client_ip, email = %email_key, ?reason, "Contact submission rejected.");
                Err(SubmissionRejected {
                    throttled: matches!(reason, RejectReason::IpRateLimit | RejectReason::EmailRateLimit),
                })
            }
        }
    }

    pub fn sweep(&self) -> usize {
        self.by_ip.sweep() + self.by_email.sweep()
    }
}

fn contains_blocked_keyword(message: &str) -> bool {
    let lowered = message.to_lowercase();
    CONTACT_BLOCKLIST.iter().any(|k| lowered.contains(k))
}

fn fields_well_formed(s: &ContactSubmission) -> bool {
    let within = |value: &str, min: usize, max: usize| (min..=max).contains(&value.trim().chars().count());
    let email_ok = match s.email.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    within(&s.name, 2, 100) && within(&s.subject, 5, 200) && within(&s.message, 10, 5000) && email_ok
}
