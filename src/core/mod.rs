// src/core/mod.rs

// Root of the scanner core. Leaves first: models and errors, then the guard,
// limiter and probes, then the classifiers and the orchestrators built on them.

/// Shared data structures: targets, callers, findings and scan responses.
pub mod models;

/// `ScanError` and `ProbeError`.
pub mod error;

/// URL validation, hostname resolution and the SSRF guard.
pub mod guard;

/// Sliding-window rate limiting per user and per client IP.
pub mod rate_limiter;

/// Single bounded network operations behind the `Prober` trait.
pub mod probe;

/// Pure classifiers turning probe output into findings.
pub mod analysis;

/// Remediation texts and writeup playbooks.
pub mod knowledge_base;

/// Spam screening for comments and contact submissions.
pub mod moderation;

/// Scan recipes.
pub mod scanner;
