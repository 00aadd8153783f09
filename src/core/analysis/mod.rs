// src/core/analysis/mod.rs

//! Finding classifiers.
//!
//! Every function here is pure: it takes what a probe observed (or plain text)
//! and returns findings in discovery order. Nothing in this module touches the
//! network, so the whole rule set is testable offline.

pub mod code_patterns;
pub mod cookies;
pub mod headers;
pub mod methods;
pub mod phishing;
pub mod tls_grade;
pub mod transport;

pub use code_patterns::scan_repository;
pub use cookies::analyze_cookies;
pub use headers::analyze_header_policy;
pub use methods::analyze_options;
pub use phishing::analyze_email;
pub use tls_grade::{grade_tls, Grade, TlsAssessment};
pub use transport::analyze_transport;
