// src/lib.rs

pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::ScannerConfig;
pub use crate::core::error::{ProbeError, ScanError};
pub use crate::core::models::{Caller, Finding, ScanResponse, ScanType, Severity};
pub use crate::core::scanner::Scanner;
