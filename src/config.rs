// src/config.rs

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::logging::project_directory;

const CONFIG_FILE: &str = "scanner.toml";
const ENV_ALLOW_PRIVATE: &str = "PORTCYBER_ALLOW_PRIVATE_TARGETS";
const ENV_ALLOW_PORT_SCAN: &str = "PORTCYBER_ALLOW_PORT_SCAN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Options recognised by the scanner core. Every field has a default, so an empty
/// or missing config file yields a usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Scans an authenticated user may start per window.
    pub user_scan_limit: usize,
    pub user_window_secs: u64,
    /// Scans a single client IP may start per window on public endpoints.
    pub public_scan_limit: usize,
    pub public_window_secs: u64,
    /// Lets authenticated callers target private ranges. Public callers never can.
    pub allow_private_targets: bool,
    /// Enables the aggressive recipe's TCP port scan for authenticated callers.
    pub allow_port_scan: bool,
    pub http_timeout_secs: u64,
    pub tls_timeout_secs: u64,
    pub port_timeout_ms: u64,
    pub max_redirects: usize,
    pub port_scan_concurrency: usize,
    pub scan_deadline_secs: u64,
    pub sweep_interval_secs: u64,
    pub contact_ip_limit: usize,
    pub contact_email_limit: usize,
    pub contact_window_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            user_scan_limit: 5,
            user_window_secs: 3600,
            public_scan_limit: 10,
            public_window_secs: 300,
            allow_private_targets: false,
            allow_port_scan: true,
            http_timeout_secs: 8,
            tls_timeout_secs: 5,
            port_timeout_ms: 1500,
            max_redirects: 5,
            port_scan_concurrency: 8,
            scan_deadline_secs: 60,
            sweep_interval_secs: 60,
            contact_ip_limit: 5,
            contact_email_limit: 3,
            contact_window_secs: 3600,
        }
    }
}

impl ScannerConfig {
    /// Default config file location inside the platform config directory.
    pub fn default_path() -> PathBuf {
        match project_directory() {
            Some(dirs) => dirs.config_dir().join(CONFIG_FILE),
            None => PathBuf::from(".").join(CONFIG_FILE),
        }
    }

    /// Loads the configuration from `path` (or the default location), then applies
    /// environment overrides and validates the result.
    ///
    /// An explicitly given path must exist; a missing default file falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        let mut config = if path.exists() || explicit {
            debug!(path = %path.display(), "Reading scanner configuration.");
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            info!(path = %path.display(), "No configuration file found, using defaults.");
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Applies boolean overrides from the environment. `lookup` is injected so tests
    /// don't have to mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_ALLOW_PRIVATE).and_then(|v| parse_bool(&v)) {
            if value {
                warn!("Private-address scanning enabled through the environment.");
            }
            self.allow_private_targets = value;
        }
        if let Some(value) = lookup(ENV_ALLOW_PORT_SCAN).and_then(|v| parse_bool(&v)) {
            self.allow_port_scan = value;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.user_scan_limit == 0, "user_scan_limit must be at least 1"),
            (self.user_window_secs == 0, "user_window_secs must be at least 1"),
            (self.public_scan_limit == 0, "public_scan_limit must be at least 1"),
            (self.public_window_secs == 0, "public_window_secs must be at least 1"),
            (self.port_scan_concurrency == 0, "port_scan_concurrency must be at least 1"),
            (self.http_timeout_secs == 0, "http_timeout_secs must be at least 1"),
            (self.tls_timeout_secs == 0, "tls_timeout_secs must be at least 1"),
            (self.port_timeout_ms == 0, "port_timeout_ms must be at least 1"),
            (self.scan_deadline_secs == 0, "scan_deadline_secs must be at least 1"),
            (self.contact_window_secs == 0, "contact_window_secs must be at least 1"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_string())),
            None => Ok(()),
        }
    }

    pub fn user_window(&self) -> Duration {
        Duration::from_secs(self.user_window_secs)
    }

    pub fn public_window(&self) -> Duration {
        Duration::from_secs(self.public_window_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn tls_timeout(&self) -> Duration {
        Duration::from_secs(self.tls_timeout_secs)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }

    pub fn scan_deadline(&self) -> Duration {
        Duration::from_secs(self.scan_deadline_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn contact_window(&self) -> Duration {
        Duration::from_secs(self.contact_window_secs)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
