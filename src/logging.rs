// src/logging.rs

use color_eyre::eyre::{Result, WrapErr};
use directories::ProjectDirs;
use lazy_static::lazy_static;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing_error::ErrorLayer;
use tracing_subscriber::{self, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase();
    pub static ref LOG_ENV: String = format!("{}_LOGLEVEL", *PROJECT_NAME);
    pub static ref DATA_ENV: String = format!("{}_DATA", *PROJECT_NAME);
    pub static ref LOG_FILE: String = format!("{}.log", env!("CARGO_PKG_NAME"));
}

pub fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "portcyber", env!("CARGO_PKG_NAME"))
}

/// Where the scan log is kept: `PORTCYBER_SCANNER_DATA` if set, else the
/// platform data directory, else `./.data`.
pub fn get_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_ENV.as_str()) {
        return PathBuf::from(dir);
    }
    match project_directory() {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => PathBuf::from(".").join(".data"),
    }
}

/// `RUST_LOG` wins over `PORTCYBER_SCANNER_LOGLEVEL`. A directive that does not
/// parse falls back to `info` for this crate.
fn log_filter() -> EnvFilter {
    let fallback = || EnvFilter::new(format!("{}=info", env!("CARGO_CRATE_NAME")));
    std::env::var("RUST_LOG")
        .or_else(|_| std::env::var(LOG_ENV.as_str()))
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(fallback)
}

/// Starts logging to an append-only file, and to stderr as well when
/// `echo_stderr` is set. Returns the log file path.
pub fn initialize_logging(echo_stderr: bool) -> Result<PathBuf> {
    let directory = get_data_dir();
    std::fs::create_dir_all(&directory)
        .wrap_err_with(|| format!("could not create log directory {}", directory.display()))?;
    let log_path = directory.join(LOG_FILE.as_str());
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .wrap_err_with(|| format!("could not open log file {}", log_path.display()))?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_filter(log_filter());

    let stderr_layer = echo_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(log_filter())
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(ErrorLayer::default())
        .init();

    Ok(log_path)
}
