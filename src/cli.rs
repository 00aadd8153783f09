// src/cli.rs

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

use portcyber_scanner::core::models::ScanType;
use portcyber_scanner::core::scanner::EndpointSpec;

#[derive(Parser)]
#[command(name = "portcyber")]
#[command(version, about = "Safe, read-only web security checks for the portfolio backend.")]
pub struct CommandLine {
    /// Path to a scanner.toml; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also print logs to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Recipe {
    Basic,
    Advanced,
    Aggressive,
    ApiAudit,
}

impl From<Recipe> for ScanType {
    fn from(recipe: Recipe) -> Self {
        match recipe {
            Recipe::Basic => ScanType::Basic,
            Recipe::Advanced => ScanType::Advanced,
            Recipe::Aggressive => ScanType::Aggressive,
            Recipe::ApiAudit => ScanType::ApiAudit,
        }
    }
}

/// Who the scan is charged to. Without `--public-ip` the scan runs as `--user`.
#[derive(clap::Args, Debug)]
pub struct CallerArgs {
    /// Authenticated user identifier.
    #[arg(long, default_value = "cli")]
    pub user: String,

    /// Scan as an anonymous caller from this IP (public tier).
    #[arg(long, conflicts_with = "user")]
    pub public_ip: Option<IpAddr>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a scan recipe against a URL
    Scan {
        url: String,
        #[arg(long = "type", value_enum, default_value = "basic")]
        recipe: Recipe,
        #[command(flatten)]
        caller: CallerArgs,
    },
    /// Audit API endpoints on a base URL
    Audit {
        url: String,
        /// Endpoint as "METHOD /path" (repeatable, at most 25). Defaults to "GET /".
        #[arg(short, long = "endpoint")]
        endpoints: Vec<EndpointSpec>,
        /// Send an OPTIONS probe to every endpoint as well.
        #[arg(long)]
        options: bool,
        #[command(flatten)]
        caller: CallerArgs,
    },
    /// Score email text for phishing signals (reads stdin when no file is given)
    Phishing {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Illustrative code-pattern report for a repository
    Code {
        repository: String,
        #[arg(short, long)]
        language: String,
    },
    /// Fallback writeup content for a challenge category
    Playbook {
        category: String,
        #[arg(short, long, default_value = "Medium")]
        difficulty: String,
    },
    /// Print the scanner's usage terms
    Disclaimer,
    /// Screen a contact-form submission
    Screen {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        message: String,
        #[arg(long, default_value = "127.0.0.1")]
        ip: IpAddr,
    },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
