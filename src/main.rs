// src/main.rs

use color_eyre::eyre::{Result, WrapErr};
use serde::Serialize;
use serde_json::json;
use std::io::Read;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use portcyber_scanner::core::analysis::{analyze_email, scan_repository};
use portcyber_scanner::core::knowledge_base::{playbook_for, scanner_disclaimer};
use portcyber_scanner::core::models::Caller;
use portcyber_scanner::core::moderation::{ContactScreen, ContactSubmission};
use portcyber_scanner::logging::initialize_logging;
use portcyber_scanner::{ScanError, Scanner, ScannerConfig};

mod cli;

use cli::{CallerArgs, CommandLine, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let commands = CommandLine::parse_args();
    let log_path = initialize_logging(commands.verbose)?;
    info!(log = %log_path.display(), "portcyber starting.");

    let config = ScannerConfig::load(commands.config.as_deref()).wrap_err("failed to load configuration")?;
    let pretty = commands.pretty;

    match commands.command {
        Commands::Scan { url, recipe, caller } => {
            let (scanner, stop_sweeper) = start_scanner(config);
            let outcome = scanner.scan(&url, recipe.into(), &caller_of(caller)).await;
            stop_sweeper.cancel();
            finish(outcome, pretty)
        }
        Commands::Audit { url, endpoints, options, caller } => {
            let (scanner, stop_sweeper) = start_scanner(config);
            let outcome = scanner.api_audit(&url, &endpoints, options, &caller_of(caller)).await;
            stop_sweeper.cancel();
            finish(outcome, pretty)
        }
        Commands::Phishing { file } => {
            let text = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .wrap_err_with(|| format!("could not read {}", path.display()))?,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer).wrap_err("could not read stdin")?;
                    buffer
                }
            };
            emit(&analyze_email(&text), pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Code { repository, language } => finish(scan_repository(&repository, &language), pretty),
        Commands::Playbook { category, difficulty } => {
            emit(&playbook_for(&category, &difficulty), pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Disclaimer => {
            emit(&scanner_disclaimer(&config), pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Screen { name, email, subject, message, ip } => {
            let screen = ContactScreen::from_config(&config);
            let submission = ContactSubmission { name, email, subject, message };
            match screen.screen(&submission, ip) {
                Ok(()) => {
                    emit(&json!({ "success": true, "message": "Contact message received successfully" }), pretty)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(rejected) => {
                    emit(&json!({ "error": rejected.to_string(), "status": rejected.status_code() }), pretty)?;
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

/// Builds the network scanner and starts the limiter sweeper.
fn start_scanner(config: ScannerConfig) -> (Scanner, CancellationToken) {
    let interval = config.sweep_interval();
    let scanner = Scanner::with_network(config);
    let cancel = CancellationToken::new();
    scanner.limiters().spawn_sweeper(interval, cancel.clone());
    (scanner, cancel)
}

fn caller_of(args: CallerArgs) -> Caller {
    match args.public_ip {
        Some(ip) => Caller::Anonymous(ip),
        None => Caller::User(args.user),
    }
}

fn emit<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", rendered);
    Ok(())
}

/// Prints a result, or the scan error in the shape the HTTP layer would answer with.
fn finish<T: Serialize>(outcome: Result<T, ScanError>, pretty: bool) -> Result<ExitCode> {
    match outcome {
        Ok(value) => {
            emit(&value, pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, status = e.status_code(), "Request rejected.");
            let mut body = json!({ "error": e.to_string(), "status": e.status_code() });
            if let Some(retry_after) = e.retry_after_secs() {
                body["retry_after"] = json!(retry_after);
            }
            emit(&body, pretty)?;
            Ok(ExitCode::FAILURE)
        }
    }
}
