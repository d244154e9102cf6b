//! Diagnostic entry point for the `agrivision-advisor` client.
//!
//! Runs one full prediction round against the configured backend and prints
//! the resulting advisory as JSON. The startup sequence is:
//! - Initializing structured logging/tracing
//! - Loading configuration from environment variables or `.env`
//! - Probing the backend health endpoint (informational only)
//! - Reading an optional input file and generating predictions
//!
//! # Usage
//! `agrivision-advisor [input.json]` where the file holds
//! `{"soil": {...}, "weather": {...}, "crop": {...}}` (every part optional).
//!
//! # Environment Variables
//! - `AGRIVISION_API_URL` (optional) – backend base URL (default: `http://localhost:8000`)
//! - `AGRIVISION_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `AGRIVISION_SPAN_EVENTS` (optional) – span event mode for tracing
use std::env;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use agrivision_advisor::{config, PredictionInput, PredictionService};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let input = match env::args().nth(1) {
        Some(path) => read_input(&path).await?,
        None => PredictionInput::default(),
    };

    let service = PredictionService::from_config(&cfg)
        .with_context(|| format!("Failed to create client for '{}'", cfg.api_url))?;

    match service.check_health().await {
        Ok(health) => tracing::info!(
            "Backend status: {} (model: {})",
            health.status.as_deref().unwrap_or("unknown"),
            health.model_status.as_deref().unwrap_or("unknown")
        ),
        Err(e) => tracing::warn!("Backend health check failed: {}", e),
    }

    let advisory = service.generate_predictions(&input).await;
    println!("{}", serde_json::to_string_pretty(&advisory)?);

    Ok(())
}

async fn read_input(path: &str) -> Result<PredictionInput> {
    // ---
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read input file '{}'", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid prediction input in '{}'", path))
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// Logs go to stderr so stdout carries only the JSON advisory.
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AGRIVISION_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, else the `AGRIVISION_LOG_LEVEL` env var
fn init_tracing() {
    // ---
    let span_events = match env::var("AGRIVISION_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AGRIVISION_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},hyper=warn,reqwest=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
