//! Logging and tracing configuration
//!
//! A test run logs to four places at once:
//! 1. the console (compact, human-oriented)
//! 2. `Automation.log` in the run directory (plain text)
//! 3. `Automation.json` in the run directory (one JSON object per line)
//! 4. the step log, which attributes lines to the current test step
//!
//! The one-shot commands only log to the console.

use std::path::Path;
use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths::{JSON_LOG_FILE, TEXT_LOG_FILE};
use super::{Error, Result};
use crate::steplog::{StepLog, StepLogLayer};

/// Keeps the non-blocking file writers alive; dropping it flushes them
#[must_use = "log files stop receiving lines once the guards are dropped"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("alg_harness={default_level},warn")))
}

/// Initialize tracing for the one-shot commands (console only)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();
}

/// Initialize tracing for a test run writing into `run_dir`
///
/// `level` is the configured default; `RUST_LOG` takes precedence.
pub fn init_run(run_dir: &Path, level: &str, step_log: Arc<StepLog>) -> Result<LogGuards> {
    let text_file = tracing_appender::rolling::never(run_dir, TEXT_LOG_FILE);
    let (text_writer, text_guard) = tracing_appender::non_blocking(text_file);

    let json_file = tracing_appender::rolling::never(run_dir, JSON_LOG_FILE);
    let (json_writer, json_guard) = tracing_appender::non_blocking(json_file);

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .compact();

    let text_layer = fmt::layer()
        .with_writer(text_writer)
        .with_ansi(false)
        .with_target(true);

    let json_layer = fmt::layer()
        .json()
        .flatten_event(true)
        .with_writer(json_writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(console_layer)
        .with(text_layer)
        .with(json_layer)
        .with(StepLogLayer::new(step_log))
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to initialize logging: {e}")))?;

    Ok(LogGuards {
        _guards: vec![text_guard, json_guard],
    })
}
