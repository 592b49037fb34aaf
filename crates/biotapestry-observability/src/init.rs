// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console output is always available. With the `file-logging` feature each
//! run also gets its own folder under the log directory:
//! ```text
//! ./logs/
//!   └── run_20250101_120000/
//!       └── biotapestry.log
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;

/// Settings for [`init_logging`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingOptions {
    /// Default level for crates without a debug flag
    pub level: String,
    /// Base directory for run folders; `None` logs to the console only
    pub log_dir: Option<PathBuf>,
    pub retention_days: u32,
    /// Run folders kept regardless of age
    pub keep_runs: usize,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            retention_days: 7,
            keep_runs: 10,
        }
    }
}

/// Keeps file writers alive; logs are flushed when dropped
#[derive(Default)]
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    run_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Folder this run logs into, when file logging is active
    pub fn run_dir(&self) -> Option<&std::path::Path> {
        self.run_dir.as_deref()
    }
}

/// Filter combining the default level with per-crate debug flags
pub fn build_env_filter(debug_flags: &CrateDebugFlags, level: &str) -> Result<EnvFilter> {
    let directives = debug_flags.to_filter_string(level);
    EnvFilter::try_new(&directives).with_context(|| format!("Invalid log filter: {}", directives))
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails on an invalid level, when the run folder cannot be created, or
/// when a global subscriber is already installed.
pub fn init_logging(
    debug_flags: &CrateDebugFlags,
    options: &LoggingOptions,
) -> Result<LoggingGuard> {
    let env_filter = build_env_filter(debug_flags, &options.level)?;
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut guard = LoggingGuard::default();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(env_filter);
    layers.push(console_layer.boxed());

    if let Some(base) = &options.log_dir {
        add_file_layer(debug_flags, options, base, &mut layers, &mut guard)?;
    }

    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(guard)
}

#[cfg(feature = "file-logging")]
fn add_file_layer(
    debug_flags: &CrateDebugFlags,
    options: &LoggingOptions,
    base: &std::path::Path,
    layers: &mut Vec<Box<dyn Layer<Registry> + Send + Sync>>,
    guard: &mut LoggingGuard,
) -> Result<()> {
    let now = chrono::Utc::now();
    let run_dir = base.join(crate::retention::run_folder_name(now));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create log directory: {}", run_dir.display()))?;
    // The new folder counts as one of the kept runs
    crate::retention::cleanup_old_logs(base, options.retention_days, options.keep_runs, now)?;

    let appender = tracing_appender::rolling::never(&run_dir, "biotapestry.log");
    let (writer, worker_guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(build_env_filter(debug_flags, &options.level)?);
    layers.push(file_layer.boxed());

    guard._file_guards.push(worker_guard);
    guard.run_dir = Some(run_dir);
    Ok(())
}

#[cfg(not(feature = "file-logging"))]
fn add_file_layer(
    _debug_flags: &CrateDebugFlags,
    _options: &LoggingOptions,
    base: &std::path::Path,
    _layers: &mut Vec<Box<dyn Layer<Registry> + Send + Sync>>,
    _guard: &mut LoggingGuard,
) -> Result<()> {
    tracing::warn!(
        target: "biotapestry",
        "Log directory {} ignored: built without the file-logging feature",
        base.display()
    );
    Ok(())
}

/// Console logging at `info` with flags from the environment
pub fn init_logging_default() -> Result<LoggingGuard> {
    init_logging(&crate::cli::parse_debug_flags(), &LoggingOptions::default())
}
