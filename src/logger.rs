//! Logging capability and `tracing` subscriber setup.
//!
//! Components report through the [`Logger`] trait they are handed, so tests can
//! count warnings without a global subscriber. The production [`TracingLogger`]
//! forwards to `tracing` events, which [`init`] routes to stdout and an
//! optional log file.

use crate::config::{LogFormat, LoggingConfig};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// Sink for lifecycle and fault messages.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

/// [`Logger`] emitting `tracing` events under the `dht_mqtt` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!(target: "dht_mqtt", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "dht_mqtt", "{message}");
    }
}

/// Errors setting up the global subscriber.
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log level '{level}': {source}")]
    Filter { level: String, source: ParseError },
    #[error("Failed to open log file {}: {source}", path.display())]
    File { path: PathBuf, source: io::Error },
    #[error("Failed to install the tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn parse_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|source| LoggerError::Filter {
        level: level.to_string(),
        source,
    })
}

/// Filter for the console layer.
///
/// An explicit override (command line) wins over `RUST_LOG`, which wins over
/// the configured level.
fn console_filter(config: &LoggingConfig, level_override: Option<&str>) -> Result<EnvFilter, LoggerError> {
    match level_override {
        Some(level) => parse_filter(level),
        None => match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => parse_filter(&config.level),
        },
    }
}

fn open_log_file(path: &Path) -> Result<File, LoggerError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggerError::File {
            path: path.to_path_buf(),
            source,
        })
}

/// Build the console layer and, when configured, the file layer.
fn build_layers(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<Vec<BoxedLayer>, LoggerError> {
    let mut layers = Vec::new();

    let filter = console_filter(config, level_override)?;
    let console = match config.format {
        LogFormat::Full => fmt::layer()
            .with_writer(io::stdout)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(io::stdout)
            .with_filter(filter)
            .boxed(),
    };
    layers.push(console);

    if let Some(path) = &config.file {
        let file = open_log_file(path)?;
        let filter = parse_filter(&config.file_level)?;
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(filter)
                .boxed(),
        );
    }

    Ok(layers)
}

/// Install the global subscriber. Call once at startup.
pub fn init(config: &LoggingConfig, level_override: Option<&str>) -> Result<(), LoggerError> {
    let layers = build_layers(config, level_override)?;
    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}
