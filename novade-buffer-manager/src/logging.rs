//! Logging setup for processes hosting the buffer manager.
//!
//! Built on `tracing`. [`init_minimal_logging`] is enough for tests and early
//! startup; [`init_logging`] applies a [`LoggingConfig`] with a console layer
//! and an optional daily-rolling file layer.

use std::fs;
use std::io::stdout;
use std::path::Path;

use parking_lot::{const_mutex, Mutex};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::LoggingError;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Keeps the file writer alive so buffered lines are flushed.
static LOG_WORKER_GUARD: Mutex<Option<WorkerGuard>> = const_mutex(None);

/// Logs to `stderr`, filtered by `RUST_LOG` (default "info").
///
/// Does nothing if a global subscriber is already installed.
pub fn init_minimal_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .try_init();
}

fn level_filter(level: &str) -> Result<String, LoggingError> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        invalid => {
            return Err(LoggingError::InitializationFailure(format!(
                "Invalid log level in config: {}",
                invalid
            )))
        }
    };
    Ok(level.to_string())
}

fn create_file_layer(log_path: &Path, format: &str) -> Result<(BoxedLayer, WorkerGuard), LoggingError> {
    let directory = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory)?;
    let file_name = log_path
        .file_name()
        .ok_or_else(|| LoggingError::InitializationFailure(format!("Log path {:?} has no file name", log_path)))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, file_name));
    let layer = if format.eq_ignore_ascii_case("json") {
        fmt::layer().json().with_writer(writer).with_ansi(false).boxed()
    } else {
        fmt::layer().with_writer(writer).with_ansi(false).boxed()
    };
    Ok((layer, guard))
}

/// Installs the global subscriber described by `config`.
///
/// With `is_reload` set, an already installed subscriber is not an error;
/// the file guard is still swapped so a changed or removed log file takes
/// effect for the writer side.
pub fn init_logging(config: &LoggingConfig, is_reload: bool) -> Result<(), LoggingError> {
    let level = level_filter(&config.level)?;
    let json = config.format.eq_ignore_ascii_case("json");

    let console_filter = EnvFilter::try_new(&level).map_err(|e| LoggingError::FilterError(e.to_string()))?;
    let console_layer = if json {
        fmt::layer().json().with_writer(stdout).with_ansi(false).with_filter(console_filter).boxed()
    } else {
        fmt::layer()
            .with_writer(stdout)
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_filter(console_filter)
            .boxed()
    };

    let mut layers: Vec<BoxedLayer> = vec![console_layer];
    let mut new_guard = None;
    if let Some(log_path) = &config.file_path {
        let file_filter = EnvFilter::try_new(&level).map_err(|e| LoggingError::FilterError(e.to_string()))?;
        let (file_layer, guard) = create_file_layer(log_path, &config.format)?;
        layers.push(file_layer.with_filter(file_filter).boxed());
        new_guard = Some(guard);
    }

    let result = Registry::default().with(layers).try_init();
    *LOG_WORKER_GUARD.lock() = new_guard;

    match result {
        Ok(()) => Ok(()),
        Err(_) if is_reload => Ok(()),
        Err(e) => Err(LoggingError::InitializationFailure(format!(
            "Failed to set global tracing subscriber. Was it already initialized? Error: {}",
            e
        ))),
    }
}
