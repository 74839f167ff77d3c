//! Logging setup for hosts embedding the allocator.
//!
//! Allocator events carry the `devcache_core` target, so the default filter
//! keeps them at info and everything else at warn.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FORMAT_ENV: &str = "DEVCACHE_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "DEVCACHE_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging (default for production).
    #[default]
    Json,
    /// Human-readable pretty printing (for development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format (JSON or Pretty).
    pub format: LogFormat,
    /// Filter directive, e.g. "info" or "devcache_core=debug".
    pub level: String,
    /// Optional file path for log output. If None, logs to stderr.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "warn,devcache_core=info".to_string(),
            output_path: None,
        }
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber. A second call fails with
/// [`LogError::AlreadyInitialized`].
///
/// Both formats write to stderr unless `output_path` is set, in which case
/// lines are appended to that file and ANSI colouring is turned off.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let layer = fmt::layer()
        .with_writer(make_writer(config.output_path.as_deref())?)
        .with_ansi(config.output_path.is_none())
        .with_target(true);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(layer.json().flatten_event(true).with_current_span(false))
            .try_init(),
        LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
    };
    installed.map_err(|_| LogError::AlreadyInitialized)
}

fn make_writer(path: Option<&Path>) -> Result<BoxMakeWriter, LogError> {
    let Some(path) = path else {
        return Ok(BoxMakeWriter::new(std::io::stderr));
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LogError::FileOpen(format!("{}: {}", parent.display(), e)))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LogError::FileOpen(format!("{}: {}", path.display(), e)))?;
    Ok(BoxMakeWriter::new(Mutex::new(file)))
}

/// Build a config from the environment: `DEVCACHE_LOG_FORMAT` ("json" or
/// "pretty"), `DEVCACHE_LOG_FILE` and `RUST_LOG`. Unset or blank values keep
/// the defaults.
pub fn config_from_env() -> LogConfig {
    let mut config = LogConfig::default();
    if let Some(format) = non_blank_env(LOG_FORMAT_ENV) {
        if format.eq_ignore_ascii_case("pretty") {
            config.format = LogFormat::Pretty;
        }
    }
    if let Some(path) = non_blank_env(LOG_FILE_ENV) {
        config.output_path = Some(PathBuf::from(path));
    }
    if let Some(level) = non_blank_env("RUST_LOG") {
        config.level = level;
    }
    config
}

fn non_blank_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_rejected_before_install() {
        let config = LogConfig { level: "devcache_core=[".to_string(), ..LogConfig::default() };
        assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter(_))));
    }

    #[test]
    fn json_logs_go_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alloc.log");
        let config = LogConfig { output_path: Some(path.clone()), ..LogConfig::default() };
        match init_logging(&config) {
            Ok(()) => {
                tracing::info!(target: "devcache_core", bytes = 512, "log line");
                assert!(path.exists());
            }
            Err(LogError::AlreadyInitialized) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn log_file_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("alloc.log");
        assert!(make_writer(Some(&path)).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn existing_log_file_is_appended_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alloc.log");
        std::fs::write(&path, "earlier run\n").unwrap();
        assert!(make_writer(Some(&path)).is_ok());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier run\n");
    }

    #[test]
    fn unwritable_log_path_is_a_file_open_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let below_file = file.path().join("alloc.log");
        assert!(matches!(make_writer(Some(&below_file)), Err(LogError::FileOpen(_))));
    }

    #[test]
    fn env_selects_format_and_file() {
        std::env::set_var(LOG_FORMAT_ENV, "PRETTY");
        std::env::set_var(LOG_FILE_ENV, "/tmp/devcache.log");
        let config = config_from_env();
        std::env::remove_var(LOG_FORMAT_ENV);
        std::env::remove_var(LOG_FILE_ENV);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.output_path, Some(PathBuf::from("/tmp/devcache.log")));
    }

    #[test]
    fn defaults_are_json_to_stderr() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.output_path.is_none());
    }
}
