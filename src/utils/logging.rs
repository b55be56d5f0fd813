//! Logging Module
//!
//! Provides structured logging utilities using the `tracing` crate, plus the
//! centralized error log and session markers used around the inference core.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use rand::Rng;
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
    /// Append log lines to this file instead of stderr
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            timestamps: true,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
            log_file: None,
        }
    }
}

impl LogConfig {
    /// Create a verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ..Self::default()
        }
    }

    /// Create a quiet logging config (errors only)
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            timestamps: false,
            ..Self::default()
        }
    }

    /// Write to a file; ANSI colors are turned off for file output
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self.ansi_colors = false;
        self
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {:?}", other)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Initialize logging with the given configuration
///
/// # Returns
/// * `Result<(), String>` - Ok if logging was initialized, Err with message otherwise
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let writer = make_writer(config)?;

    let builder = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .with_writer(writer)
        .compact();

    let result = if config.timestamps {
        tracing::subscriber::set_global_default(builder.finish())
    } else {
        tracing::subscriber::set_global_default(builder.without_time().finish())
    };

    result.map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Log sink: the configured file in append mode, or stderr
fn make_writer(config: &LogConfig) -> Result<BoxMakeWriter, String> {
    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file {:?}: {}", path, e))?;
            Ok(BoxMakeWriter::new(Mutex::new(file)))
        }
        None => Ok(BoxMakeWriter::new(std::io::stderr)),
    }
}

/// Centralized error log: one ERROR event per failure, tagged with its kind
pub fn log_error(kind: impl std::fmt::Display, description: &str) {
    let kind = kind.to_string().to_uppercase();
    tracing::error!(kind = %kind, "{}: {}", kind, description);
}

/// Marks the start and end of a process session in the log.
///
/// Hold the guard for the lifetime of the process; the end marker is written
/// when it drops.
#[derive(Debug)]
pub struct Session {
    id: u16,
    started: std::time::Instant,
}

impl Session {
    pub fn start() -> Self {
        let id = rand::thread_rng().gen_range(1000..=9999);
        tracing::info!("--- START SESSION {} ---", id);
        Self {
            id,
            started: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::info!(
            "--- END SESSION {} after {:.1}s ---",
            self.id,
            self.started.elapsed().as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("INFO".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("Warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("unknown".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.timestamps);
        assert!(config.log_file.is_none());

        let quiet = LogConfig::quiet();
        assert_eq!(quiet.level, LogLevel::Error);
        assert_eq!(quiet.level.to_string(), "ERROR");
    }

    #[test]
    fn test_log_file_disables_ansi() {
        let config = LogConfig::verbose().with_log_file("leafbot.log");
        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.ansi_colors);
        assert_eq!(config.log_file, Some(PathBuf::from("leafbot.log")));
    }

    #[test]
    fn test_unopenable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig::default().with_log_file(dir.path().join("missing").join("leafbot.log"));

        let err = init_logging(&config).unwrap_err();
        assert!(err.contains("leafbot.log"));
    }

    #[test]
    fn test_log_file_is_created_for_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leafbot.log");

        assert!(make_writer(&LogConfig::default().with_log_file(&path)).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_session_id_is_four_digits() {
        let session = Session::start();
        assert!((1000..=9999).contains(&session.id()));
    }
}
