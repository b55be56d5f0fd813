//! Utilities module for logging and error handling
//!
//! This module provides:
//! - Structured logging with tracing, a centralized error log and session markers
//! - The error taxonomy shared by every stage of the inference pipeline

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{ErrorKind, ErrorReport, LeafbotError, Result};
pub use logging::{init_logging, log_error, LogConfig, LogLevel, Session};

/// Format a duration in milliseconds in a human-readable way
pub fn format_millis(millis: f64) -> String {
    if millis < 1000.0 {
        format!("{:.1}ms", millis)
    } else {
        format!("{:.2}s", millis / 1000.0)
    }
}
