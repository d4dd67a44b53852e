//! Centralized file-based logging system
//!
//! Writes logs to files in logs/ directory, separated by log type:
//! - logs/main.log - General application logs
//! - logs/error.log - Error and warning logs only
//! - logs/wire.log - Packet loop and connection logs
//!
//! Nothing in here runs on the per-packet path; the loops log only on
//! startup, shutdown, and degradations.

use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize centralized file logging
///
/// Creates logs/ directory and sets up file appenders for different log types.
/// Returns WorkerGuard which must be kept alive for the duration of the program.
pub fn init_logging() -> Vec<WorkerGuard> {
    // Create logs directory
    let logs_dir = Path::new("logs");
    if !logs_dir.exists() {
        fs::create_dir_all(logs_dir).expect("Failed to create logs directory");
    }

    let log_types = ["main", "error", "wire"];
    for log_type in &log_types {
        let dir = logs_dir.join(log_type);
        if !dir.exists() {
            fs::create_dir_all(&dir).expect("Failed to create log subdirectory");
        }
    }

    let mut guards = Vec::new();

    // Main log - all logs
    let (main_appender, main_guard) = create_appender("logs/main", "main");
    guards.push(main_guard);

    // Error log - ERROR and WARN only
    let (error_appender, error_guard) = create_appender("logs/error", "error");
    guards.push(error_guard);

    // Wire log - packet loop and connection logs
    let (wire_appender, wire_guard) = create_appender("logs/wire", "wire");
    guards.push(wire_guard);

    let main_layer = tracing_subscriber::fmt::layer()
        .with_writer(main_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json();

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    let wire_layer = tracing_subscriber::fmt::layer()
        .with_writer(wire_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target().contains("wire")
                || metadata.target().contains("conn")
                || metadata.target().contains("engine")
        }));

    // Console layer for development
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(EnvFilter::new("info"))
        .with(main_layer)
        .with(error_layer)
        .with(wire_layer)
        .with(console_layer)
        .init();

    tracing::info!("Logging system initialized. Log files in logs/ directory");

    guards
}

/// Create a rolling file appender
fn create_appender(dir: &str, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, name);

    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    (non_blocking, guard)
}

/// Log macro helpers for specific log types
#[macro_export]
macro_rules! log_wire {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "wire", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_conn {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "conn", $level, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_creation() {
        let test_dir = Path::new("logs_test");
        if test_dir.exists() {
            fs::remove_dir_all(test_dir).ok();
        }

        fs::create_dir_all(test_dir.join("wire")).unwrap();
        assert!(test_dir.join("wire").exists());

        fs::remove_dir_all(test_dir).ok();
    }
}
