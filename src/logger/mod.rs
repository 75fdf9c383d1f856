//! Tag-based structured logging
//!
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-tag debug control via `--debug-<tag>` flags
//! - Dual output: colored console + daily log file
//!
//! ## Usage
//!
//! ```rust,ignore
//! use swap_orchestrator::logger::{self, LogTag};
//!
//! logger::info(LogTag::Engine, "Run started");
//! logger::debug(LogTag::Ledger, "Swap payload: ..."); // Only if --debug-ledger
//! logger::verbose(LogTag::Guard, "Lease state: ..."); // Only if --verbose
//! ```
//!
//! Call [`init`] once at startup, before any logging occurs.

mod config;
mod core;
mod file;
mod format;
mod tags;

pub use self::core::LogLevel;
pub use config::{get_logger_config, init_from_args, set_logger_config, LoggerConfig};
pub use tags::LogTag;

/// Initialize the logger from command-line flags and open the log file
pub fn init() {
    config::init_from_args();
    file::init_file_logging();
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (hidden by --quiet)
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level
///
/// Only shown when `--debug-<tag>` is present for the given tag.
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level
///
/// Only shown with `--verbose` or `--verbose-<tag>`.
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Force flush pending log writes
pub fn flush() {
    file::flush_file_logging();
}
