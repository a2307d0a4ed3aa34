//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - Pretty or JSON console formatting
//! - JSON log files with rotation

pub mod logger;

pub use logger::{parse_log_level, LoggerImpl, LOG_FILE_NAME};
