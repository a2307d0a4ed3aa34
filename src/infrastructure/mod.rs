//! Infrastructure layer module
//!
//! - Configuration management
//! - Logging infrastructure
//! - Target algorithm process management
//! - Shared concurrency primitives
//!
//! Infrastructure implementations back the adapters and decorators built on
//! the domain ports.

pub mod config;
pub mod logging;
pub mod process;
pub mod sync;
