//! Logging for aster nodes.
//!
//! [`init_logging`] installs the global `tracing` subscriber described by a
//! [`LoggingConfig`].

mod config;
mod logging;

pub use config::{LogLevel, LoggingConfig};
pub use logging::{build_filter, init_logging};
