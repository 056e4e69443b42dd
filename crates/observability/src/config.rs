use serde::{Deserialize, Serialize};

/// Minimum level recorded for aster crates.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Configuration for logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether logging is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Level for aster crates; everything else logs at info. `RUST_LOG` overrides both.
    #[serde(default)]
    pub level: LogLevel,

    /// Whether to use JSON formatting for logs
    #[serde(default)]
    pub json: bool,

    /// Colour plain-text output
    #[serde(default = "default_true")]
    pub ansi: bool,

    /// Extra filter directives, e.g. `aster_net_handshake=trace`
    #[serde(default)]
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::default(),
            json: false,
            ansi: true,
            directives: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}
