//! Pluggable log sink.
//!
//! The executor reports failures to a [`LogSink`] in addition to returning
//! them. The default sink forwards to `tracing`; embedders can route entries
//! elsewhere or drop them with [`NullSink`]. A sink never affects execution.

use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Severity of a sink entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Normal,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Debug => "Debug",
            Self::Normal => "Normal",
            Self::Warning => "Warning",
            Self::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Receiver for gateway log entries.
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, message: &str, detail: &str);
}

/// Forwards entries to `tracing` under the `sqlgate::sink` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, severity: Severity, message: &str, detail: &str) {
        match severity {
            Severity::Debug => debug!(target: "sqlgate::sink", detail, "{}", message),
            Severity::Normal => info!(target: "sqlgate::sink", detail, "{}", message),
            Severity::Warning => warn!(target: "sqlgate::sink", detail, "{}", message),
            Severity::Error => error!(target: "sqlgate::sink", detail, "{}", message),
        }
    }
}

/// Discards every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _severity: Severity, _message: &str, _detail: &str) {}
}
