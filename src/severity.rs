//! Mapping of host log levels onto the backend's `LogSeverity` names.

use crate::record::Level;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Default,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Default => "DEFAULT",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn severity_for(level: Level) -> Severity {
    match level {
        // no trace severity on the backend
        Level::Trace | Level::Debug => Severity::Debug,
        Level::Info => Severity::Info,
        Level::Warning => Severity::Warning,
        Level::Error => Severity::Error,
        Level::Fatal => Severity::Critical,
    }
}

/// Map a level by name, for hosts that only expose textual levels.
/// Unknown names map to [`Severity::Default`].
pub fn severity_for_name(name: &str) -> Severity {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" | "verbose" | "debug" => Severity::Debug,
        "info" | "information" => Severity::Info,
        "warn" | "warning" => Severity::Warning,
        "error" => Severity::Error,
        "fatal" | "critical" => Severity::Critical,
        _ => Severity::Default,
    }
}
