//! Environment variable names used by this crate for convenient
//! configuration from services.
//!
//! These are purely helpers; the formatter itself never reads the
//! environment.

use crate::formatter::{FormatterConfig, ServiceContext};

/// Output target, see [`parse_output`](crate::output::parse_output).
pub const STACKDRIVER_OUTPUT_ENV: &str = "STACKDRIVER_OUTPUT";

/// Size budget in bytes before an overflow notice is written.
pub const STACKDRIVER_ENTRY_LIMIT_BYTES_ENV: &str = "STACKDRIVER_ENTRY_LIMIT_BYTES";

/// `true`/`false`: whether to check entries against the size budget.
pub const STACKDRIVER_CHECK_PAYLOAD_LIMIT_ENV: &str = "STACKDRIVER_CHECK_PAYLOAD_LIMIT";

/// `true`/`false`: whether to write `messageTemplate`.
pub const STACKDRIVER_INCLUDE_MESSAGE_TEMPLATE_ENV: &str = "STACKDRIVER_INCLUDE_MESSAGE_TEMPLATE";

/// Service name for Error Reporting; enables it when set.
pub const STACKDRIVER_SERVICE_NAME_ENV: &str = "STACKDRIVER_SERVICE_NAME";

/// Optional service version for Error Reporting.
pub const STACKDRIVER_SERVICE_VERSION_ENV: &str = "STACKDRIVER_SERVICE_VERSION";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl FormatterConfig {
    /// Defaults overridden by whatever `STACKDRIVER_*` variables are set.
    /// Values that don't parse are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = FormatterConfig::default();

        if let Some(limit) = lookup(STACKDRIVER_ENTRY_LIMIT_BYTES_ENV).and_then(|v| v.trim().parse().ok()) {
            config.entry_limit_bytes = limit;
        }
        if let Some(check) = lookup(STACKDRIVER_CHECK_PAYLOAD_LIMIT_ENV).and_then(|v| parse_bool(&v)) {
            config.check_payload_limit = check;
        }
        if let Some(include) = lookup(STACKDRIVER_INCLUDE_MESSAGE_TEMPLATE_ENV).and_then(|v| parse_bool(&v)) {
            config.include_message_template = include;
        }
        if let Some(service) = lookup(STACKDRIVER_SERVICE_NAME_ENV).filter(|s| !s.trim().is_empty()) {
            config.error_reporting = Some(ServiceContext {
                service,
                version: lookup(STACKDRIVER_SERVICE_VERSION_ENV).filter(|s| !s.trim().is_empty()),
            });
        }

        config
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
