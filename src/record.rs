use crate::template::MessageTemplate;
use crate::value::Properties;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::Write;

/// Host-side log level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Where in the source a log statement lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
}

/// A single log event as handed to the formatter.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub template: MessageTemplate,
    pub properties: Properties,
    pub exception: Option<String>,
    pub source: Option<SourceLocation>,
}

impl LogEvent {
    pub fn new(timestamp: DateTime<Utc>, level: Level, template: MessageTemplate) -> Self {
        Self {
            timestamp,
            level,
            template,
            properties: Properties::new(),
            exception: None,
            source: None,
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Attach an error, rendering it together with its `source()` chain.
    pub fn with_error(self, error: &(dyn Error + 'static)) -> Self {
        self.with_exception(describe_error(error))
    }

    pub fn with_source(mut self, source: SourceLocation) -> Self {
        self.source = Some(source);
        self
    }

    pub fn render_message(&self) -> String {
        self.template.render(&self.properties)
    }
}

/// `outer: inner: root` rendering of an error chain.
pub fn describe_error(error: &(dyn Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut cause = error.source();
    while let Some(err) = cause {
        let _ = write!(out, ": {}", err);
        cause = err.source();
    }
    out
}
