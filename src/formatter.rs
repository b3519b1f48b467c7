//! Rendering of [`LogEvent`]s as Stackdriver-compatible JSON lines.
//!
//! One call to [`StackdriverFormatter::format`] writes exactly one line,
//! plus one short overflow notice line when the entry is estimated to be
//! over the configured size budget. Output is streamed into the sink
//! through a [`CountingSink`], so measuring the entry needs neither a
//! buffer nor a second pass.

use crate::counting::{CountingSink, Discard};
use crate::error::FormatError;
use crate::fingerprint::Fingerprint;
use crate::json::{write_quoted_json, JsonValueFormatter, ValueFormatter};
use crate::keys::{is_reserved, HttpRequest, ReservedKey};
use crate::record::{Level, LogEvent, SourceLocation};
use crate::severity::{severity_for, Severity};
use crate::template::MessageTemplate;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// Default size budget. The backend's documented limit is 256 KiB per
/// entry; staying well below it leaves room for the backend's own
/// metadata.
pub const DEFAULT_ENTRY_LIMIT_BYTES: usize = 200 * 1024;

/// Worst-case UTF-8 bytes per character.
pub const MAX_BYTES_PER_CHAR: usize = 4;

pub const OVERFLOW_MESSAGE: &str = "An attempt was made to write a log event that exceeds the \
Stackdriver entry length limit - check logs for the partially parsed entry just prior to this \
and fix at source";

/// Seconds part of the round-trip timestamp; the fraction is written as
/// seven digits of 100 ns ticks after it.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const NANOS_PER_TICK: u32 = 100;

const REPORTED_ERROR_EVENT_TYPE: &str =
    "type.googleapis.com/google.devtools.clouderrorreporting.v1beta1.ReportedErrorEvent";

/// Identifies the service in Error Reporting entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContext {
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    /// Emit an overflow notice after entries estimated over
    /// `entry_limit_bytes`.
    pub check_payload_limit: bool,
    pub entry_limit_bytes: usize,
    /// Write the unrendered template as `messageTemplate`.
    pub include_message_template: bool,
    /// When set, ERROR and CRITICAL entries carry the fields Error
    /// Reporting needs to pick them up.
    pub error_reporting: Option<ServiceContext>,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            check_payload_limit: true,
            entry_limit_bytes: DEFAULT_ENTRY_LIMIT_BYTES,
            include_message_template: false,
            error_reporting: None,
        }
    }
}

/// What a single [`StackdriverFormatter::format`] call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOutcome {
    /// Characters in the primary line, newline included.
    pub entry_chars: usize,
    /// Whether the overflow notice line was written after it.
    pub overflowed: bool,
}

impl FormatOutcome {
    pub fn estimated_bytes(&self) -> usize {
        self.entry_chars.saturating_mul(MAX_BYTES_PER_CHAR)
    }
}

#[derive(Clone)]
pub struct StackdriverFormatter {
    config: FormatterConfig,
    value_formatter: Arc<dyn ValueFormatter>,
}

impl StackdriverFormatter {
    pub fn new(config: FormatterConfig) -> Result<Self, FormatError> {
        Self::with_value_formatter(config, Arc::new(JsonValueFormatter::default()))
    }

    /// Build a formatter that serializes property values with
    /// `value_formatter`.
    ///
    /// Fails with [`FormatError::InvalidArgument`] when the size budget is
    /// zero, or too small for the overflow notice itself to fit under it.
    pub fn with_value_formatter(
        config: FormatterConfig,
        value_formatter: Arc<dyn ValueFormatter>,
    ) -> Result<Self, FormatError> {
        if config.entry_limit_bytes == 0 {
            return Err(FormatError::InvalidArgument(
                "entry_limit_bytes must be greater than zero".to_string(),
            ));
        }

        let formatter = Self { config, value_formatter };
        if formatter.config.check_payload_limit {
            let notice_chars = formatter.measure(&overflow_notice(DateTime::<Utc>::default()))?;
            if formatter.exceeds_budget(notice_chars) {
                return Err(FormatError::InvalidArgument(format!(
                    "entry_limit_bytes ({}) must exceed the overflow notice estimate ({})",
                    formatter.config.entry_limit_bytes,
                    notice_chars * MAX_BYTES_PER_CHAR
                )));
            }
        }
        Ok(formatter)
    }

    pub fn config(&self) -> &FormatterConfig {
        &self.config
    }

    pub fn format<W: fmt::Write + ?Sized>(
        &self,
        event: &LogEvent,
        out: &mut W,
    ) -> Result<FormatOutcome, FormatError> {
        self.format_with_request(event, None, out)
    }

    /// Format `event` with request metadata from HTTP middleware.
    ///
    /// Fields set on `http` take precedence over properties of the same
    /// reserved name on the event.
    ///
    /// On error the sink may hold a partial line and should not be
    /// appended to.
    pub fn format_with_request<W: fmt::Write + ?Sized>(
        &self,
        event: &LogEvent,
        http: Option<&HttpRequest>,
        out: &mut W,
    ) -> Result<FormatOutcome, FormatError> {
        let mut counting = CountingSink::new(&mut *out);
        self.write_entry(event, http, &mut counting)?;
        let entry_chars = counting.count();

        if !self.config.check_payload_limit || !self.exceeds_budget(entry_chars) {
            return Ok(FormatOutcome { entry_chars, overflowed: false });
        }

        tracing::debug!(
            entry_chars,
            limit = self.config.entry_limit_bytes,
            "log entry over size budget, writing overflow notice"
        );

        let notice = overflow_notice(event.timestamp);
        let mut counting = CountingSink::new(&mut *out);
        self.write_entry(&notice, None, &mut counting)?;
        debug_assert!(!self.exceeds_budget(counting.count()));

        Ok(FormatOutcome { entry_chars, overflowed: true })
    }

    pub fn format_to_string(
        &self,
        event: &LogEvent,
        http: Option<&HttpRequest>,
    ) -> Result<String, FormatError> {
        let mut out = String::new();
        self.format_with_request(event, http, &mut out)?;
        Ok(out)
    }

    fn exceeds_budget(&self, chars: usize) -> bool {
        chars.saturating_mul(MAX_BYTES_PER_CHAR) >= self.config.entry_limit_bytes
    }

    fn measure(&self, event: &LogEvent) -> Result<usize, FormatError> {
        let mut discard = Discard;
        let mut counting = CountingSink::new(&mut discard);
        self.write_entry(event, None, &mut counting)?;
        Ok(counting.count())
    }

    fn write_entry(
        &self,
        event: &LogEvent,
        http: Option<&HttpRequest>,
        out: &mut dyn fmt::Write,
    ) -> Result<(), FormatError> {
        out.write_str("{\"timestamp\":\"")?;
        write_timestamp(event.timestamp, out)?;

        out.write_str("\",\"message\":")?;
        write_quoted_json(&event.render_message(), out)?;

        write!(out, ",\"fingerprint\":\"{}\"", Fingerprint::of(event.template.text()))?;

        let severity = severity_for(event.level);
        write!(out, ",\"severity\":\"{}\"", severity)?;

        if let Some(exception) = &event.exception {
            out.write_str(",\"exception\":")?;
            write_quoted_json(exception, out)?;
        }

        if self.config.include_message_template {
            out.write_str(",\"messageTemplate\":")?;
            write_quoted_json(event.template.text(), out)?;
        }

        self.write_http_request(event, http, out)?;

        if let Some(service) = &self.config.error_reporting {
            if severity >= Severity::Error {
                write_error_context(service, event.source.as_ref(), out)?;
            }
        }

        for (name, value) in event.properties.iter() {
            if is_reserved(name) {
                continue;
            }
            // `@` prefixes are doubled so they can't collide with our own
            // `@type`, or with type tags from the value formatter.
            let key: Cow<'_, str> = if name.starts_with('@') {
                Cow::Owned(format!("@{}", name))
            } else {
                Cow::Borrowed(name)
            };
            out.write_char(',')?;
            write_quoted_json(&key, out)?;
            out.write_char(':')?;
            self.value_formatter.format(value, out)?;
        }

        out.write_str("}\n")?;
        Ok(())
    }

    fn write_http_request(
        &self,
        event: &LogEvent,
        http: Option<&HttpRequest>,
        out: &mut dyn fmt::Write,
    ) -> Result<(), FormatError> {
        out.write_str(",\"httpRequest\":{")?;
        let mut first = true;
        for key in ReservedKey::ALL {
            let explicit = http.and_then(|h| h.value(key));
            let value = explicit.as_ref().or_else(|| {
                if !key.accepts_property() {
                    return None;
                }
                event.properties.get(key.as_str()).filter(|v| !v.is_null())
            });
            let Some(value) = value else {
                continue;
            };
            if !first {
                out.write_char(',')?;
            }
            first = false;
            write_quoted_json(key.as_str(), out)?;
            out.write_char(':')?;
            self.value_formatter.format(value, out)?;
        }
        out.write_char('}')?;
        Ok(())
    }
}

impl Default for StackdriverFormatter {
    fn default() -> Self {
        Self {
            config: FormatterConfig::default(),
            value_formatter: Arc::new(JsonValueFormatter::default()),
        }
    }
}

impl fmt::Debug for StackdriverFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackdriverFormatter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// `2019-11-04T08:30:00.1234567Z`: UTC with seven fractional digits.
fn write_timestamp(timestamp: DateTime<Utc>, out: &mut dyn fmt::Write) -> fmt::Result {
    // leap seconds carry an extra second in the nanosecond field
    let ticks = timestamp.nanosecond() % 1_000_000_000 / NANOS_PER_TICK;
    write!(out, "{}.{:07}Z", timestamp.format(TIMESTAMP_FORMAT), ticks)
}

/// The fixed CRITICAL entry written after an oversized one.
pub fn overflow_notice(timestamp: DateTime<Utc>) -> LogEvent {
    LogEvent::new(timestamp, Level::Fatal, MessageTemplate::literal(OVERFLOW_MESSAGE))
}

fn write_error_context(
    service: &ServiceContext,
    source: Option<&SourceLocation>,
    out: &mut dyn fmt::Write,
) -> Result<(), FormatError> {
    out.write_str(",\"@type\":")?;
    write_quoted_json(REPORTED_ERROR_EVENT_TYPE, out)?;

    out.write_str(",\"serviceContext\":{\"service\":")?;
    write_quoted_json(&service.service, out)?;
    if let Some(version) = &service.version {
        out.write_str(",\"version\":")?;
        write_quoted_json(version, out)?;
    }
    out.write_char('}')?;

    let Some(source) = source else {
        return Ok(());
    };
    if source.file.is_none() && source.line.is_none() && source.function.is_none() {
        return Ok(());
    }

    out.write_str(",\"context\":{\"reportLocation\":{")?;
    let mut first = true;
    if let Some(file) = &source.file {
        out.write_str("\"filePath\":")?;
        write_quoted_json(file, out)?;
        first = false;
    }
    if let Some(line) = source.line {
        if !first {
            out.write_char(',')?;
        }
        write!(out, "\"lineNumber\":{}", line)?;
        first = false;
    }
    if let Some(function) = &source.function {
        if !first {
            out.write_char(',')?;
        }
        out.write_str("\"functionName\":")?;
        write_quoted_json(function, out)?;
    }
    out.write_str("}}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Properties, PropertyValue};
    use chrono::TimeZone;
    use serde_json::Value;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap() + chrono::Duration::microseconds(123_456)
    }

    fn parse_lines(out: &str) -> Vec<Value> {
        out.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
    }

    #[test]
    fn writes_fields_in_order() {
        let event = LogEvent::new(timestamp(), Level::Info, MessageTemplate::parse("Hi {name}"))
            .with_properties(Properties::new().with("name", "bob"));
        let out = StackdriverFormatter::default().format_to_string(&event, None).unwrap();
        assert_eq!(
            out,
            format!(
                "{{\"timestamp\":\"2024-03-09T14:05:07.1234560Z\",\"message\":\"Hi bob\",\
                 \"fingerprint\":\"{}\",\"severity\":\"INFO\",\"httpRequest\":{{}},\"name\":\"bob\"}}\n",
                Fingerprint::of("Hi {name}")
            )
        );
    }

    #[test]
    fn message_template_included_when_configured() {
        let config = FormatterConfig { include_message_template: true, ..FormatterConfig::default() };
        let formatter = StackdriverFormatter::new(config).unwrap();
        let event = LogEvent::new(timestamp(), Level::Info, MessageTemplate::parse("{n} items"))
            .with_properties(Properties::new().with("n", 3i64));
        let lines = parse_lines(&formatter.format_to_string(&event, None).unwrap());
        assert_eq!(lines[0]["messageTemplate"], "{n} items");
        assert_eq!(lines[0]["message"], "3 items");
    }

    #[test]
    fn explicit_http_request_wins_over_properties() {
        let event = LogEvent::new(timestamp(), Level::Info, MessageTemplate::literal("req"))
            .with_properties(
                Properties::new()
                    .with("remoteIp", "10.0.0.1")
                    .with("userAgent", "from-bag")
                    .with("referer", PropertyValue::null()),
            );
        let http = HttpRequest {
            user_agent: Some("from-middleware".into()),
            status: Some(503),
            ..HttpRequest::default()
        };
        let out = StackdriverFormatter::default().format_to_string(&event, Some(&http)).unwrap();
        assert!(out.contains(
            r#""httpRequest":{"status":503,"remoteIp":"10.0.0.1","userAgent":"from-middleware"}"#
        ));
        let line = &parse_lines(&out)[0];
        assert!(line.get("remoteIp").is_none());
        assert!(line.get("referer").is_none());
    }

    #[test]
    fn error_reporting_fields_only_on_errors() {
        let config = FormatterConfig {
            error_reporting: Some(ServiceContext {
                service: "checkout".into(),
                version: Some("1.4.2".into()),
            }),
            ..FormatterConfig::default()
        };
        let formatter = StackdriverFormatter::new(config).unwrap();
        let source = SourceLocation {
            file: Some("src/cart.rs".into()),
            line: Some(88),
            function: Some("cart::checkout".into()),
        };

        let error = LogEvent::new(timestamp(), Level::Error, MessageTemplate::literal("boom"))
            .with_source(source.clone());
        let line = &parse_lines(&formatter.format_to_string(&error, None).unwrap())[0];
        assert_eq!(line["@type"], REPORTED_ERROR_EVENT_TYPE);
        assert_eq!(line["serviceContext"]["service"], "checkout");
        assert_eq!(line["serviceContext"]["version"], "1.4.2");
        assert_eq!(line["context"]["reportLocation"]["filePath"], "src/cart.rs");
        assert_eq!(line["context"]["reportLocation"]["lineNumber"], 88);
        assert_eq!(line["context"]["reportLocation"]["functionName"], "cart::checkout");

        let info = LogEvent::new(timestamp(), Level::Warning, MessageTemplate::literal("meh"))
            .with_source(source);
        let line = &parse_lines(&formatter.format_to_string(&info, None).unwrap())[0];
        assert!(line.get("@type").is_none());
        assert!(line.get("serviceContext").is_none());
    }

    #[test]
    fn at_type_property_cannot_shadow_error_type() {
        let config = FormatterConfig {
            error_reporting: Some(ServiceContext { service: "svc".into(), version: None }),
            ..FormatterConfig::default()
        };
        let formatter = StackdriverFormatter::new(config).unwrap();
        let event = LogEvent::new(timestamp(), Level::Error, MessageTemplate::literal("x"))
            .with_properties(Properties::new().with("@type", "mine"));
        let line = &parse_lines(&formatter.format_to_string(&event, None).unwrap())[0];
        assert_eq!(line["@type"], REPORTED_ERROR_EVENT_TYPE);
        assert_eq!(line["@@type"], "mine");
        assert!(line["serviceContext"].get("version").is_none());
        assert!(line.get("context").is_none());
    }

    #[test]
    fn zero_budget_is_invalid() {
        let config = FormatterConfig { entry_limit_bytes: 0, ..FormatterConfig::default() };
        assert!(matches!(
            StackdriverFormatter::new(config),
            Err(FormatError::InvalidArgument(_))
        ));
    }

    #[test]
    fn budget_smaller_than_notice_is_invalid() {
        let config = FormatterConfig { entry_limit_bytes: 256, ..FormatterConfig::default() };
        assert!(matches!(
            StackdriverFormatter::new(config),
            Err(FormatError::InvalidArgument(_))
        ));

        let unchecked = FormatterConfig {
            entry_limit_bytes: 256,
            check_payload_limit: false,
            ..FormatterConfig::default()
        };
        assert!(StackdriverFormatter::new(unchecked).is_ok());
    }

    #[test]
    fn notice_fits_default_budget() {
        let formatter = StackdriverFormatter::default();
        let chars = formatter.measure(&overflow_notice(timestamp())).unwrap();
        assert!(!formatter.exceeds_budget(chars));
    }

    #[test]
    fn overflow_can_be_disabled() {
        let config = FormatterConfig { check_payload_limit: false, ..FormatterConfig::default() };
        let formatter = StackdriverFormatter::new(config).unwrap();
        let event = LogEvent::new(timestamp(), Level::Info, MessageTemplate::literal("*".repeat(60_000)));
        let mut out = String::new();
        let outcome = formatter.format(&event, &mut out).unwrap();
        assert!(!outcome.overflowed);
        assert!(outcome.estimated_bytes() >= DEFAULT_ENTRY_LIMIT_BYTES);
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: FormatterConfig =
            serde_json::from_str(r#"{"include_message_template":true}"#).unwrap();
        assert!(config.include_message_template);
        assert!(config.check_payload_limit);
        assert_eq!(config.entry_limit_bytes, DEFAULT_ENTRY_LIMIT_BYTES);
    }
}
