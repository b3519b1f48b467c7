use crate::formatter::StackdriverFormatter;
use crate::keys::{HttpRequest, ReservedKey};
use crate::record::{describe_error, LogEvent, SourceLocation};
use crate::sink::LineSink;
use crate::template::{MessageTemplate, TemplateToken};
use crate::value::{Properties, PropertyValue};
use chrono::Utc;
use std::error::Error;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

const MAX_SEND_ATTEMPTS: u32 = 5;

/// `tracing_subscriber` layer that renders events as Stackdriver JSON
/// lines and forwards them to an asynchronous [`LineSink`] via a bounded
/// channel and background task.
///
/// Each event is formatted on the calling thread into a single chunk (its
/// line, plus the overflow notice when there is one), so entries from
/// different threads never interleave on the output. Writing is fully
/// decoupled from application threads.
///
/// Spans may carry HTTP request fields named after
/// [`ReservedKey`]s (`remoteIp`, `userAgent`, ...); events inside them get
/// those values in their `httpRequest` object, innermost span first.
pub struct StackdriverLayer {
    formatter: StackdriverFormatter,
    min_level: Level,
    sender: mpsc::Sender<String>,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Successfully enqueued into channel.
    pub enqueued_events: Arc<AtomicU64>,
    /// Dropped because the channel was full.
    pub dropped_events: Arc<AtomicU64>,
    /// Dropped because formatting failed.
    pub failed_events: Arc<AtomicU64>,
}

impl StackdriverLayer {
    /// Create a new layer and spawn a background task that pulls
    /// formatted entries from a bounded channel and writes them to the
    /// provided [`LineSink`] in batches.
    ///
    /// Minimal thresholds are enforced for `buffer`, `batch_size` and
    /// `flush_interval` to avoid degenerate configurations. The task
    /// drains what is left and exits once the layer is dropped.
    pub fn new(
        sink: Arc<dyn LineSink>,
        formatter: StackdriverFormatter,
        buffer: usize,
        batch_size: usize,
        flush_interval: Duration,
    ) -> (Self, JoinHandle<()>) {
        let buffer = buffer.max(16);
        let batch_size = batch_size.max(1);
        let flush_interval = flush_interval.max(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel::<String>(buffer);

        let handle = tokio::spawn(async move {
            let mut batch = String::new();
            let mut pending = 0usize;
            let mut ticker = interval(flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(entry) => {
                            batch.push_str(&entry);
                            pending += 1;
                            if pending >= batch_size {
                                if let Err(e) = send_batch(&*sink, &mut batch).await {
                                    eprintln!("error writing log batch: {}", e);
                                }
                                pending = 0;
                            }
                        }
                        None => {
                            if !batch.is_empty() {
                                if let Err(e) = send_batch(&*sink, &mut batch).await {
                                    eprintln!("error writing final log batch: {}", e);
                                }
                            }
                            if let Err(e) = sink.flush().await {
                                eprintln!("error flushing log sink: {}", e);
                            }
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if !batch.is_empty() {
                            if let Err(e) = send_batch(&*sink, &mut batch).await {
                                eprintln!("error flushing log batch: {}", e);
                            }
                            pending = 0;
                        }
                    }
                }
            }
        });

        (Self {
            formatter,
            min_level: Level::INFO,
            sender: tx,
            total_events: Arc::new(AtomicU64::new(0)),
            enqueued_events: Arc::new(AtomicU64::new(0)),
            dropped_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }, handle)
    }

    /// Only events at `level` or more severe are written.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn formatter(&self) -> &StackdriverFormatter {
        &self.formatter
    }
}

/// Write `batch` to the sink, retrying with exponential backoff. The
/// batch is cleared either way; after the last attempt it is dropped.
async fn send_batch(
    sink: &dyn LineSink,
    batch: &mut String,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(10);
    let mut attempt = 1;

    loop {
        match sink.write(batch.as_str()).await {
            Ok(()) => {
                batch.clear();
                return Ok(());
            }
            Err(e) if attempt >= MAX_SEND_ATTEMPTS => {
                batch.clear();
                return Err(e);
            }
            Err(_) => {
                eprintln!("log sink write failed, retrying in {:?}", backoff);
                sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, max_backoff);
                attempt += 1;
            }
        }
    }
}

impl<S> Layer<S> for StackdriverLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = HttpRequestVisitor::default();
        attrs.record(&mut visitor);
        if visitor.request.is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(visitor.request);
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let mut visitor = HttpRequestVisitor::default();
        values.record(&mut visitor);
        if visitor.request.is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            let mut extensions = span.extensions_mut();
            let mut updated = visitor.request;
            if let Some(existing) = extensions.get_mut::<HttpRequest>() {
                updated.merge_missing(existing);
            }
            extensions.replace(updated);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if *meta.level() > self.min_level {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut http = HttpRequest::default();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(request) = span.extensions().get::<HttpRequest>() {
                    http.merge_missing(request);
                }
            }
        }
        let http = (!http.is_empty()).then_some(http);

        let log_event = visitor.into_log_event(meta);
        let text = match self.formatter.format_to_string(&log_event, http.as_ref()) {
            Ok(text) => text,
            Err(e) => {
                self.failed_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("failed to format log event: {}", e);
                return;
            }
        };

        match self.sender.try_send(text) {
            Ok(()) => {
                self.enqueued_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(_e) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("log channel full, dropping log entry");
            }
        }
    }
}

/// Collects event fields into a property bag.
///
/// `message` is the rendered message, `template` (if present) a message
/// template rendered against the other fields, and `error`/`exception`
/// the event's exception.
#[derive(Default)]
pub struct EventVisitor {
    pub properties: Properties,
    pub message: Option<String>,
    pub template: Option<String>,
    pub exception: Option<String>,
}

impl EventVisitor {
    fn insert(&mut self, field: &Field, value: PropertyValue) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "template" => self.template = Some(value.to_string()),
            "error" | "exception" => self.exception = Some(value.to_string()),
            name => self.properties.insert(name, value),
        }
    }

    /// Build the [`LogEvent`] for this callsite.
    ///
    /// Without a `template` field the callsite name (`event file:line`)
    /// stands in as template text, so the fingerprint stays the same
    /// whatever values were interpolated into the message.
    pub fn into_log_event(self, meta: &Metadata<'_>) -> LogEvent {
        let template = match self.template {
            Some(text) => MessageTemplate::parse(text),
            None => MessageTemplate::with_tokens(
                meta.name(),
                vec![TemplateToken::Text(self.message.unwrap_or_default())],
            ),
        };

        let mut event = LogEvent::new(Utc::now(), (*meta.level()).into(), template)
            .with_properties(self.properties)
            .with_source(SourceLocation {
                file: meta.file().map(|s| s.to_string()),
                line: meta.line(),
                function: meta.module_path().map(|s| s.to_string()),
            });
        event.exception = self.exception;
        event
    }
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        match field.name() {
            "error" | "exception" => self.exception = Some(describe_error(value)),
            _ => self.insert(field, describe_error(value).into()),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, format!("{:?}", value).into());
    }
}

/// Picks reserved HTTP request fields off a span.
#[derive(Default)]
struct HttpRequestVisitor {
    request: HttpRequest,
}

impl HttpRequestVisitor {
    fn set(&mut self, field: &Field, value: PropertyValue) {
        if let Some(key) = ReservedKey::parse(field.name()) {
            self.request.set(key, &value);
        }
    }
}

impl Visit for HttpRequestVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.set(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.set(field, value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.set(field, format!("{:?}", value).into());
    }
}
