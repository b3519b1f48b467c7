use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;
use tracing::{error, info, info_span, warn};
use tracing_stackdriver_json::fingerprint::Fingerprint;
use tracing_stackdriver_json::init::{build_layer, LayerConfig};
use tracing_stackdriver_json::sink::LineSink;
use tracing_stackdriver_json::{FormatterConfig, ServiceContext};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Collects everything written, and how many write calls it took.
#[derive(Clone, Default)]
struct MemorySink {
    buffer: Arc<Mutex<String>>,
    writes: Arc<Mutex<usize>>,
}

impl MemorySink {
    fn lines(&self) -> Vec<Value> {
        self.buffer
            .lock()
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

#[async_trait]
impl LineSink for MemorySink {
    async fn write(&self, lines: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.buffer.lock().unwrap().push_str(lines);
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}

/// Fails a fixed number of times before accepting writes.
struct FlakySink {
    inner: MemorySink,
    failures_left: Mutex<u32>,
}

#[async_trait]
impl LineSink for FlakySink {
    async fn write(&self, lines: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err("output unavailable".into());
            }
        }
        self.inner.write(lines).await
    }
}

/// Run `f` under a subscriber holding only the Stackdriver layer, then
/// drop the subscriber and wait for the writer task to drain.
async fn capture(sink: Arc<dyn LineSink>, config: LayerConfig, f: impl FnOnce()) -> [u64; 4] {
    let (layer, handle) = build_layer(sink, config).unwrap();
    let counters = [
        Arc::clone(&layer.total_events),
        Arc::clone(&layer.enqueued_events),
        Arc::clone(&layer.dropped_events),
        Arc::clone(&layer.failed_events),
    ];
    tracing::subscriber::with_default(Registry::default().with(layer), f);
    handle.await.unwrap();
    counters.map(|c| c.load(Ordering::Relaxed))
}

#[tokio::test]
async fn events_become_json_lines() {
    let sink = MemorySink::default();
    let counters = capture(Arc::new(sink.clone()), LayerConfig::default(), || {
        info!(order_id = 42u64, paid = true, "order {} accepted", 42);
        warn!(ratio = 0.5, "running low");
    })
    .await;

    let lines = sink.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(counters, [2, 2, 0, 0]);

    assert_eq!(lines[0]["message"], "order 42 accepted");
    assert_eq!(lines[0]["severity"], "INFO");
    assert_eq!(lines[0]["order_id"], 42);
    assert_eq!(lines[0]["paid"], true);
    assert_eq!(lines[0]["httpRequest"], serde_json::json!({}));

    assert_eq!(lines[1]["severity"], "WARNING");
    assert_eq!(lines[1]["ratio"], 0.5);
}

#[tokio::test]
async fn events_below_min_level_are_skipped() {
    let sink = MemorySink::default();
    let counters = capture(Arc::new(sink.clone()), LayerConfig::default(), || {
        tracing::debug!("not written");
        tracing::trace!("not written either");
        info!("written");
    })
    .await;

    assert_eq!(sink.lines().len(), 1);
    assert_eq!(counters[0], 3);
    assert_eq!(counters[1], 1);
}

#[tokio::test]
async fn same_callsite_shares_fingerprint() {
    let sink = MemorySink::default();
    capture(Arc::new(sink.clone()), LayerConfig::default(), || {
        for user in ["ann", "bob"] {
            info!("user {} signed in", user);
        }
        info!("something else");
    })
    .await;

    let lines = sink.lines();
    assert_eq!(lines.len(), 3);
    assert_ne!(lines[0]["message"], lines[1]["message"]);
    assert_eq!(lines[0]["fingerprint"], lines[1]["fingerprint"]);
    assert_ne!(lines[0]["fingerprint"], lines[2]["fingerprint"]);
}

#[tokio::test]
async fn template_field_drives_message_and_fingerprint() {
    let sink = MemorySink::default();
    capture(Arc::new(sink.clone()), LayerConfig::default(), || {
        info!(template = "{greeting}, {name}", greeting = "hello", name = "ann");
    })
    .await;

    let line = &sink.lines()[0];
    assert_eq!(line["message"], "hello, ann");
    assert_eq!(line["fingerprint"], Fingerprint::of("{greeting}, {name}").to_string());
    assert!(line.get("template").is_none());
    assert_eq!(line["greeting"], "hello");
}

#[tokio::test]
async fn request_span_fields_fill_http_request() {
    let sink = MemorySink::default();
    capture(Arc::new(sink.clone()), LayerConfig::default(), || {
        let outer = info_span!("request", remoteIp = "198.51.100.7", userAgent = "Ditto", requestMethod = "GET");
        let _outer = outer.enter();
        let inner = info_span!("proxy", remoteIp = "10.0.0.9", status = tracing::field::Empty);
        inner.record("status", 204u64);
        let _inner = inner.enter();
        info!(referer = "https://example.com/", "handled");
    })
    .await;

    let line = &sink.lines()[0];
    assert_eq!(
        line["httpRequest"],
        serde_json::json!({
            "requestMethod": "GET",
            "status": 204,
            "referer": "https://example.com/",
            "remoteIp": "10.0.0.9",
            "userAgent": "Ditto"
        })
    );
    assert!(line.get("referer").is_none());
}

#[tokio::test]
async fn status_event_field_is_not_taken_for_the_response_code() {
    let sink = MemorySink::default();
    capture(Arc::new(sink.clone()), LayerConfig::default(), || {
        let span = info_span!("request", status = 502u64);
        let _guard = span.enter();
        info!(status = "ok", "health check");
    })
    .await;

    let line = &sink.lines()[0];
    assert_eq!(line["status"], "ok");
    assert_eq!(line["httpRequest"], serde_json::json!({"status": 502}));
}

#[tokio::test]
async fn errors_become_exceptions_with_error_reporting() {
    let sink = MemorySink::default();
    let config = LayerConfig {
        formatter: FormatterConfig {
            error_reporting: Some(ServiceContext { service: "api".into(), version: None }),
            ..FormatterConfig::default()
        },
        ..LayerConfig::default()
    };
    capture(Arc::new(sink.clone()), config, || {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        error!(error = &err as &(dyn Error + 'static), "write failed");
    })
    .await;

    let line = &sink.lines()[0];
    assert_eq!(line["severity"], "ERROR");
    assert_eq!(line["exception"], "disk full");
    assert_eq!(line["serviceContext"]["service"], "api");
    assert!(line["context"]["reportLocation"]["filePath"]
        .as_str()
        .unwrap()
        .ends_with("layer.rs"));
    assert!(line["context"]["reportLocation"]["lineNumber"].is_u64());
}

#[tokio::test]
async fn oversized_event_ships_with_its_notice() {
    let sink = MemorySink::default();
    let big = "x".repeat(60_000);
    capture(Arc::new(sink.clone()), LayerConfig::default(), || {
        info!(payload = big.as_str(), "large payload");
    })
    .await;

    let lines = sink.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["payload"].as_str().unwrap().len(), 60_000);
    assert_eq!(lines[1]["severity"], "CRITICAL");
    assert!(lines[1].get("payload").is_none());
}

#[tokio::test]
async fn batches_are_written_together() {
    let sink = MemorySink::default();
    let config = LayerConfig {
        batch_size: 4,
        flush_interval: Duration::from_secs(60),
        ..LayerConfig::default()
    };
    capture(Arc::new(sink.clone()), config, || {
        for i in 0..10 {
            info!(i, "tick");
        }
    })
    .await;

    assert_eq!(sink.lines().len(), 10);
    // two full batches plus the remainder when the layer shut down, and
    // at most one early flush from the interval's first tick
    let writes = *sink.writes.lock().unwrap();
    assert!((3..=4).contains(&writes), "writes = {}", writes);
}

#[tokio::test]
async fn failed_writes_are_retried() {
    let memory = MemorySink::default();
    let sink = FlakySink { inner: memory.clone(), failures_left: Mutex::new(2) };
    capture(Arc::new(sink), LayerConfig::default(), || {
        info!("eventually written");
    })
    .await;

    let lines = memory.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["message"], "eventually written");
}
