use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{error, Level};

use tracing_stackdriver_json::formatter::{FormatterConfig, ServiceContext};
use tracing_stackdriver_json::init::{init_tracing_with_config, LayerConfig};
use tracing_stackdriver_json::noop_sink::NoopSink;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(NoopSink::default());

    let layer_config = LayerConfig {
        channel_buffer: 50_000,
        batch_size: 1_000,
        flush_interval: Duration::from_millis(200),
        min_level: Level::ERROR,
        formatter: FormatterConfig {
            include_message_template: true,
            error_reporting: Some(ServiceContext {
                service: "load-test".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..FormatterConfig::default()
        },
    };

    init_tracing_with_config(sink, layer_config)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, remoteIp = "10.0.0.1", "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: formatted {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    sleep(Duration::from_secs(2)).await;
    Ok(())
}
