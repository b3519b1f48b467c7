use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tracing::{error, info, info_span};
use tracing_stackdriver_json::{init::init_tracing, sink::LineSink};

/// Example of plugging in a custom destination by implementing the
/// `LineSink` trait directly. Imagine this forwards lines to a local
/// logging agent over a socket.
struct PrefixingSink;

#[async_trait]
impl LineSink for PrefixingSink {
    async fn write(&self, lines: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for line in lines.lines() {
            println!("[agent] {}", line);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink: Arc<dyn LineSink> = Arc::new(PrefixingSink);

    init_tracing(sink)?;

    info!("custom sink example started");

    // What HTTP middleware would do for each request.
    let request = info_span!(
        "request",
        requestMethod = "GET",
        remoteIp = "203.0.113.4",
        userAgent = "curl/8.4.0"
    );
    let _guard = request.enter();
    error!(db = "orders", "simulated error inside a request");

    sleep(Duration::from_millis(1500)).await;
    Ok(())
}
