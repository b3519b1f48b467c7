use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use tracing_stackdriver_json::init::init_tracing_from_env;

/// Configure output and formatting through `STACKDRIVER_*` variables, e.g.
///
/// ```text
/// STACKDRIVER_OUTPUT=stdout STACKDRIVER_SERVICE_NAME=demo cargo run --example stdout_example
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing_from_env().await?;

    info!(template = "Hello, {name}!", name = "world");
    warn!(attempt = 3, "retrying upstream call");
    let payload = "x".repeat(60_000);
    info!(payload = payload.as_str(), "this entry is too large and gets a notice");

    sleep(Duration::from_millis(1500)).await;
    Ok(())
}
