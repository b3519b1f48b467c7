use crate::env::{env_or, STACKDRIVER_OUTPUT_ENV};
use crate::error::FormatError;
use crate::formatter::{FormatterConfig, StackdriverFormatter};
use crate::layer::StackdriverLayer;
use crate::output::{make_sink, parse_output, OutputError};
use crate::sink::LineSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the logging layer.
///
/// **Fields**
/// - `channel_buffer`: maximum number of formatted entries queued before
///   new ones are dropped.
/// - `batch_size`: number of entries written to the sink at once.
/// - `flush_interval`: maximum time between writes even when the batch
///   is not full.
/// - `min_level`: least severe level that is written.
/// - `formatter`: [`FormatterConfig`] for the JSON lines themselves.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub min_level: Level,
    pub formatter: FormatterConfig,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            min_level: Level::INFO,
            formatter: FormatterConfig::default(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("invalid formatter configuration: {0}")]
    Formatter(#[from] FormatError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("failed to install global subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Build a [`StackdriverLayer`] from a [`LayerConfig`] without installing
/// it, for composing with other layers.
///
/// Must be called from within a Tokio runtime.
pub fn build_layer(
    sink: Arc<dyn LineSink>,
    config: LayerConfig,
) -> Result<(StackdriverLayer, JoinHandle<()>), FormatError> {
    let formatter = StackdriverFormatter::new(config.formatter)?;
    let (layer, handle) = StackdriverLayer::new(
        sink,
        formatter,
        config.channel_buffer,
        config.batch_size,
        config.flush_interval,
    );
    Ok((layer.with_min_level(config.min_level), handle))
}

/// Initialize the global `tracing` subscriber using the provided sink and
/// [`LayerConfig`].
///
/// **Parameters**
/// - `sink`: [`LineSink`] that receives the formatted JSON lines.
/// - `config`: [`LayerConfig`] controlling buffering, batching and
///   formatting.
///
/// **Returns**
/// - the handle of the background writer task.
/// - `Err(..)` if the formatter configuration is invalid or a global
///   subscriber is already installed.
pub fn init_tracing_with_config(
    sink: Arc<dyn LineSink>,
    config: LayerConfig,
) -> Result<JoinHandle<()>, InitError> {
    let (layer, handle) = build_layer(sink, config)?;
    let subscriber = Registry::default().with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(handle)
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing(sink: Arc<dyn LineSink>) -> Result<JoinHandle<()>, InitError> {
    init_tracing_with_config(sink, LayerConfig::default())
}

/// Initialize tracing from `STACKDRIVER_*` environment variables: the
/// output target (stdout by default) and the formatter options.
pub async fn init_tracing_from_env() -> Result<JoinHandle<()>, InitError> {
    let target = parse_output(&env_or(STACKDRIVER_OUTPUT_ENV, "stdout"))?;
    let sink = make_sink(&target).await?;
    let config = LayerConfig {
        formatter: FormatterConfig::from_env(),
        ..LayerConfig::default()
    };
    init_tracing_with_config(sink, config)
}
