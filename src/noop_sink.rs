use crate::sink::LineSink;
use async_trait::async_trait;
use std::error::Error;

/// A sink that simply drops all lines.
///
/// Useful for measuring the overhead of formatting on its own, without
/// any output I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LineSink for NoopSink {
    async fn write(&self, _lines: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
