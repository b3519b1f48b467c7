use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for formatted log lines.
///
/// Implementations write newline-delimited JSON produced by
/// [`StackdriverFormatter`](crate::formatter::StackdriverFormatter) to an
/// already-open output (stdout, a file, ...). The layer calls `write` from
/// a background task and never awaits it on the application thread.
#[async_trait]
pub trait LineSink: Send + Sync {
    /// Write a chunk of complete lines.
    ///
    /// **Parameters**
    /// - `lines`: one or more `\n`-terminated entries. A chunk never ends
    ///   in the middle of an entry.
    ///
    /// **Returns**
    /// - `Ok(())` once the whole chunk was accepted.
    /// - `Err(..)` if the output failed. The layer retries the chunk with
    ///   backoff, so implementations should avoid partial writes where
    ///   they can.
    async fn write(&self, lines: &str) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush anything buffered by the output.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
