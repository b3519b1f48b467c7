//! Sinks backed by the process's standard streams or an append-only file.
//!
//! Every sink owns a single handle behind a mutex and flushes it before
//! `write` returns, so batches reach the stream whole and in order, and a
//! failed write is reported for the batch that caused it.

use crate::sink::LineSink;
use async_trait::async_trait;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt, Stderr, Stdout};
use tokio::sync::Mutex;

/// Writes lines to any async writer.
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> LineSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&self, lines: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut writer = self.writer.lock().await;
        writer.write_all(lines.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

/// Standard output, which is where container runtimes pick up logs for
/// the backend's agent.
pub type StdoutSink = WriterSink<Stdout>;

pub type StderrSink = WriterSink<Stderr>;

impl WriterSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl WriterSink<Stderr> {
    pub fn stderr() -> Self {
        Self::new(tokio::io::stderr())
    }
}

/// Appends lines to a file, opened once up front.
pub struct FileSink {
    path: PathBuf,
    inner: WriterSink<File>,
}

impl FileSink {
    /// Open (or create) `path` for appending.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self { path, inner: WriterSink::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LineSink for FileSink {
    async fn write(&self, lines: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.inner.write(lines).await
    }

    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.inner.flush().await
    }
}
