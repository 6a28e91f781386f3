//! Append-only JSON Lines persistence of probe results.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::queue::QueueReceiver;
use super::types::ProbeResult;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
    #[error("sink is already closed")]
    Closed,
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Totals reported by the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub persisted: u64,
    pub dropped: u64,
}

struct Output {
    writer: Writer,
    /// A failed write left a fragment, so the output does not end on a line
    /// boundary.
    dirty: bool,
}

impl Output {
    /// Write `record` as one line, terminating any fragment left behind by an
    /// earlier failure first.
    async fn append(&mut self, record: &[u8]) -> io::Result<()> {
        let mut line = Vec::with_capacity(record.len() + 2);
        if self.dirty {
            line.push(b'\n');
        }
        line.extend_from_slice(record);
        line.push(b'\n');

        let mut written = 0;
        while written < line.len() {
            match self.writer.write(&line[written..]).await {
                Ok(0) => {
                    self.track_partial(&line[..written]);
                    return Err(io::ErrorKind::WriteZero.into());
                }
                Ok(n) => written += n,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    self.track_partial(&line[..written]);
                    return Err(error);
                }
            }
        }

        self.dirty = false;
        self.writer.flush().await
    }

    fn track_partial(&mut self, written: &[u8]) {
        if let Some(&last) = written.last() {
            self.dirty = last != b'\n';
        }
    }
}

/// Single consumer of the result queue.
///
/// The output sits behind a lock for every write, and is taken out of the
/// lock on close so it is shut down exactly once.
pub struct Sink {
    output: Mutex<Option<Output>>,
    persisted: AtomicU64,
    dropped: AtomicU64,
}

impl Sink {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            output: Mutex::new(Some(Output { writer: Box::new(writer), dirty: false })),
            persisted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Open `path` for appending, creating it if missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path.as_ref()).await?;
        Ok(Self::new(file))
    }

    /// Append one record and flush it. Concurrent callers never interleave.
    pub async fn write(&self, result: &ProbeResult) -> Result<(), SinkError> {
        let record = serde_json::to_vec(result)?;

        let mut guard = self.output.lock().await;
        let output = guard.as_mut().ok_or(SinkError::Closed)?;
        if output.dirty {
            warn!("previous record was cut short, starting a new line");
        }
        output.append(&record).await?;
        Ok(())
    }

    /// Drain `results` until the queue is closed, then close the output.
    ///
    /// Results that fail to persist are logged and dropped.
    pub async fn run(self: Arc<Self>, results: QueueReceiver<ProbeResult>) -> SinkStats {
        while let Some(result) = results.recv().await {
            match self.write(&result).await {
                Ok(()) => {
                    self.persisted.fetch_add(1, Ordering::Relaxed);
                }
                Err(error) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    error!(location = %result.location, %error, "dropping result");
                }
            }
        }

        debug!("result queue closed");
        self.close().await;

        let stats = self.stats();
        info!(persisted = stats.persisted, dropped = stats.dropped, "sink stopped");
        stats
    }

    /// Flush and shut the writer down. Later calls do nothing.
    pub async fn close(&self) {
        let Some(mut output) = self.output.lock().await.take() else {
            return;
        };

        if let Err(error) = output.writer.shutdown().await {
            error!(%error, "failed to close results output");
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.output.lock().await.is_none()
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            persisted: self.persisted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
