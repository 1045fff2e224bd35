//! Duplex byte pipe with single-settlement write ends.
//!
//! # Responsibilities
//! - Move byte chunks from a writer end to a reader end with backpressure
//! - Settle each write end at most once: `closed` (clean EOF) or `failed`
//! - Make a reader-side close observable by the writer
//!
//! The settlement contract is enforced by move semantics: `close` and `fail`
//! consume the `Writer`, and a `Writer` dropped without either is reported to
//! the reader as a failure rather than a silent EOF.

use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure observed by the reader end of a pipe.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipeError {
    /// The writer end failed with an upstream error.
    #[error("{0}")]
    Failed(String),

    /// The writer end was dropped without settling the pipe.
    #[error("stream discarded before completion")]
    Discarded,
}

/// Returned by [`Writer::write`] when the reader end is gone.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("pipe reader closed")]
pub struct ReaderClosed;

/// Create a connected writer/reader pair.
///
/// Capacity is a single chunk: a `write` resolves once the chunk has been
/// accepted, and a second `write` waits until the first chunk is consumed.
pub fn pipe() -> (Writer, Reader) {
    let (tx, rx) = mpsc::channel(1);
    (
        Writer {
            tx,
            settled: false,
        },
        Reader { rx },
    )
}

/// Write end of a pipe.
pub struct Writer {
    tx: mpsc::Sender<Result<Bytes, PipeError>>,
    settled: bool,
}

impl Writer {
    /// Write one chunk; resolves once the reader side has accepted it.
    pub async fn write(&mut self, chunk: Bytes) -> Result<(), ReaderClosed> {
        self.tx.send(Ok(chunk)).await.map_err(|_| ReaderClosed)
    }

    /// Settle the pipe with a clean EOF.
    pub fn close(mut self) {
        self.settled = true;
    }

    /// Settle the pipe with a failure the reader will observe.
    pub fn fail(mut self, message: impl Into<String>) {
        self.settled = true;
        let _ = self.tx.try_send(Err(PipeError::Failed(message.into())));
    }

    /// A future resolving when the reader end has been closed or dropped.
    ///
    /// The future is independent of the writer so it can be raced against
    /// writes without holding a borrow.
    pub fn reader_closed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let tx = self.tx.clone();
        async move { tx.closed().await }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.settled {
            let _ = self.tx.try_send(Err(PipeError::Discarded));
        }
    }
}

/// Read end of a pipe.
pub struct Reader {
    rx: mpsc::Receiver<Result<Bytes, PipeError>>,
}

impl Reader {
    /// Read the next chunk.
    ///
    /// `None` is a clean EOF; `Some(Err(_))` is a failed pipe. After either,
    /// subsequent reads keep returning `None`.
    pub async fn read(&mut self) -> Option<Result<Bytes, PipeError>> {
        self.rx.recv().await
    }

    /// Close the reader end. Pending and future writes fail with
    /// [`ReaderClosed`], and the writer's `reader_closed` future resolves.
    pub fn close(mut self) {
        self.rx.close();
    }

    /// Adapt the reader into a `Stream` of chunks, e.g. for a streaming
    /// HTTP response body.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Bytes, PipeError>> + Send {
        futures_util::stream::poll_fn(move |cx| self.rx.poll_recv(cx))
    }
}
