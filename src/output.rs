//! Batched output stream over the socket write half.
//!
//! Small writes are staged in an internal buffer and pushed to the
//! socket in one write per flush point, cutting syscall and packet
//! overhead when many small frames are dispatched together. The
//! component is passive: callers (the dispatcher) are responsible for
//! not interleaving frames.

use std::io;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncWriteExt, WriteHalf};

use crate::stream::TransportStream;

/// Staged bytes beyond which a write triggers an implicit flush.
const HIGH_WATERMARK: usize = 32 * 1024;

/// Buffering writer over the connection's write half.
#[derive(Debug)]
pub(crate) struct BatchedOutput {
    writer: WriteHalf<TransportStream>,
    staged: BytesMut,
    high_watermark: usize,
    closed: bool,
}

impl BatchedOutput {
    pub(crate) fn new(writer: WriteHalf<TransportStream>) -> Self {
        Self::with_watermark(writer, HIGH_WATERMARK)
    }

    pub(crate) fn with_watermark(writer: WriteHalf<TransportStream>, high_watermark: usize) -> Self {
        Self {
            writer,
            staged: BytesMut::with_capacity(high_watermark),
            high_watermark,
            closed: false,
        }
    }

    /// Stage `bytes` for writing, flushing first if the buffer is at its
    /// high watermark.
    pub(crate) async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "output closed"));
        }
        if self.staged.len() + bytes.len() > self.high_watermark && !self.staged.is_empty() {
            self.flush().await?;
        }
        self.staged.extend_from_slice(bytes);
        if self.staged.len() >= self.high_watermark {
            self.flush().await?;
        }
        Ok(())
    }

    /// Push all staged bytes to the socket.
    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        while self.staged.has_remaining() {
            let written = self.writer.write(&self.staged).await?;
            if written == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            self.staged.advance(written);
        }
        self.writer.flush().await
    }

    /// Flush staged bytes and shut the write side down. Idempotent.
    pub(crate) async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let flushed = self.flush().await;
        let shut = self.writer.shutdown().await;
        flushed.and(shut)
    }
}
