//! In-process byte pipe between the handler thread and the engine task.
//!
//! The write end is blocking (`std::io::Write`), the read end is async. The
//! channel holds a single chunk, so a writer runs at most one chunk ahead of
//! the reader.

use std::fmt;
use std::io;
use std::io::{ErrorKind, Write};
use std::mem;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(1);
    (PipeWriter { tx: Some(tx) }, PipeReader { rx, pending: Bytes::new() })
}

/// Blocking write end. Must not be used from async code.
pub struct PipeWriter {
    tx: Option<mpsc::Sender<Bytes>>,
}

impl PipeWriter {
    /// Ends the stream; the reader sees EOF once it drained what was written.
    pub fn close(&mut self) {
        self.tx.take();
    }
}

impl fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeWriter").field("closed", &self.tx.is_none()).finish()
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let tx = self.tx.as_ref().ok_or_else(|| io::Error::new(ErrorKind::BrokenPipe, "pipe closed"))?;
        tx.blocking_send(Bytes::copy_from_slice(buf)).map_err(|_| io::Error::new(ErrorKind::BrokenPipe, "pipe reader gone"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Async read end.
pub struct PipeReader {
    rx: mpsc::Receiver<Bytes>,
    pending: Bytes,
}

impl PipeReader {
    /// Next piece of the stream, at most `max` bytes; `None` at end of stream.
    ///
    /// Waits for the first bytes only. A written chunk that fits is handed over
    /// as is; when more writes are already waiting they are coalesced into
    /// `scratch`, up to `max`.
    pub async fn read_chunk(&mut self, scratch: &mut BytesMut, max: usize) -> Option<Bytes> {
        if self.pending.is_empty() {
            self.pending = self.rx.recv().await?;
        }
        if self.pending.len() >= max {
            return Some(self.pending.split_to(max));
        }

        let Ok(next) = self.rx.try_recv() else {
            return Some(mem::take(&mut self.pending));
        };
        scratch.clear();
        scratch.extend_from_slice(&mem::take(&mut self.pending));
        self.pending = next;

        loop {
            let n = self.pending.len().min(max - scratch.len());
            scratch.extend_from_slice(&self.pending.split_to(n));
            if scratch.len() == max {
                break;
            }
            match self.rx.try_recv() {
                Ok(chunk) => self.pending = chunk,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        Some(scratch.split().freeze())
    }
}

impl fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader").field("pending", &self.pending.len()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn bytes_arrive_in_order_in_bounded_reads() {
        let (mut writer, mut reader) = pipe();

        let handle = tokio::task::spawn_blocking(move || {
            writer.write_all(b"hello").unwrap();
            assert_eq!(writer.write(b"").unwrap(), 0);
            writer.write_all(b" pipe world").unwrap();
        });

        let mut scratch = BytesMut::new();
        let mut out = BytesMut::new();
        while let Some(chunk) = reader.read_chunk(&mut scratch, 4).await {
            assert!(!chunk.is_empty() && chunk.len() <= 4);
            out.extend_from_slice(&chunk);
        }
        handle.await.unwrap();

        assert_eq!(&out[..], b"hello pipe world");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fitting_chunk_skips_scratch() {
        let (mut writer, mut reader) = pipe();
        tokio::task::spawn_blocking(move || writer.write_all(b"whole")).await.unwrap().unwrap();

        let mut scratch = BytesMut::new();
        assert_eq!(reader.read_chunk(&mut scratch, 16).await.as_deref(), Some(&b"whole"[..]));
        assert_eq!(scratch.capacity(), 0);
        assert_eq!(reader.read_chunk(&mut scratch, 16).await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn waiting_writes_are_coalesced() {
        let (mut writer, mut reader) = pipe();
        let (written_tx, written_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::task::spawn_blocking(move || {
            writer.write_all(b"ab").unwrap();
            // blocks until the reader took "ab" off the channel
            writer.write_all(b"cd").unwrap();
            written_tx.send(()).unwrap();
        });

        // take "ab" into the pending slot without consuming it yet
        let mut scratch = BytesMut::new();
        assert_eq!(reader.read_chunk(&mut scratch, 1).await.as_deref(), Some(&b"a"[..]));
        written_rx.await.unwrap();
        handle.await.unwrap();

        assert_eq!(reader.read_chunk(&mut scratch, 16).await.as_deref(), Some(&b"bcd"[..]));
        assert_eq!(reader.read_chunk(&mut scratch, 16).await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn write_fails_once_reader_dropped() {
        let (mut writer, reader) = pipe();
        drop(reader);

        let err = tokio::task::spawn_blocking(move || writer.write(b"data").unwrap_err()).await.unwrap();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn close_ends_stream() {
        let (mut writer, mut reader) = pipe();
        writer.close();
        writer.close();

        assert_eq!(reader.read_chunk(&mut BytesMut::new(), 16).await, None);
        assert_eq!(writer.write(b"late").unwrap_err().kind(), ErrorKind::BrokenPipe);
    }
}
