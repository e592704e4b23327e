use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame};
use thiserror::Error;
use tokio::sync::mpsc;

/// A streamed body write failed because the connection no longer accepts data.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("response body sink closed")]
pub struct SinkClosed;

/// Creates a connected sink/body pair.
///
/// The channel holds a single chunk, so [`BodySink::write`] resolves only once
/// the connection picked up the previous chunk.
pub fn body_sink() -> (BodySink, SinkBody) {
    let (tx, rx) = mpsc::channel(1);
    (BodySink { tx }, SinkBody { rx })
}

/// Write end of a streamed response body. Every chunk is written and flushed to
/// the connection as soon as it is received.
#[derive(Debug)]
pub struct BodySink {
    tx: mpsc::Sender<Bytes>,
}

impl BodySink {
    pub async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        if chunk.is_empty() {
            return if self.tx.is_closed() { Err(SinkClosed) } else { Ok(()) };
        }
        self.tx.send(chunk).await.map_err(|_| SinkClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read end of a [`BodySink`], used as the response body by the connection.
///
/// Its size is never known up front, so it is always sent chunked.
#[derive(Debug)]
pub struct SinkBody {
    rx: mpsc::Receiver<Bytes>,
}

impl Body for SinkBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(|bytes| Ok(Frame::data(bytes))))
    }
}
