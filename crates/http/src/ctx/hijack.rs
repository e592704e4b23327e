use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;
use tracing::trace;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Callbacks registered by a handler that takes over its connection.
pub struct HijackRequest {
    pub(crate) on_hijack: Box<dyn FnOnce(HijackedConn) + Send>,
    pub(crate) on_release: Box<dyn FnOnce() + Send>,
}

impl fmt::Debug for HijackRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HijackRequest").finish_non_exhaustive()
    }
}

/// The raw connection after a hijack.
///
/// Bytes the engine had already read past the request are served first. The
/// engine's connection task stays alive until this value is shut down or
/// dropped; only then does it run the `on_release` hook and finish.
pub struct HijackedConn {
    leftover: Bytes,
    reader: BoxedReader,
    writer: BoxedWriter,
    release: Option<oneshot::Sender<()>>,
}

impl HijackedConn {
    pub(crate) fn new(leftover: Bytes, reader: BoxedReader, writer: BoxedWriter, release: oneshot::Sender<()>) -> Self {
        Self { leftover, reader, writer, release: Some(release) }
    }

    /// Bytes received from the peer but not yet consumed by the engine.
    pub fn leftover(&self) -> &Bytes {
        &self.leftover
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            trace!("hijacked connection released");
            let _ = release.send(());
        }
    }
}

impl fmt::Debug for HijackedConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HijackedConn")
            .field("leftover", &self.leftover.len())
            .field("released", &self.release.is_none())
            .finish_non_exhaustive()
    }
}

impl AsyncRead for HijackedConn {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if self.leftover.has_remaining() {
            let len = self.leftover.len().min(buf.remaining());
            buf.put_slice(&self.leftover[..len]);
            self.leftover.advance(len);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for HijackedConn {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = std::task::ready!(Pin::new(&mut self.writer).poll_shutdown(cx));
        self.release();
        Poll::Ready(result)
    }
}

impl Drop for HijackedConn {
    fn drop(&mut self) {
        self.release();
    }
}
