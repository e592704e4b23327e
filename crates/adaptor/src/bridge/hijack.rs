use std::fmt;
use std::io;
use std::io::{BufRead, ErrorKind, Read, Write};

use tandem_http::ctx::HijackedConn;
use tokio::io::BufStream;
use tokio::runtime::Handle;
use tokio_util::io::SyncIoBridge;
use tracing::trace;

type HijackedIo = SyncIoBridge<BufStream<HijackedConn>>;

/// A hijacked connection, as a buffered blocking duplex stream.
///
/// Writes are buffered: call [`Write::flush`] to put them on the wire. Closing
/// (or dropping) flushes, shuts the connection down and releases it to the
/// engine, which only then finishes the connection. Blocks the calling thread,
/// so it must stay off async tasks.
pub struct Hijacked {
    io: Option<HijackedIo>,
}

impl Hijacked {
    pub(crate) fn new(conn: HijackedConn, handle: Handle) -> Self {
        Self { io: Some(SyncIoBridge::new_with_handle(BufStream::new(conn), handle)) }
    }

    /// Flushes pending writes and shuts the connection down. Idempotent.
    pub fn close(&mut self) -> io::Result<()> {
        let Some(mut io) = self.io.take() else { return Ok(()) };
        trace!("close hijacked connection");
        io.flush()?;
        io.shutdown()
    }

    fn io(&mut self) -> io::Result<&mut HijackedIo> {
        self.io.as_mut().ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "hijacked connection closed"))
    }
}

impl Read for Hijacked {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io()?.read(buf)
    }
}

impl BufRead for Hijacked {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.io()?.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if let Some(io) = self.io.as_mut() {
            io.consume(amt);
        }
    }
}

impl Write for Hijacked {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.io()?.flush()
    }
}

impl fmt::Debug for Hijacked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hijacked").field("closed", &self.io.is_none()).finish()
    }
}

impl Drop for Hijacked {
    fn drop(&mut self) {
        if let Some(mut io) = self.io.take() {
            // dropping the connection releases it; unflushed writes would be lost
            let _ = io.flush();
        }
    }
}
