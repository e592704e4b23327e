//! The per-request response state machine.
//!
//! A [`ResponseBridge`] starts out buffering: status, headers and body bytes are
//! collected on the handler thread. It leaves that state exactly once:
//!
//! - `flush` commits the head and the buffered bytes, then routes further writes
//!   through a pipe the engine drains ([`Mode::Flushed`])
//! - `hijack` hands the buffered bytes and the raw connection to the handler
//!   ([`Mode::Hijacked`])
//! - returning from the handler commits the whole buffered response ([`Mode::Done`])
//! - a panic while still buffering is forwarded as [`Mode::Panicked`]
//!
//! The committed storage moves to the engine task inside the mode, so once a
//! mode is settled the handler thread can no longer reach it.

mod hijack;
mod mode;

pub use hijack::Hijacked;
pub use mode::{Committed, Mode, ModeSignal, Streaming};

use std::any::Any;
use std::fmt;
use std::io;
use std::io::{ErrorKind, Write};
use std::mem;

use http::{HeaderMap, StatusCode};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

use crate::error::HijackError;
use crate::latch::{LatchWaiter, latch};
use crate::pipe::{PipeWriter, pipe};
use crate::pool::{BridgeBuffers, Pooled};

enum State {
    Buffering(Pooled<'static, BridgeBuffers>),
    Streaming { writer: PipeWriter, ready: LatchWaiter },
    Hijacked,
    Closed,
}

/// The response writer handed to a [`SyncHandler`](crate::SyncHandler).
pub struct ResponseBridge {
    status: Option<StatusCode>,
    state: State,
    signal: ModeSignal,
    detached: HeaderMap,
    handle: Handle,
}

impl ResponseBridge {
    pub(crate) fn new(buffers: Pooled<'static, BridgeBuffers>, signal: ModeSignal, handle: Handle) -> Self {
        Self { status: None, state: State::Buffering(buffers), signal, detached: HeaderMap::new(), handle }
    }

    /// The effective status: the first one written, `200 OK` otherwise.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Sets the status once; later calls are ignored.
    ///
    /// # Panics
    ///
    /// Panics if `code` is outside `100..=999`.
    pub fn write_status(&mut self, code: u16) {
        assert!((100..=999).contains(&code), "invalid status code {code}");

        if let Some(status) = self.status {
            debug!(%status, ignored = code, "status already written");
            return;
        }
        // every code in 100..=999 is accepted by `StatusCode`
        self.status = StatusCode::from_u16(code).ok();
    }

    /// The response header fields. Once the response is flushed or hijacked
    /// this is a copy of the committed head.
    pub fn headers(&self) -> &HeaderMap {
        match &self.state {
            State::Buffering(buffers) => &buffers.headers,
            _ => &self.detached,
        }
    }

    /// The response header fields. Once the response is flushed or hijacked
    /// the head is already committed, and changes made here go nowhere.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        match &mut self.state {
            State::Buffering(buffers) => &mut buffers.headers,
            _ => &mut self.detached,
        }
    }

    /// Takes the connection over.
    ///
    /// Bytes written so far go out first, then the connection is the caller's:
    /// the engine sends no response for this request.
    pub fn hijack(&mut self) -> Result<Hijacked, HijackError> {
        let buffers = match mem::replace(&mut self.state, State::Hijacked) {
            State::Buffering(buffers) => buffers,
            State::Hijacked => return Err(HijackError::AlreadyHijacked),
            state @ State::Streaming { .. } => {
                self.state = state;
                return Err(HijackError::Streaming);
            }
            State::Closed => {
                self.state = State::Closed;
                return Err(HijackError::ConnectionClosed);
            }
        };

        self.detached = buffers.headers.clone();

        let (conn_tx, conn_rx) = oneshot::channel();
        if !self.signal.settle(Mode::Hijacked(conn_tx)) {
            return Err(HijackError::ConnectionClosed);
        }
        let conn = conn_rx.blocking_recv().map_err(|_| HijackError::ConnectionClosed)?;
        trace!(buffered = buffers.body.len(), "connection hijacked");

        let mut hijacked = Hijacked::new(conn, self.handle.clone());
        if !buffers.body.is_empty() {
            hijacked.write_all(&buffers.body)?;
            hijacked.flush()?;
        }
        Ok(hijacked)
    }

    /// Ends a streamed response: the engine sees the end of the body once it
    /// drained what was written. Idempotent; also done on drop.
    pub fn close(&mut self) {
        if let State::Streaming { .. } = self.state {
            trace!("close response stream");
            self.state = State::Closed;
        }
    }

    /// Commits a response the handler returned from.
    pub(crate) fn finish(&mut self) {
        match mem::replace(&mut self.state, State::Closed) {
            State::Buffering(buffers) => {
                let status = self.status();
                self.signal.settle(Mode::Done(Committed { status, buffers }));
            }
            State::Hijacked => self.state = State::Hijacked,
            State::Streaming { .. } | State::Closed => {}
        }
    }

    /// Reports a handler panic. Only a response still buffering can turn into a
    /// panic; otherwise the engine is already committed and the panic is logged.
    pub(crate) fn fail(&mut self, payload: Box<dyn Any + Send>) {
        let message = panic_message(payload.as_ref()).to_owned();
        if let State::Buffering(_) = self.state {
            self.state = State::Closed;
        }
        if !self.signal.settle(Mode::Panicked(payload)) {
            error!(cause = %message, "handler panicked after the response was committed");
        }
        self.close();
    }

    fn start_streaming(&mut self) -> io::Result<()> {
        if !matches!(self.state, State::Buffering(_)) {
            return Ok(());
        }
        let State::Buffering(buffers) = mem::replace(&mut self.state, State::Closed) else {
            return Ok(());
        };

        let (writer, reader) = pipe();
        let (ready_latch, ready) = latch();
        // the head is final from here on
        let status = *self.status.get_or_insert(StatusCode::OK);
        self.detached = buffers.headers.clone();
        let committed = Committed { status, buffers };

        trace!(buffered = committed.buffers.body.len(), "switch response to streaming");
        if !self.signal.settle(Mode::Flushed(Streaming { committed, reader, ready: ready_latch })) {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "engine side gone"));
        }
        self.state = State::Streaming { writer, ready };
        Ok(())
    }
}

impl Write for ResponseBridge {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.state {
            State::Buffering(buffers) => {
                buffers.body.extend_from_slice(buf);
                Ok(buf.len())
            }
            State::Streaming { writer, .. } => writer.write(buf),
            State::Hijacked => Err(hijacked_error()),
            State::Closed => Err(io::Error::new(ErrorKind::BrokenPipe, "response closed")),
        }
    }

    /// Commits the head and the bytes written so far, then blocks until the
    /// engine consumes the stream. Writes after this go straight to the peer.
    fn flush(&mut self) -> io::Result<()> {
        self.start_streaming()?;

        match &mut self.state {
            State::Streaming { ready, .. } => ready.wait(),
            State::Hijacked => Err(hijacked_error()),
            State::Buffering(_) | State::Closed => Err(io::Error::new(ErrorKind::BrokenPipe, "response closed")),
        }
    }
}

impl Drop for ResponseBridge {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ResponseBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Buffering(_) => "buffering",
            State::Streaming { .. } => "streaming",
            State::Hijacked => "hijacked",
            State::Closed => "closed",
        };
        f.debug_struct("ResponseBridge").field("status", &self.status()).field("state", &state).finish()
    }
}

fn hijacked_error() -> io::Error {
    io::Error::other("connection has been hijacked")
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
