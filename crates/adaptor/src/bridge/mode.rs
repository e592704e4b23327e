//! The terminal modes a response settles into, and the single-slot signal that
//! carries the first one to the engine task.

use std::any::Any;
use std::fmt;

use http::StatusCode;
use tandem_http::ctx::HijackedConn;
use tokio::sync::oneshot;
use tracing::debug;

use crate::latch::Latch;
use crate::pipe::PipeReader;
use crate::pool::{BridgeBuffers, Pooled};

/// Status and storage of a response whose head is final.
///
/// The header map and body bytes travel with the mode, so the engine task
/// owns them from here on; the storage returns to the pool when this is dropped.
#[derive(Debug)]
pub struct Committed {
    pub status: StatusCode,
    pub buffers: Pooled<'static, BridgeBuffers>,
}

/// A response that continues through the pipe after its buffered prefix.
#[derive(Debug)]
pub struct Streaming {
    pub committed: Committed,
    pub reader: PipeReader,
    /// closed once the engine consumes the pipe, releasing the handler's flush
    pub ready: Latch,
}

pub enum Mode {
    /// The handler returned without flushing; the body is complete.
    Done(Committed),
    /// The handler flushed; the rest of the body streams through the pipe.
    Flushed(Streaming),
    /// The handler took the connection; it waits for it on this sender.
    Hijacked(oneshot::Sender<HijackedConn>),
    /// The handler panicked before committing to a mode.
    Panicked(Box<dyn Any + Send>),
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Done(_) => "done",
            Mode::Flushed(_) => "flushed",
            Mode::Hijacked(_) => "hijacked",
            Mode::Panicked(_) => "panicked",
        }
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Single-slot signal: the first mode settled is delivered, later ones are dropped.
#[derive(Debug)]
pub struct ModeSignal {
    slot: Option<oneshot::Sender<Mode>>,
}

impl ModeSignal {
    pub fn new() -> (Self, oneshot::Receiver<Mode>) {
        let (tx, rx) = oneshot::channel();
        (Self { slot: Some(tx) }, rx)
    }

    /// Delivers `mode` unless a mode was already settled or the engine task is
    /// gone; never blocks. Returns whether `mode` was delivered.
    pub fn settle(&mut self, mode: Mode) -> bool {
        let Some(tx) = self.slot.take() else {
            debug!(mode = mode.name(), "mode already settled, drop signal");
            return false;
        };

        match tx.send(mode) {
            Ok(()) => true,
            Err(mode) => {
                debug!(mode = mode.name(), "engine side gone, drop signal");
                false
            }
        }
    }

    pub fn is_settled(&self) -> bool {
        self.slot.is_none()
    }
}
