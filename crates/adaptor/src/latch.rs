//! One-shot latch closed from async code and awaited from blocking code.

use std::io;
use std::io::ErrorKind;
use std::mem;

use tokio::sync::oneshot;

pub fn latch() -> (Latch, LatchWaiter) {
    let (tx, rx) = oneshot::channel();
    (Latch { tx }, LatchWaiter { state: WaitState::Pending(rx) })
}

/// Closing end; dropping it without closing breaks the latch.
#[derive(Debug)]
pub struct Latch {
    tx: oneshot::Sender<()>,
}

impl Latch {
    pub fn close(self) {
        let _ = self.tx.send(());
    }
}

#[derive(Debug)]
pub struct LatchWaiter {
    state: WaitState,
}

#[derive(Debug)]
enum WaitState {
    Pending(oneshot::Receiver<()>),
    Open,
    Broken,
}

impl LatchWaiter {
    /// Blocks until the latch is closed; `BrokenPipe` if it never will be.
    ///
    /// Must not be called from async code.
    pub fn wait(&mut self) -> io::Result<()> {
        if let WaitState::Pending(rx) = mem::replace(&mut self.state, WaitState::Broken) {
            if rx.blocking_recv().is_ok() {
                self.state = WaitState::Open;
            }
        }

        match self.state {
            WaitState::Open => Ok(()),
            _ => Err(io::Error::new(ErrorKind::BrokenPipe, "stream consumer gone before it was ready")),
        }
    }
}
