use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

/// Copies chunks through until the declared length is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(mut bytes) => {
                let len = bytes.remaining() as u64;
                if len > self.remaining {
                    warn!(len, remaining = self.remaining, "payload exceeds the declared content-length");
                    return Err(SendError::invalid_body("payload exceeds the declared content-length"));
                }
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    dst.extend_from_slice(chunk);
                    let n = chunk.len();
                    bytes.advance(n);
                }
                self.remaining -= len;
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                if self.remaining == 0 { Ok(()) } else { Err(SendError::invalid_body("payload shorter than the declared content-length")) }
            }
        }
    }
}
