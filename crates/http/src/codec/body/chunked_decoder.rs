//! `Transfer-Encoding: chunked` request payload decoder (RFC 9112 section 7.1).
//!
//! Chunk extensions and trailer fields are accepted and discarded.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};

/// Longest size line or trailer line we are willing to buffer.
const MAX_LINE_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// chunk-size line, with optional extensions
    Size,
    /// chunk-data
    Data,
    /// CRLF after chunk-data
    DataEnd,
    /// trailer section, up to the final empty line
    Trailers,
    Done,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size, remaining: 0 }
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Size => {
                    let Some(line) = take_line(src)? else { return Ok(None) };
                    self.remaining = parse_chunk_size(&line)?;
                    trace!(size = self.remaining, "read chunk size");
                    self.state = if self.remaining == 0 { State::Trailers } else { State::Data };
                }

                State::Data => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = self.remaining.min(src.len() as u64);
                    // `len` never exceeds `src.len()`, so the cast back cannot truncate
                    #[allow(clippy::cast_possible_truncation, reason = "bounded by src.len()")]
                    let chunk = src.split_to(len as usize).freeze();
                    self.remaining -= len;
                    if self.remaining == 0 {
                        self.state = State::DataEnd;
                    }
                    return Ok(Some(PayloadItem::Chunk(chunk)));
                }

                State::DataEnd => match src.first() {
                    None => return Ok(None),
                    Some(b'\n') => {
                        src.advance(1);
                        self.state = State::Size;
                    }
                    Some(b'\r') => {
                        if src.len() < 2 {
                            return Ok(None);
                        }
                        ensure!(src[1] == b'\n', ParseError::invalid_body("missing LF after chunk data"));
                        src.advance(2);
                        self.state = State::Size;
                    }
                    Some(_) => return Err(ParseError::invalid_body("chunk data longer than its declared size")),
                },

                State::Trailers => {
                    let Some(line) = take_line(src)? else { return Ok(None) };
                    if line.is_empty() {
                        self.state = State::Done;
                    }
                }

                State::Done => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}

/// Splits one line off `src`, without its line terminator.
fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    match src.iter().position(|b| *b == b'\n') {
        Some(pos) => {
            ensure!(pos <= MAX_LINE_BYTES, ParseError::invalid_body("chunk line too long"));
            let mut line = src.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            Ok(Some(line))
        }
        None => {
            ensure!(src.len() <= MAX_LINE_BYTES, ParseError::invalid_body("chunk line too long"));
            Ok(None)
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let digits = line.split(|b| *b == b';').next().unwrap_or_default().trim_ascii();
    ensure!(!digits.is_empty(), ParseError::invalid_body("empty chunk size"));

    digits.iter().try_fold(0u64, |size, b| {
        let digit = char::from(*b).to_digit(16).ok_or_else(|| ParseError::invalid_body("invalid chunk size"))?;
        size.checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))
    })
}
