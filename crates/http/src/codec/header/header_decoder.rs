//! Request head decoder.
//!
//! Parses the request line and header fields with `httparse`, records the byte
//! ranges of the target and of every header name/value, then slices them out of
//! one frozen buffer so no header byte is copied.
//!
//! Limits: at most 64 header fields, at most 8 KiB of head.

use std::mem::MaybeUninit;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decodes a [`RequestHeader`] and works out how its payload is framed.
#[derive(Debug)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // shortest valid head: "GET / HTTP/1.1\r\n\r\n"
        if src.len() < 14 {
            return Ok(None);
        }

        let mut req = httparse::Request::new(&mut []);
        // SAFETY: an array of `MaybeUninit` needs no initialization.
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] = unsafe { MaybeUninit::uninit().assume_init() };

        let parsed_result = req.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(head_len) => {
                trace!(head_len, "parsed request head");
                ensure!(head_len <= MAX_HEADER_BYTES, ParseError::too_large_header(head_len, MAX_HEADER_BYTES));

                let header_count = req.headers.len();

                let version = match req.version {
                    Some(0) => http::Version::HTTP_10,
                    Some(1) => http::Version::HTTP_11,
                    _ => return Err(ParseError::InvalidVersion(req.version)),
                };

                let method = req.method.ok_or(ParseError::InvalidMethod)?;
                let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;

                let path = req.path.ok_or_else(|| ParseError::invalid_uri("missing request target"))?;
                let target_range = Span::of(src, path.as_bytes());

                let mut header_spans = [(Span::EMPTY, Span::EMPTY); MAX_HEADER_NUM];
                for (header, spans) in req.headers.iter().zip(header_spans.iter_mut()) {
                    *spans = (Span::of(src, header.name.as_bytes()), Span::of(src, header.value));
                }

                let head_bytes = src.split_to(head_len).freeze();

                let mut header_map = HeaderMap::with_capacity(header_count);
                for (name, value) in &header_spans[..header_count] {
                    let name = HeaderName::from_bytes(name.slice(&head_bytes).as_ref()).map_err(ParseError::invalid_header)?;
                    // SAFETY: httparse only accepts visible ASCII, obs-text and whitespace in values,
                    // which is exactly what `HeaderValue` allows.
                    let value = unsafe { HeaderValue::from_maybe_shared_unchecked(value.slice(&head_bytes)) };
                    header_map.append(name, value);
                }

                let header = RequestHeader::new(method, target_range.slice(&head_bytes), version, header_map);
                let payload_size = parse_payload(&header)?;

                Ok(Some((header, payload_size)))
            }
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                Ok(None)
            }
        }
    }
}

/// Byte range of a parsed token inside the receive buffer.
#[derive(Clone, Copy)]
struct Span(usize, usize);

impl Span {
    const EMPTY: Span = Span(0, 0);

    fn of(buf: &[u8], part: &[u8]) -> Self {
        let start = part.as_ptr() as usize - buf.as_ptr() as usize;
        Span(start, start + part.len())
    }

    fn slice(self, bytes: &Bytes) -> Bytes {
        bytes.slice(self.0..self.1)
    }
}

/// Picks the request payload framing per RFC 9112 section 6.
fn parse_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = header.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::Empty),

        (Some(te_value), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else if header.need_body() {
                Err(ParseError::invalid_header("transfer-encoding without chunked as final coding"))
            } else {
                Ok(PayloadSize::Empty)
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;

            let length =
                cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            Ok(PayloadSize::for_len(usize::try_from(length).map_err(ParseError::invalid_content_length)?))
        }

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

/// `chunked` must be the final transfer coding when present.
fn is_chunked(value: &HeaderValue) -> bool {
    value.as_bytes().rsplit(|b| *b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}
