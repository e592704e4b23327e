//! HTTP/1.1 codec for `tokio_util::codec` framed I/O.
//!
//! - [`RequestDecoder`]: request heads (keeping the raw request-target) and
//!   request payload items, `Content-Length` or chunked
//! - [`ResponseEncoder`]: response heads and payload items, fixed length or chunked
//!
//! ```no_run
//! use tandem_http::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! let message = decoder.decode(&mut buffer);
//! ```

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
